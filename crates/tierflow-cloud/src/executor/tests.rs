use super::*;
use crate::simulate::SimulatedBackend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tierflow_core::{load_topology_str, synthesize};

const BASTION: &str = r#"
stack "custody" {
    region "ap-southeast-1"
    key-pair "custody"
    network "10.0.0.0/16"
    availability-zones "ap-southeast-1a"
}

access-group "pub" tier="public" {
    ingress "tcp" 22 from="0.0.0.0/0"
}

access-group "priv" {
    ingress "tcp" 22 group="pub"
}

instance "bastion" {
    zone "public-1"
    access-group "pub"
    user "ec2-user"
}

instance "server" {
    zone "private-1"
    access-group "priv"
    user "ubuntu"
}
"#;

fn fixture() -> (Topology, ProvisioningPlan) {
    let topology = load_topology_str(BASTION, "custody").unwrap();
    let plan = synthesize(&topology).unwrap();
    (topology, plan)
}

fn executor(backend: Arc<SimulatedBackend>) -> Executor {
    Executor::new(backend).with_retry(RetryConfig::none())
}

fn position(calls: &[String], id: &str) -> usize {
    calls.iter().position(|c| c == id).unwrap()
}

#[tokio::test]
async fn test_apply_creates_every_step_after_its_dependencies() {
    let (topology, plan) = fixture();
    let backend = Arc::new(SimulatedBackend::new(&topology.stack));

    let report = executor(backend.clone())
        .apply(&topology, &plan, HandleSet::new())
        .await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.succeeded.len(), plan.len());
    assert_eq!(report.handles.len(), plan.len());

    let calls = backend.calls();
    for step in &plan.steps {
        for dep in &step.depends_on {
            assert!(
                position(&calls, dep) < position(&calls, &step.id),
                "{} created before its dependency {}",
                step.id,
                dep
            );
        }
    }
    assert!(
        report
            .handles
            .get("bastion")
            .and_then(|h| h.attribute("public_ip"))
            .is_some()
    );
}

#[tokio::test]
async fn test_single_slot_follows_plan_order() {
    let (topology, plan) = fixture();
    let backend = Arc::new(SimulatedBackend::new(&topology.stack));

    executor(backend.clone())
        .with_max_parallel(1)
        .apply(&topology, &plan, HandleSet::new())
        .await;

    let expected: Vec<String> = plan.ids().into_iter().map(String::from).collect();
    assert_eq!(backend.calls(), expected);
}

#[tokio::test]
async fn test_existing_handles_are_reused() {
    let (topology, plan) = fixture();
    let backend = Arc::new(SimulatedBackend::new(&topology.stack));

    let first = executor(Arc::new(SimulatedBackend::new(&topology.stack)))
        .apply(&topology, &plan, HandleSet::new())
        .await;
    let mut existing = HandleSet::new();
    for id in ["public-1", "private-1", "pub"] {
        existing.insert(first.handles.get(id).unwrap().clone());
    }

    let report = executor(backend.clone())
        .apply(&topology, &plan, existing)
        .await;

    assert!(report.is_success());
    assert_eq!(report.reused, vec!["public-1", "private-1", "pub"]);
    let calls = backend.calls();
    assert!(!calls.contains(&"pub".to_string()));
    assert!(calls.contains(&"server".to_string()));
}

#[tokio::test]
async fn test_failure_skips_dependents_only() {
    let (topology, plan) = fixture();
    let backend = Arc::new(
        SimulatedBackend::new(&topology.stack)
            .fail_on("priv", BackendError::Rejected("quota exceeded".to_string())),
    );

    let report = executor(backend)
        .apply(&topology, &plan, HandleSet::new())
        .await;

    assert!(!report.is_success());
    assert_eq!(
        report.failure("priv").map(|f| &f.error),
        Some(&BackendError::Rejected("quota exceeded".to_string()))
    );
    assert_eq!(
        report.skipped,
        vec![SkippedStep {
            id: "server".to_string(),
            blocked_by: "priv".to_string(),
        }]
    );
    // the bastion branch does not depend on priv
    assert!(report.succeeded.contains(&"bastion".to_string()));
    assert!(report.handles.contains("bastion"));
    assert!(report.not_started.is_empty());
}

#[tokio::test]
async fn test_halt_all_stops_new_launches() {
    let (topology, plan) = fixture();
    let backend = Arc::new(
        SimulatedBackend::new(&topology.stack)
            .fail_on("private-1", BackendError::Rejected("no capacity".to_string())),
    );

    let report = executor(backend)
        .with_max_parallel(1)
        .with_failure_policy(FailurePolicy::HaltAll)
        .apply(&topology, &plan, HandleSet::new())
        .await;

    assert_eq!(report.succeeded, vec!["public-1"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        report.skipped,
        vec![SkippedStep {
            id: "server".to_string(),
            blocked_by: "private-1".to_string(),
        }]
    );
    assert_eq!(report.not_started, vec!["pub", "priv", "bastion"]);
}

/// Fails the first `failures` calls for one id with a transient error
struct FlakyBackend {
    inner: SimulatedBackend,
    id: String,
    failures: u32,
    attempts: AtomicU32,
}

#[async_trait]
impl ProvisioningBackend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn create_resource(
        &self,
        entity: Entity<'_>,
        dependencies: &HandleSet,
    ) -> Result<Handle, BackendError> {
        if entity.id() == self.id {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(BackendError::Unavailable("throttled".to_string()));
            }
        }
        self.inner.create_resource(entity, dependencies).await
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (topology, plan) = fixture();
    let backend = Arc::new(FlakyBackend {
        inner: SimulatedBackend::new(&topology.stack),
        id: "bastion".to_string(),
        failures: 2,
        attempts: AtomicU32::new(0),
    });

    let report = Executor::new(backend.clone())
        .with_retry(fast_retry(3))
        .apply(&topology, &plan, HandleSet::new())
        .await;

    assert!(report.is_success(), "{:?}", report.failed);
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retries_give_up_after_max_attempts() {
    let (topology, plan) = fixture();
    let backend = Arc::new(FlakyBackend {
        inner: SimulatedBackend::new(&topology.stack),
        id: "bastion".to_string(),
        failures: 5,
        attempts: AtomicU32::new(0),
    });

    let report = Executor::new(backend.clone())
        .with_retry(fast_retry(2))
        .apply(&topology, &plan, HandleSet::new())
        .await;

    assert!(report.failure("bastion").is_some());
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 2);
}
