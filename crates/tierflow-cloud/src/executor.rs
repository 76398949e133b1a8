//! Plan execution
//!
//! Runs a [`ProvisioningPlan`] against a backend. A step starts only after
//! all of its dependencies have handles; independent steps run concurrently
//! up to `max_parallel`.

use crate::backend::{ProvisioningBackend, RetryConfig};
use crate::error::BackendError;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tierflow_core::{Entity, Handle, HandleSet, PlanStep, ProvisioningPlan, Topology};
use tracing::{debug, info, instrument, warn};

/// What happens to independent branches once a step fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Keep running steps that do not depend on the failure
    #[default]
    ContinueIndependent,
    /// Start nothing new after the first failure
    HaltAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub id: String,
    pub error: BackendError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStep {
    pub id: String,
    /// The failed step this one transitively depends on
    pub blocked_by: String,
}

/// Outcome of one apply run
///
/// Every plan step lands in exactly one of `succeeded`, `reused`, `failed`,
/// `skipped` or `not_started`, so a later run can resume from `handles`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub succeeded: Vec<String>,
    pub reused: Vec<String>,
    pub failed: Vec<StepFailure>,
    pub skipped: Vec<SkippedStep>,
    pub not_started: Vec<String>,
    /// Existing and newly created handles
    pub handles: HandleSet,
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && self.not_started.is_empty()
    }

    pub fn failure(&self, id: &str) -> Option<&StepFailure> {
        self.failed.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

pub struct Executor {
    backend: Arc<dyn ProvisioningBackend>,
    max_parallel: usize,
    failure_policy: FailurePolicy,
    retry: RetryConfig,
}

impl Executor {
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            backend,
            max_parallel: 4,
            failure_policy: FailurePolicy::default(),
            retry: RetryConfig::default(),
        }
    }

    /// At least one step always runs
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Execute `plan`, reusing handles from `existing`
    #[instrument(skip_all, fields(backend = self.backend.name(), steps = plan.len()))]
    pub async fn apply(
        &self,
        topology: &Topology,
        plan: &ProvisioningPlan,
        existing: HandleSet,
    ) -> ApplyReport {
        let started = Instant::now();
        let steps = &plan.steps;
        let mut report = ApplyReport {
            handles: existing,
            ..Default::default()
        };
        let mut states = vec![StepState::Pending; steps.len()];

        for (i, step) in steps.iter().enumerate() {
            if report.handles.contains(&step.id) {
                debug!(id = %step.id, "Reusing existing handle");
                states[i] = StepState::Done;
                report.reused.push(step.id.clone());
            }
        }

        let mut running = FuturesUnordered::new();
        let mut halted = false;

        loop {
            if !halted {
                for (i, step) in steps.iter().enumerate() {
                    if running.len() >= self.max_parallel {
                        break;
                    }
                    if states[i] != StepState::Pending || !self.is_ready(plan, &states, step) {
                        continue;
                    }
                    states[i] = StepState::Running;
                    let dependencies = report.handles.subset(&step.depends_on);
                    let entity = topology.entity(&step.id);
                    running.push(async move {
                        let result = match entity {
                            Some(entity) => self.create(entity, &dependencies).await,
                            None => Err(BackendError::Unsupported(format!(
                                "'{}' is not declared in the topology",
                                step.id
                            ))),
                        };
                        (i, result)
                    });
                }
            }

            let Some((i, result)) = running.next().await else {
                break;
            };
            let step = &steps[i];
            match result {
                Ok(handle) => {
                    info!(id = %step.id, provider_id = %handle.provider_id, "Created");
                    states[i] = StepState::Done;
                    report.succeeded.push(step.id.clone());
                    report.handles.insert(handle);
                }
                Err(error) => {
                    warn!(id = %step.id, error = %error, "Step failed");
                    states[i] = StepState::Failed;
                    for dependent in plan.dependents_closure(&step.id) {
                        if let Some(j) = plan.position(&dependent)
                            && states[j] == StepState::Pending
                        {
                            states[j] = StepState::Skipped;
                            report.skipped.push(SkippedStep {
                                id: dependent,
                                blocked_by: step.id.clone(),
                            });
                        }
                    }
                    report.failed.push(StepFailure {
                        id: step.id.clone(),
                        error,
                    });
                    if self.failure_policy == FailurePolicy::HaltAll {
                        halted = true;
                    }
                }
            }
        }

        report.not_started = steps
            .iter()
            .zip(&states)
            .filter(|(_, state)| **state == StepState::Pending)
            .map(|(step, _)| step.id.clone())
            .collect();
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            succeeded = report.succeeded.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            not_started = report.not_started.len(),
            "Apply finished"
        );
        report
    }

    fn is_ready(&self, plan: &ProvisioningPlan, states: &[StepState], step: &PlanStep) -> bool {
        step.depends_on.iter().all(|dep| {
            plan.position(dep)
                .is_some_and(|j| states[j] == StepState::Done)
        })
    }

    async fn create(&self, entity: Entity<'_>, dependencies: &HandleSet) -> Result<Handle, BackendError> {
        let mut attempt = 1;
        loop {
            debug!(id = entity.id(), kind = %entity.kind(), attempt, "Creating resource");
            match self.backend.create_resource(entity, dependencies).await {
                Err(error) if error.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(id = entity.id(), error = %error, ?delay, "Transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests;
