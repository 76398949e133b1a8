//! Deterministic in-memory backend
//!
//! Hands out provider ids, addresses, DNS names and ARNs the way a real
//! cloud would, without talking to one. Used by `tier apply` and tests.

use crate::backend::ProvisioningBackend;
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tierflow_core::{
    ATTR_ARN, ATTR_DNS_NAME, ATTR_PRIVATE_IP, ATTR_PUBLIC_IP, Cidr, Entity, Handle, HandleSet,
    ResourceSpec, StackConfig, ZoneKind,
};
use tracing::debug;

/// First host offset handed out inside a range
const FIRST_HOST_OFFSET: u32 = 10;

/// Documentation range used for simulated public addresses
const PUBLIC_POOL: &str = "203.0.113.0/24";

const DEFAULT_ACCOUNT: &str = "000000000000";
const DEFAULT_REGION: &str = "local-1";

pub const ATTR_CIDR: &str = "cidr";
pub const ATTR_ZONE_KIND: &str = "zone_kind";
pub const ATTR_AVAILABILITY_ZONE: &str = "availability_zone";

#[derive(Debug, Default)]
struct Allocations {
    sequence: u32,
    /// Next host offset per zone id
    hosts: HashMap<String, u32>,
    next_public: u32,
    /// Entity ids in call order
    calls: Vec<String>,
}

pub struct SimulatedBackend {
    account: String,
    region: String,
    failures: HashMap<String, BackendError>,
    allocations: Mutex<Allocations>,
}

impl SimulatedBackend {
    pub fn new(stack: &StackConfig) -> Self {
        Self {
            account: stack
                .account
                .clone()
                .unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            region: stack
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            failures: HashMap::new(),
            allocations: Mutex::new(Allocations::default()),
        }
    }

    /// Make every create call for `id` fail with `error`
    pub fn fail_on(mut self, id: impl Into<String>, error: BackendError) -> Self {
        self.failures.insert(id.into(), error);
        self
    }

    /// Ids passed to `create_resource`, in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Allocations> {
        // a poisoned lock only means a test panicked mid-call
        self.allocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, self.region, self.account, resource
        )
    }

    fn build(&self, entity: Entity<'_>, dependencies: &HandleSet) -> Result<Handle, BackendError> {
        let mut alloc = self.lock();
        alloc.sequence += 1;
        let seq = alloc.sequence;
        let id = entity.id();

        let handle = match entity {
            Entity::Zone(zone) => {
                let kind = match zone.kind {
                    ZoneKind::Public => "public",
                    ZoneKind::PrivateWithEgress => "private",
                };
                Handle::new(id, format!("subnet-{:08x}", seq))
                    .with_attribute(ATTR_CIDR, zone.cidr.to_string())
                    .with_attribute(ATTR_ZONE_KIND, kind)
                    .with_attribute(ATTR_AVAILABILITY_ZONE, zone.availability_zone.clone())
            }
            Entity::AccessGroup(_) => Handle::new(id, format!("sg-{:08x}", seq)),
            Entity::Resource(descriptor) => match &descriptor.spec {
                ResourceSpec::Instance(instance) => {
                    let zone = dependencies.get(&instance.zone).ok_or_else(|| {
                        BackendError::Rejected(format!("zone '{}' does not exist", instance.zone))
                    })?;
                    let cidr: Cidr = zone
                        .attribute(ATTR_CIDR)
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| {
                            BackendError::Rejected(format!("zone '{}' has no range", instance.zone))
                        })?;

                    let offset = alloc
                        .hosts
                        .entry(instance.zone.clone())
                        .or_insert(FIRST_HOST_OFFSET);
                    let private_ip = cidr.host(*offset).ok_or_else(|| {
                        BackendError::Rejected(format!("zone '{}' is full", instance.zone))
                    })?;
                    *offset += 1;

                    let mut handle = Handle::new(id, format!("i-{:017x}", seq))
                        .with_attribute(ATTR_PRIVATE_IP, private_ip.to_string());
                    if zone.attribute(ATTR_ZONE_KIND) == Some("public") {
                        let pool: Cidr = PUBLIC_POOL
                            .parse()
                            .map_err(|e| BackendError::Unavailable(format!("{}", e)))?;
                        let public_ip = pool
                            .host(FIRST_HOST_OFFSET + alloc.next_public)
                            .ok_or_else(|| {
                                BackendError::Unavailable("public address pool exhausted".into())
                            })?;
                        alloc.next_public += 1;
                        handle = handle.with_attribute(ATTR_PUBLIC_IP, public_ip.to_string());
                    }
                    handle
                }
                ResourceSpec::LoadBalancer(lb) => {
                    let scheme = if lb.internet_facing { "" } else { "internal-" };
                    Handle::new(id, format!("{}-{:08x}", id, seq))
                        .with_attribute(
                            ATTR_DNS_NAME,
                            format!(
                                "{}{}-{}.{}.elb.amazonaws.com",
                                scheme, id, seq, self.region
                            ),
                        )
                        .with_attribute(
                            ATTR_ARN,
                            self.arn(
                                "elasticloadbalancing",
                                &format!("loadbalancer/app/{}/{:016x}", id, seq),
                            ),
                        )
                }
                ResourceSpec::TargetGroup(_) => {
                    let arn = self.arn(
                        "elasticloadbalancing",
                        &format!("targetgroup/{}/{:016x}", id, seq),
                    );
                    Handle::new(id, arn.clone()).with_attribute(ATTR_ARN, arn)
                }
                ResourceSpec::Listener(listener) => {
                    let arn = self.arn(
                        "elasticloadbalancing",
                        &format!(
                            "listener/app/{}/{:016x}/{}",
                            listener.load_balancer, seq, listener.port
                        ),
                    );
                    Handle::new(id, arn.clone()).with_attribute(ATTR_ARN, arn)
                }
                ResourceSpec::Certificate(_) => {
                    let arn = self.arn("acm", &format!("certificate/{:08x}", seq));
                    Handle::new(id, arn.clone()).with_attribute(ATTR_ARN, arn)
                }
                ResourceSpec::Role(_) => {
                    // IAM ARNs carry no region
                    let arn = format!("arn:aws:iam::{}:role/{}", self.account, id);
                    Handle::new(id, format!("AROA{:016X}", seq)).with_attribute(ATTR_ARN, arn)
                }
                ResourceSpec::KeyReference(key) => Handle::new(id, key.key_name.clone()),
            },
        };

        alloc.calls.push(id.to_string());
        Ok(handle)
    }
}

#[async_trait]
impl ProvisioningBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn create_resource(
        &self,
        entity: Entity<'_>,
        dependencies: &HandleSet,
    ) -> Result<Handle, BackendError> {
        if let Some(error) = self.failures.get(entity.id()) {
            self.lock().calls.push(entity.id().to_string());
            return Err(error.clone());
        }

        let handle = self.build(entity, dependencies)?;
        debug!(id = %handle.id, provider_id = %handle.provider_id, "Simulated create");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierflow_core::{AccessGroup, GroupTier, InstanceSpec, ResourceDescriptor, Zone};

    fn stack() -> StackConfig {
        let mut stack = StackConfig::named("custody");
        stack.account = Some("111111111111".to_string());
        stack.region = Some("ap-southeast-1".to_string());
        stack
    }

    fn instance(id: &str, zone: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(
            id,
            ResourceSpec::Instance(InstanceSpec {
                zone: zone.to_string(),
                access_group: "pub".to_string(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn test_instances_get_addresses_from_their_zone() {
        let backend = SimulatedBackend::new(&stack());
        let public = Zone::new(
            "public-1",
            "10.0.0.0/24".parse().unwrap(),
            ZoneKind::Public,
            "ap-southeast-1a",
        );
        let private = Zone::new(
            "private-1",
            "10.0.2.0/24".parse().unwrap(),
            ZoneKind::PrivateWithEgress,
            "ap-southeast-1a",
        );

        let mut deps = HandleSet::new();
        deps.insert(
            backend
                .create_resource(Entity::Zone(&public), &HandleSet::new())
                .await
                .unwrap(),
        );
        deps.insert(
            backend
                .create_resource(Entity::Zone(&private), &HandleSet::new())
                .await
                .unwrap(),
        );

        let bastion = instance("bastion", "public-1");
        let server = instance("server", "private-1");
        let worker = instance("worker", "private-1");

        let bastion = backend
            .create_resource(Entity::Resource(&bastion), &deps)
            .await
            .unwrap();
        let server = backend
            .create_resource(Entity::Resource(&server), &deps)
            .await
            .unwrap();
        let worker = backend
            .create_resource(Entity::Resource(&worker), &deps)
            .await
            .unwrap();

        assert_eq!(bastion.attribute(ATTR_PRIVATE_IP), Some("10.0.0.10"));
        assert_eq!(bastion.attribute(ATTR_PUBLIC_IP), Some("203.0.113.10"));
        assert_eq!(server.attribute(ATTR_PRIVATE_IP), Some("10.0.2.10"));
        assert_eq!(server.attribute(ATTR_PUBLIC_IP), None);
        assert_eq!(worker.attribute(ATTR_PRIVATE_IP), Some("10.0.2.11"));
    }

    #[tokio::test]
    async fn test_instance_without_zone_handle_is_rejected() {
        let backend = SimulatedBackend::new(&stack());
        let server = instance("server", "private-1");
        let err = backend
            .create_resource(Entity::Resource(&server), &HandleSet::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_role_arn_uses_account() {
        let backend = SimulatedBackend::new(&stack());
        let role = ResourceDescriptor::new(
            "ec2-role",
            ResourceSpec::Role(tierflow_core::RoleSpec {
                assumed_by: "ec2.amazonaws.com".to_string(),
                managed_policies: vec![],
            }),
        );
        let handle = backend
            .create_resource(Entity::Resource(&role), &HandleSet::new())
            .await
            .unwrap();
        assert_eq!(
            handle.attribute(ATTR_ARN),
            Some("arn:aws:iam::111111111111:role/ec2-role")
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = SimulatedBackend::new(&stack())
            .fail_on("pub", BackendError::Unavailable("throttled".to_string()));
        let group = AccessGroup::new("pub", GroupTier::Public);

        let err = backend
            .create_resource(Entity::AccessGroup(&group), &HandleSet::new())
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Unavailable("throttled".to_string()));
        assert_eq!(backend.calls(), vec!["pub"]);
    }
}
