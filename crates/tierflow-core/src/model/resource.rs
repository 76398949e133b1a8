//! Provisionable resource descriptors
//!
//! Descriptors never own each other. Every cross-resource link is an id,
//! resolved later through the reference graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of any plan node: zones, access groups and resource descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Zone,
    AccessGroup,
    Instance,
    LoadBalancer,
    TargetGroup,
    Listener,
    Certificate,
    Role,
    KeyReference,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Zone => "zone",
            EntityKind::AccessGroup => "access-group",
            EntityKind::Instance => "instance",
            EntityKind::LoadBalancer => "load-balancer",
            EntityKind::TargetGroup => "target-group",
            EntityKind::Listener => "listener",
            EntityKind::Certificate => "certificate",
            EntityKind::Role => "role",
            EntityKind::KeyReference => "key",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing reference of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Attribute holding the reference (e.g. "zone", "role")
    pub attribute: &'static str,
    pub target: &'a str,
    pub expected: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateValidation {
    Dns,
    Email,
}

/// Port/protocol redirect performed by a load balancer (e.g. HTTP 80 -> HTTPS 443)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub from_port: u16,
    pub from_protocol: String,
    pub to_port: u16,
    pub to_protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub zone: String,
    pub access_group: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub instance_type: Option<String>,
    /// Image identifier, passed through untouched
    #[serde(default)]
    pub image: Option<String>,
    /// Login user for SSH outputs
    #[serde(default)]
    pub login_user: Option<String>,
    /// Bootstrap commands, passed through untouched
    #[serde(default)]
    pub user_data: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub zones: Vec<String>,
    #[serde(default)]
    pub access_group: Option<String>,
    pub internet_facing: bool,
    #[serde(default)]
    pub redirects: Vec<Redirect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub protocol: String,
    pub port: u16,
    pub targets: Vec<String>,
    #[serde(default)]
    pub health_check_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub load_balancer: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub certificates: Vec<String>,
    pub default_target_group: String,
    /// Opens the port to the whole internet on the load balancer
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSpec {
    pub domain: String,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    pub validation: CertificateValidation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub assumed_by: String,
    #[serde(default)]
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyReferenceSpec {
    pub key_name: String,
}

/// Kind-specific attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceSpec {
    Instance(InstanceSpec),
    LoadBalancer(LoadBalancerSpec),
    TargetGroup(TargetGroupSpec),
    Listener(ListenerSpec),
    Certificate(CertificateSpec),
    Role(RoleSpec),
    #[serde(rename = "key")]
    KeyReference(KeyReferenceSpec),
}

/// A provisionable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

impl ResourceDescriptor {
    pub fn new(id: impl Into<String>, spec: ResourceSpec) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match &self.spec {
            ResourceSpec::Instance(_) => EntityKind::Instance,
            ResourceSpec::LoadBalancer(_) => EntityKind::LoadBalancer,
            ResourceSpec::TargetGroup(_) => EntityKind::TargetGroup,
            ResourceSpec::Listener(_) => EntityKind::Listener,
            ResourceSpec::Certificate(_) => EntityKind::Certificate,
            ResourceSpec::Role(_) => EntityKind::Role,
            ResourceSpec::KeyReference(_) => EntityKind::KeyReference,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceSpec> {
        match &self.spec {
            ResourceSpec::Instance(spec) => Some(spec),
            _ => None,
        }
    }

    /// Outgoing references in attribute order
    pub fn references(&self) -> Vec<Reference<'_>> {
        fn r<'a>(attribute: &'static str, target: &'a str, expected: EntityKind) -> Reference<'a> {
            Reference {
                attribute,
                target,
                expected,
            }
        }

        let mut refs = Vec::new();
        match &self.spec {
            ResourceSpec::Instance(spec) => {
                refs.push(r("zone", &spec.zone, EntityKind::Zone));
                refs.push(r("access-group", &spec.access_group, EntityKind::AccessGroup));
                if let Some(role) = &spec.role {
                    refs.push(r("role", role, EntityKind::Role));
                }
                if let Some(key) = &spec.key {
                    refs.push(r("key", key, EntityKind::KeyReference));
                }
            }
            ResourceSpec::LoadBalancer(spec) => {
                for zone in &spec.zones {
                    refs.push(r("zones", zone, EntityKind::Zone));
                }
                if let Some(group) = &spec.access_group {
                    refs.push(r("access-group", group, EntityKind::AccessGroup));
                }
            }
            ResourceSpec::TargetGroup(spec) => {
                for target in &spec.targets {
                    refs.push(r("targets", target, EntityKind::Instance));
                }
            }
            ResourceSpec::Listener(spec) => {
                refs.push(r(
                    "load-balancer",
                    &spec.load_balancer,
                    EntityKind::LoadBalancer,
                ));
                for cert in &spec.certificates {
                    refs.push(r("certificates", cert, EntityKind::Certificate));
                }
                refs.push(r(
                    "default-target-group",
                    &spec.default_target_group,
                    EntityKind::TargetGroup,
                ));
            }
            ResourceSpec::Certificate(_) | ResourceSpec::Role(_) | ResourceSpec::KeyReference(_) => {}
        }
        refs
    }
}

/// Whether a listener protocol terminates TLS
pub fn is_tls_protocol(protocol: &str) -> bool {
    matches!(protocol.to_ascii_lowercase().as_str(), "https" | "tls")
}
