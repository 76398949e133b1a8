//! Access policy invariant checker
//!
//! Enforces "no direct public ingress to private compute":
//!
//! - every ingress rule of a `Private` group must name a private address
//!   range or another access group;
//! - a group reference into another `Private` group is followed
//!   recursively, and an exposed group anywhere down the chain taints the
//!   referencing rule;
//! - a reference to a `Public` group is a trusted hop (bastion pattern);
//! - unrestricted ingress on a `Public` group is allowed but recorded as an
//!   advisory for audit.

use crate::model::{AccessGroup, Cidr, Peer, PortRange, ResourceSpec, Topology};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// `0.0.0.0/0` or `::/0`
    UnrestrictedSource,
    /// A routable range that is not the whole internet
    PublicSource(Cidr),
    /// The trusted group is itself an exposed private group
    ExposedThroughChain { via: Vec<String> },
}

/// A fatal policy finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub group_id: String,
    pub rule_index: usize,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn reason(&self) -> String {
        match &self.kind {
            ViolationKind::UnrestrictedSource => {
                "private group accepts ingress from anywhere".to_string()
            }
            ViolationKind::PublicSource(cidr) => {
                format!("private group accepts ingress from public range {}", cidr)
            }
            ViolationKind::ExposedThroughChain { via } => {
                format!("trusted group chain is exposed: {}", via.join(" -> "))
            }
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rule #{}: {}",
            self.group_id,
            self.rule_index,
            self.reason()
        )
    }
}

/// A non-fatal finding kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Advisory {
    UnrestrictedIngress {
        group_id: String,
        rule_index: usize,
        ports: PortRange,
    },
    OpenListener {
        listener_id: String,
        port: u16,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::UnrestrictedIngress {
                group_id,
                rule_index,
                ports,
            } => write!(
                f,
                "{} rule #{}: port {} open to the internet",
                group_id, rule_index, ports
            ),
            Advisory::OpenListener { listener_id, port } => {
                write!(f, "listener {}: port {} open to the internet", listener_id, port)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub violations: Vec<Violation>,
    pub advisories: Vec<Advisory>,
}

impl PolicyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check access groups in declaration order
pub fn check(groups: &[AccessGroup]) -> PolicyReport {
    let by_id: HashMap<&str, &AccessGroup> = groups.iter().map(|g| (g.id.as_str(), g)).collect();
    let mut report = PolicyReport::default();

    for group in groups {
        for (index, rule) in group.ingress_rules() {
            match (&rule.peer, group.is_public()) {
                (Peer::Range(cidr), true) => {
                    if cidr.is_unrestricted() {
                        report.advisories.push(Advisory::UnrestrictedIngress {
                            group_id: group.id.clone(),
                            rule_index: index,
                            ports: rule.ports,
                        });
                    }
                }
                (Peer::Range(cidr), false) => {
                    if let Some(kind) = range_violation(cidr) {
                        report.violations.push(Violation {
                            group_id: group.id.clone(),
                            rule_index: index,
                            kind,
                        });
                    }
                }
                (Peer::Group(_), true) => {}
                (Peer::Group(target), false) => {
                    if target == &group.id {
                        continue;
                    }
                    let mut visited = HashSet::from([group.id.as_str()]);
                    if let Some(via) = exposed_chain(target, &by_id, &mut visited) {
                        report.violations.push(Violation {
                            group_id: group.id.clone(),
                            rule_index: index,
                            kind: ViolationKind::ExposedThroughChain { via },
                        });
                    }
                }
            }
        }
    }

    debug!(
        violations = report.violations.len(),
        advisories = report.advisories.len(),
        "Access policy checked"
    );
    report
}

/// Check groups, then record listeners opened to the internet
pub fn check_topology(topology: &Topology) -> PolicyReport {
    let mut report = check(&topology.access_groups);
    for descriptor in &topology.descriptors {
        if let ResourceSpec::Listener(listener) = &descriptor.spec
            && listener.open
        {
            report.advisories.push(Advisory::OpenListener {
                listener_id: descriptor.id.clone(),
                port: listener.port,
            });
        }
    }
    report
}

fn range_violation(cidr: &Cidr) -> Option<ViolationKind> {
    if cidr.is_unrestricted() {
        Some(ViolationKind::UnrestrictedSource)
    } else if !cidr.is_private() {
        Some(ViolationKind::PublicSource(*cidr))
    } else {
        None
    }
}

/// Path from `id` to the first exposed private group, if any
///
/// Public groups end the walk: they are the trusted intermediate hop.
/// Unknown ids are left to reference validation.
fn exposed_chain<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a AccessGroup>,
    visited: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if !visited.insert(id) {
        return None;
    }
    let group: &'a AccessGroup = by_id.get(id).copied()?;
    if group.is_public() {
        return None;
    }

    for (_, rule) in group.ingress_rules() {
        match &rule.peer {
            Peer::Range(cidr) => {
                if range_violation(cidr).is_some() {
                    return Some(vec![group.id.clone()]);
                }
            }
            Peer::Group(next) => {
                if next == &group.id {
                    continue;
                }
                if let Some(mut rest) = exposed_chain(next, by_id, visited) {
                    rest.insert(0, group.id.clone());
                    return Some(rest);
                }
            }
        }
    }
    None
}
