//! Topology synthesizer
//!
//! Turns a [`Topology`] into a [`ProvisioningPlan`]. Pure and deterministic:
//! identical declarations always produce the same step order.

use crate::error::SynthesisError;
use crate::model::{
    Entity, EntityKind, OutputBody, OutputDecl, OutputTemplate, ResourceSpec, Topology,
    is_tls_protocol, is_valid_id, scan_placeholders, ssh_proxy_command,
};
use crate::plan::{PlanStep, ProvisioningPlan};
use crate::policy::{self, PolicyReport};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info, instrument};

type SynthResult<T> = std::result::Result<T, SynthesisError>;

/// A plan together with the non-fatal policy findings
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub plan: ProvisioningPlan,
    pub report: PolicyReport,
}

/// Outgoing edge of a plan node
#[derive(Debug, Clone, Copy)]
struct Edge<'a> {
    target: &'a str,
    expected: EntityKind,
}

/// Reference graph over zones, groups and descriptors
struct Graph<'a> {
    entities: Vec<Entity<'a>>,
    index: HashMap<&'a str, usize>,
    edges: Vec<Vec<Edge<'a>>>,
}

impl<'a> Graph<'a> {
    fn build(topology: &'a Topology) -> SynthResult<Self> {
        let entities: Vec<Entity<'a>> = topology.entities().collect();
        let mut index = HashMap::with_capacity(entities.len());
        for (i, entity) in entities.iter().enumerate() {
            if !is_valid_id(entity.id()) {
                return Err(SynthesisError::InvalidId {
                    id: entity.id().to_string(),
                });
            }
            if index.insert(entity.id(), i).is_some() {
                return Err(SynthesisError::DuplicateId {
                    id: entity.id().to_string(),
                });
            }
        }

        let edges = entities.iter().map(|e| edges_of(*e)).collect();
        Ok(Self {
            entities,
            index,
            edges,
        })
    }

    /// Known, distinct dependencies of node `i`, in reference order
    fn dependencies(&self, i: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        self.edges[i]
            .iter()
            .filter_map(|e| self.index.get(e.target).copied())
            .filter(|&j| j != i && seen.insert(j))
            .collect()
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            graph: &Graph<'_>,
            node: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::Active;
            stack.push(node);
            for dep in graph.dependencies(node) {
                match marks[dep] {
                    Mark::Active => {
                        let start = stack.iter().position(|&n| n == dep).unwrap_or(0);
                        let mut cycle = stack[start..].to_vec();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Mark::New => {
                        if let Some(cycle) = visit(graph, dep, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[node] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::New; self.entities.len()];
        let mut stack = Vec::new();
        for node in 0..self.entities.len() {
            if marks[node] == Mark::New
                && let Some(cycle) = visit(self, node, &mut marks, &mut stack)
            {
                return Some(
                    cycle
                        .into_iter()
                        .map(|n| self.entities[n].id().to_string())
                        .collect(),
                );
            }
        }
        None
    }

    /// Kahn's algorithm; ready nodes leave in declaration order
    fn topological_order(&self) -> Vec<usize> {
        let n = self.entities.len();
        let deps: Vec<Vec<usize>> = (0..n).map(|i| self.dependencies(i)).collect();
        let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut dependents = vec![Vec::new(); n];
        for (i, ds) in deps.iter().enumerate() {
            for &d in ds {
                dependents[d].push(i);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| remaining[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &dependent in &dependents[i] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
        order
    }
}

fn edges_of(entity: Entity<'_>) -> Vec<Edge<'_>> {
    match entity {
        Entity::Zone(_) => Vec::new(),
        Entity::AccessGroup(group) => group
            .referenced_groups()
            .into_iter()
            .map(|target| Edge {
                target,
                expected: EntityKind::AccessGroup,
            })
            .collect(),
        Entity::Resource(descriptor) => descriptor
            .references()
            .into_iter()
            .map(|r| Edge {
                target: r.target,
                expected: r.expected,
            })
            .collect(),
    }
}

/// Build a provisioning plan, failing on the first invalid declaration
pub fn synthesize(topology: &Topology) -> SynthResult<ProvisioningPlan> {
    synthesize_with_report(topology).map(|s| s.plan)
}

/// Build a provisioning plan and keep the policy advisories
#[instrument(skip_all, fields(stack = %topology.stack.name))]
pub fn synthesize_with_report(topology: &Topology) -> SynthResult<Synthesis> {
    debug!(entities = topology.len(), "Building reference graph");
    let graph = Graph::build(topology)?;

    check_zone_layout(topology)?;

    if let Some(involved_ids) = graph.find_cycle() {
        return Err(SynthesisError::CyclicDependency { involved_ids });
    }

    check_references(&graph, topology)?;

    let report = reachable_report(topology);
    if let Some(violation) = report.violations.first() {
        return Err(SynthesisError::InsecureIngress {
            group_id: violation.group_id.clone(),
            rule_index: violation.rule_index,
            reason: violation.reason(),
        });
    }

    check_placement(topology)?;
    let outputs = compose_outputs(topology)?;

    let steps: Vec<PlanStep> = graph
        .topological_order()
        .into_iter()
        .enumerate()
        .map(|(index, node)| PlanStep {
            index,
            id: graph.entities[node].id().to_string(),
            kind: graph.entities[node].kind(),
            depends_on: graph
                .dependencies(node)
                .into_iter()
                .map(|d| graph.entities[d].id().to_string())
                .collect(),
        })
        .collect();

    info!(
        steps = steps.len(),
        outputs = outputs.len(),
        advisories = report.advisories.len(),
        "Synthesized provisioning plan"
    );

    Ok(Synthesis {
        plan: ProvisioningPlan {
            stack: topology.stack.clone(),
            steps,
            outputs,
        },
        report,
    })
}

/// Run the access checker over every group without failing
pub fn audit(topology: &Topology) -> PolicyReport {
    policy::check_topology(topology)
}

fn check_zone_layout(topology: &Topology) -> SynthResult<()> {
    let zones = &topology.zones;
    for (i, first) in zones.iter().enumerate() {
        if let Some(second) = zones[i + 1..].iter().find(|z| z.cidr.overlaps(&first.cidr)) {
            return Err(SynthesisError::OverlappingZones {
                first: first.id.clone(),
                second: second.id.clone(),
            });
        }
    }

    for zone in zones {
        if let Some(network) = &topology.stack.network
            && !network.contains(&zone.cidr)
        {
            return Err(SynthesisError::ZoneOutsideNetwork {
                zone_id: zone.id.clone(),
                network: network.to_string(),
            });
        }
        if let Some(region) = &topology.stack.region
            && !zone.availability_zone.starts_with(region.as_str())
        {
            return Err(SynthesisError::ZoneOutsideRegion {
                zone_id: zone.id.clone(),
                region: region.clone(),
            });
        }
    }
    Ok(())
}

/// Output ids and the kind each must have
fn output_references(output: &OutputDecl) -> Vec<(String, Option<EntityKind>)> {
    match &output.body {
        OutputBody::Template(template) => scan_placeholders(template)
            .into_iter()
            .map(|p| (p.descriptor_id, None))
            .collect(),
        OutputBody::SshProxy {
            bastion, target, ..
        } => vec![
            (bastion.clone(), Some(EntityKind::Instance)),
            (target.clone(), Some(EntityKind::Instance)),
        ],
    }
}

fn check_references(graph: &Graph<'_>, topology: &Topology) -> SynthResult<()> {
    for (i, entity) in graph.entities.iter().enumerate() {
        for edge in &graph.edges[i] {
            if !graph.index.contains_key(edge.target) {
                return Err(SynthesisError::UnknownReference {
                    from: entity.id().to_string(),
                    to: edge.target.to_string(),
                });
            }
        }
    }
    for output in &topology.outputs {
        for (id, _) in output_references(output) {
            if !graph.index.contains_key(id.as_str()) {
                return Err(SynthesisError::UnknownReference {
                    from: output.name.clone(),
                    to: id,
                });
            }
        }
    }

    for (i, entity) in graph.entities.iter().enumerate() {
        for edge in &graph.edges[i] {
            let actual = graph.entities[graph.index[edge.target]].kind();
            if actual != edge.expected {
                return Err(SynthesisError::ReferenceKindMismatch {
                    from: entity.id().to_string(),
                    to: edge.target.to_string(),
                    expected: edge.expected,
                    actual,
                });
            }
        }
    }
    for output in &topology.outputs {
        for (id, expected) in output_references(output) {
            let actual = graph.entities[graph.index[id.as_str()]].kind();
            if let Some(expected) = expected
                && actual != expected
            {
                return Err(SynthesisError::ReferenceKindMismatch {
                    from: output.name.clone(),
                    to: id,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(())
}

/// Checker findings restricted to groups that descriptors actually use
fn reachable_report(topology: &Topology) -> PolicyReport {
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = topology
        .descriptors
        .iter()
        .flat_map(|d| d.references())
        .filter(|r| r.expected == EntityKind::AccessGroup)
        .map(|r| r.target)
        .collect();
    while let Some(id) = pending.pop() {
        if reachable.insert(id)
            && let Some(group) = topology.group(id)
        {
            pending.extend(group.referenced_groups());
        }
    }

    let mut report = policy::check_topology(topology);
    report
        .violations
        .retain(|v| reachable.contains(v.group_id.as_str()));
    report.advisories.retain(|a| match a {
        policy::Advisory::UnrestrictedIngress { group_id, .. } => {
            reachable.contains(group_id.as_str())
        }
        policy::Advisory::OpenListener { .. } => true,
    });
    report
}

fn check_placement(topology: &Topology) -> SynthResult<()> {
    for descriptor in &topology.descriptors {
        match &descriptor.spec {
            ResourceSpec::Instance(instance) => {
                let private_zone = topology
                    .zone(&instance.zone)
                    .is_some_and(|z| !z.is_public());
                let public_group = topology
                    .group(&instance.access_group)
                    .is_some_and(|g| g.is_public());
                if private_zone && public_group {
                    return Err(SynthesisError::ExposedPrivateInstance {
                        descriptor_id: descriptor.id.clone(),
                        group_id: instance.access_group.clone(),
                    });
                }
            }
            ResourceSpec::Listener(listener) => {
                if is_tls_protocol(&listener.protocol) && listener.certificates.is_empty() {
                    return Err(SynthesisError::MissingCertificate {
                        listener_id: descriptor.id.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn compose_outputs(topology: &Topology) -> SynthResult<Vec<OutputTemplate>> {
    let login_user = |output: &OutputDecl, id: &str| -> SynthResult<String> {
        topology
            .descriptor(id)
            .and_then(|d| d.as_instance())
            .and_then(|i| i.login_user.clone())
            .ok_or_else(|| SynthesisError::MissingLoginUser {
                output: output.name.clone(),
                instance: id.to_string(),
            })
    };

    topology
        .outputs
        .iter()
        .map(|output| {
            let template = match &output.body {
                OutputBody::Template(template) => template.clone(),
                OutputBody::SshProxy {
                    bastion,
                    target,
                    key_path,
                } => {
                    let key = key_path
                        .clone()
                        .unwrap_or_else(|| topology.stack.default_key_path());
                    ssh_proxy_command(
                        &key,
                        &login_user(output, bastion)?,
                        bastion,
                        &login_user(output, target)?,
                        target,
                    )
                }
            };
            Ok(OutputTemplate {
                name: output.name.clone(),
                template,
                description: output.description.clone(),
            })
        })
        .collect()
}
