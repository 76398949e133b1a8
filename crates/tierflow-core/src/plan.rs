//! Provisioning plan types

use crate::model::{EntityKind, OutputTemplate, StackConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One create action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Position in the plan, stable across runs for identical input
    pub index: usize,

    /// Declaration id of the zone, group or descriptor
    pub id: String,

    pub kind: EntityKind,

    /// Direct references, in reference order
    pub depends_on: Vec<String>,
}

/// Dependency-ordered create actions plus the outputs to resolve afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningPlan {
    pub stack: StackConfig,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub outputs: Vec<OutputTemplate>,
}

impl ProvisioningPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    /// Every step that transitively depends on `id`, in plan order
    pub fn dependents_closure(&self, id: &str) -> Vec<String> {
        let mut tainted: HashSet<&str> = HashSet::from([id]);
        let mut out = Vec::new();

        // Dependencies always precede their dependents, so one forward pass suffices
        for step in &self.steps {
            if step.depends_on.iter().any(|d| tainted.contains(d.as_str())) {
                tainted.insert(step.id.as_str());
                out.push(step.id.clone());
            }
        }
        out
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        let mut by_kind: Vec<(EntityKind, usize)> = Vec::new();
        for step in &self.steps {
            match by_kind.iter_mut().find(|(k, _)| *k == step.kind) {
                Some((_, n)) => *n += 1,
                None => by_kind.push((step.kind, 1)),
            }
        }
        PlanSummary {
            total: self.steps.len(),
            by_kind,
            outputs: self.outputs.len(),
        }
    }
}

impl fmt::Display for ProvisioningPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{:>3}. create {} {}", step.index + 1, step.kind, step.id)?;
            if !step.depends_on.is_empty() {
                write!(f, " (after {})", step.depends_on.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Summary of planned steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub total: usize,
    pub by_kind: Vec<(EntityKind, usize)>,
    pub outputs: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .by_kind
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind))
            .collect();
        write!(
            f,
            "{} to create ({}), {} outputs",
            self.total,
            parts.join(", "),
            self.outputs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, id: &str, kind: EntityKind, deps: &[&str]) -> PlanStep {
        PlanStep {
            index,
            id: id.to_string(),
            kind,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn sample() -> ProvisioningPlan {
        ProvisioningPlan {
            stack: StackConfig::named("t"),
            steps: vec![
                step(0, "public-1", EntityKind::Zone, &[]),
                step(1, "pub", EntityKind::AccessGroup, &[]),
                step(2, "priv", EntityKind::AccessGroup, &["pub"]),
                step(3, "bastion", EntityKind::Instance, &["public-1", "pub"]),
                step(4, "server", EntityKind::Instance, &["priv"]),
            ],
            outputs: vec![],
        }
    }

    #[test]
    fn test_dependents_closure() {
        let plan = sample();
        assert_eq!(
            plan.dependents_closure("pub"),
            vec!["priv", "bastion", "server"]
        );
        assert_eq!(plan.dependents_closure("public-1"), vec!["bastion"]);
        assert!(plan.dependents_closure("server").is_empty());
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert_eq!(summary.total, 5);
        assert_eq!(
            summary.to_string(),
            "5 to create (1 zone, 2 access-group, 2 instance), 0 outputs"
        );
    }

    #[test]
    fn test_display_numbers_steps() {
        let text = sample().to_string();
        assert!(text.contains("  1. create zone public-1\n"));
        assert!(text.contains("  4. create instance bastion (after public-1, pub)"));
    }
}
