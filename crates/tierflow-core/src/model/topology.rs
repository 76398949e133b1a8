//! Topology declaration

use super::access::AccessGroup;
use super::output::OutputDecl;
use super::resource::{EntityKind, ResourceDescriptor};
use super::stack::StackConfig;
use super::zone::Zone;
use serde::{Deserialize, Serialize};

/// Everything that should exist, in declaration order
///
/// The topology owns all zones, groups and descriptors; they refer to each
/// other by id only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub stack: StackConfig,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub access_groups: Vec<AccessGroup>,
    #[serde(default)]
    pub descriptors: Vec<ResourceDescriptor>,
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
}

/// Borrowed view over any plan node
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Zone(&'a Zone),
    AccessGroup(&'a AccessGroup),
    Resource(&'a ResourceDescriptor),
}

impl<'a> Entity<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Entity::Zone(z) => &z.id,
            Entity::AccessGroup(g) => &g.id,
            Entity::Resource(r) => &r.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Zone(_) => EntityKind::Zone,
            Entity::AccessGroup(_) => EntityKind::AccessGroup,
            Entity::Resource(r) => r.kind(),
        }
    }
}

impl Topology {
    pub fn new(stack: StackConfig) -> Self {
        Self {
            stack,
            ..Default::default()
        }
    }

    pub fn with_zone(mut self, zone: Zone) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn with_group(mut self, group: AccessGroup) -> Self {
        self.access_groups.push(group);
        self
    }

    pub fn with_descriptor(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_output(mut self, output: OutputDecl) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn zone(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn group(&self, id: &str) -> Option<&AccessGroup> {
        self.access_groups.iter().find(|g| g.id == id)
    }

    pub fn descriptor(&self, id: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    /// All plan nodes: zones, then access groups, then descriptors
    pub fn entities(&self) -> impl Iterator<Item = Entity<'_>> {
        self.zones
            .iter()
            .map(Entity::Zone)
            .chain(self.access_groups.iter().map(Entity::AccessGroup))
            .chain(self.descriptors.iter().map(Entity::Resource))
    }

    pub fn entity(&self, id: &str) -> Option<Entity<'_>> {
        self.entities().find(|e| e.id() == id)
    }

    pub fn len(&self) -> usize {
        self.zones.len() + self.access_groups.len() + self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupTier, ZoneKind};

    #[test]
    fn test_entities_follow_declaration_order() {
        let topology = Topology::new(StackConfig::named("t"))
            .with_group(AccessGroup::new("pub", GroupTier::Public))
            .with_zone(Zone::new(
                "public-1",
                "10.0.0.0/24".parse().unwrap(),
                ZoneKind::Public,
                "a",
            ));

        let ids: Vec<_> = topology.entities().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["public-1", "pub"]);
        assert_eq!(topology.len(), 2);
        assert_eq!(
            topology.entity("pub").map(|e| e.kind()),
            Some(EntityKind::AccessGroup)
        );
        assert!(topology.entity("missing").is_none());
    }
}
