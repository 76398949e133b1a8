//! KDL parser
//!
//! Reads topology declarations. Each node family lives in its own module.

mod access;
mod network;
mod output;
mod resource;

use access::parse_access_group;
use network::{parse_stack, parse_zone};
use output::{parse_output, parse_ssh_output};
use resource::parse_resource;

use crate::error::{DeclarationError, Result};
use crate::model::{Cidr, Topology, carve_zones, is_valid_id};
use kdl::{KdlDocument, KdlNode, KdlValue};
use tracing::{debug, warn};

/// Zone block length used when the stack carves its own zones
pub const DEFAULT_ZONE_PREFIX: u8 = 24;

/// Parse a KDL string; `default_name` is used when no `stack` node names the stack
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Topology> {
    let doc: KdlDocument = content.parse()?;
    let mut topology = Topology::default();
    topology.stack.name = default_name;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                let default_name = std::mem::take(&mut topology.stack.name);
                topology.stack = parse_stack(node, default_name)?;
            }
            "zone" => topology.zones.push(parse_zone(node)?),
            "access-group" => topology.access_groups.push(parse_access_group(node)?),
            "instance" | "load-balancer" | "target-group" | "listener" | "certificate"
            | "role" | "key" => topology.descriptors.push(parse_resource(node)?),
            "output" => topology.outputs.push(parse_output(node)?),
            "ssh-output" => topology.outputs.push(parse_ssh_output(node)?),
            "variables" => {
                // consumed by the template pass
            }
            other => {
                warn!(node = other, "Skipping unknown node");
            }
        }
    }

    if topology.zones.is_empty()
        && let Some(network) = topology.stack.network
        && !topology.stack.availability_zones.is_empty()
    {
        let prefix = topology.stack.zone_prefix.unwrap_or(DEFAULT_ZONE_PREFIX);
        topology.zones = carve_zones(&network, &topology.stack.availability_zones, prefix)
            .map_err(|source| DeclarationError::InvalidNetwork {
                node: "stack".to_string(),
                source,
            })?;
        debug!(zones = topology.zones.len(), %network, "Carved default zone layout");
    }

    Ok(topology)
}

// Helpers shared by the node parsers

pub(crate) fn arguments(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    arguments(node)
        .next()
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn string_arguments(node: &KdlNode) -> Vec<String> {
    arguments(node)
        .filter_map(|v| v.as_string())
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn first_bool(node: &KdlNode) -> Option<bool> {
    arguments(node).next().and_then(|v| v.as_bool())
}

pub(crate) fn property_string(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

/// Required leading string argument, used as the node's id
pub(crate) fn required_id(node: &KdlNode) -> Result<String> {
    let id = first_string(node).ok_or_else(|| {
        DeclarationError::InvalidConfig(format!("{} requires a name", node.name().value()))
    })?;
    if !is_valid_id(&id) {
        return Err(DeclarationError::InvalidId {
            node: node.name().value().to_string(),
            id,
        });
    }
    Ok(id)
}

/// Required string child such as `zone "private-1"`
pub(crate) fn required(value: Option<String>, owner: &str, field: &str) -> Result<String> {
    value.ok_or_else(|| DeclarationError::InvalidConfig(format!("{} requires {}", owner, field)))
}

pub(crate) fn port_value(value: &KdlValue, owner: &str) -> Result<u16> {
    value
        .as_integer()
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| DeclarationError::InvalidConfig(format!("{}: invalid port {}", owner, value)))
}

pub(crate) fn first_port(node: &KdlNode, owner: &str) -> Result<u16> {
    let value = arguments(node).next().ok_or_else(|| {
        DeclarationError::InvalidConfig(format!("{}: {} requires a port", owner, node.name().value()))
    })?;
    port_value(value, owner)
}

pub(crate) fn parse_cidr(value: &str, owner: &str) -> Result<Cidr> {
    value
        .parse()
        .map_err(|source| DeclarationError::InvalidNetwork {
            node: owner.to_string(),
            source,
        })
}
