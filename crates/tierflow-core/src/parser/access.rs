//! Parsing of `access-group` nodes

use super::{arguments, first_bool, first_string, parse_cidr, port_value, property_string, required_id};
use crate::error::{DeclarationError, Result};
use crate::model::{AccessGroup, AccessRule, Direction, GroupTier, Peer, PortRange, Protocol};
use kdl::KdlNode;

/// Parse an `access-group` node
///
/// ```kdl
/// access-group "pub" tier="public" {
///     description "bastion and load balancer tier"
///     ingress "tcp" 22 from="0.0.0.0/0" description="SSH"
///     ingress "tcp" "8000-8100" group="pub"
///     egress "all" to="0.0.0.0/0"
/// }
/// ```
pub fn parse_access_group(node: &KdlNode) -> Result<AccessGroup> {
    let id = required_id(node)?;
    let owner = format!("access-group '{}'", id);

    let tier = match property_string(node, "tier") {
        Some(tier) => GroupTier::parse(&tier).ok_or_else(|| {
            DeclarationError::InvalidConfig(format!("{}: unknown tier '{}'", owner, tier))
        })?,
        None => GroupTier::default(),
    };
    let mut group = AccessGroup::new(id, tier);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "description" => group.description = first_string(child),
                "allow-all-outbound" | "default-egress" => {
                    group.default_egress_allowed = first_bool(child).unwrap_or(true);
                }
                "ingress" => group.rules.push(parse_rule(child, Direction::Ingress, &owner)?),
                "egress" => group.rules.push(parse_rule(child, Direction::Egress, &owner)?),
                _ => {}
            }
        }
    }

    Ok(group)
}

fn parse_rule(node: &KdlNode, direction: Direction, owner: &str) -> Result<AccessRule> {
    let invalid = |msg: String| DeclarationError::InvalidConfig(format!("{}: {}", owner, msg));
    let mut args = arguments(node);

    let protocol = match args.next() {
        Some(value) => {
            let name = value
                .as_string()
                .ok_or_else(|| invalid(format!("protocol must be a string, got {}", value)))?;
            Protocol::parse(name).ok_or_else(|| invalid(format!("unknown protocol '{}'", name)))?
        }
        None => return Err(invalid("rule requires a protocol".to_string())),
    };

    let ports = match args.next() {
        Some(value) => match value.as_string() {
            Some(text) => {
                PortRange::parse(text).ok_or_else(|| invalid(format!("invalid ports '{}'", text)))?
            }
            None => PortRange::Single(port_value(value, owner)?),
        },
        None => PortRange::All,
    };

    let range_key = match direction {
        Direction::Ingress => "from",
        Direction::Egress => "to",
    };
    let peer = match (property_string(node, range_key), property_string(node, "group")) {
        (Some(range), None) => Peer::Range(parse_cidr(&range, owner)?),
        (None, Some(group)) => Peer::Group(group),
        (Some(_), Some(_)) => {
            return Err(invalid(format!(
                "rule takes either {}= or group=, not both",
                range_key
            )));
        }
        (None, None) => return Err(invalid(format!("rule requires {}= or group=", range_key))),
    };

    Ok(AccessRule {
        direction,
        protocol,
        ports,
        peer,
        description: property_string(node, "description"),
    })
}
