//! Parsing of `stack` and `zone` nodes

use super::{first_string, parse_cidr, property_string, required, required_id, string_arguments};
use crate::error::{DeclarationError, Result};
use crate::model::{StackConfig, Zone, ZoneKind};
use kdl::KdlNode;

/// Parse the `stack` node
///
/// ```kdl
/// stack "custody" {
///     account "111111111111"
///     region "ap-southeast-1"
///     key-pair "custody"
///     network "10.0.0.0/16"
///     availability-zones "ap-southeast-1a" "ap-southeast-1b"
/// }
/// ```
pub fn parse_stack(node: &KdlNode, default_name: String) -> Result<StackConfig> {
    let mut stack = StackConfig::named(first_string(node).unwrap_or(default_name));

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "account" => stack.account = first_string(child),
                "region" => stack.region = first_string(child),
                "key-pair" | "key_pair" => stack.key_pair = first_string(child),
                "network" => {
                    let value = required(first_string(child), "stack", "a network range")?;
                    stack.network = Some(parse_cidr(&value, "stack")?);
                }
                "availability-zones" | "availability_zones" => {
                    stack.availability_zones = string_arguments(child);
                }
                "zone-prefix" | "zone_prefix" => {
                    let prefix = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_integer())
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or_else(|| {
                            DeclarationError::InvalidConfig(
                                "stack: zone-prefix must be a prefix length".to_string(),
                            )
                        })?;
                    stack.zone_prefix = Some(prefix);
                }
                _ => {}
            }
        }
    }

    Ok(stack)
}

/// Parse a `zone` node
///
/// `zone "public-1" kind="public" cidr="10.0.0.0/24" az="ap-southeast-1a"`
pub fn parse_zone(node: &KdlNode) -> Result<Zone> {
    let id = required_id(node)?;
    let owner = format!("zone '{}'", id);

    let kind = match property_string(node, "kind") {
        Some(kind) => ZoneKind::parse(&kind).ok_or_else(|| {
            DeclarationError::InvalidConfig(format!("{}: unknown kind '{}'", owner, kind))
        })?,
        None => ZoneKind::PrivateWithEgress,
    };
    let cidr = required(property_string(node, "cidr"), &owner, "cidr")?;
    let availability_zone = required(
        property_string(node, "az").or_else(|| property_string(node, "availability-zone")),
        &owner,
        "az",
    )?;

    Ok(Zone::new(id, parse_cidr(&cidr, &owner)?, kind, availability_zone))
}
