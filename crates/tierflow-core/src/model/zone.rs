//! Network zones (subnets)

use super::network::{Cidr, NetworkError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability class of a zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// Routed to an internet gateway
    Public,
    /// Outbound only, through a NAT
    PrivateWithEgress,
}

impl ZoneKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(ZoneKind::Public),
            "private" | "private-with-egress" | "private_with_egress" => {
                Some(ZoneKind::PrivateWithEgress)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKind::Public => write!(f, "public"),
            ZoneKind::PrivateWithEgress => write!(f, "private"),
        }
    }
}

/// An address-range partition of the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub cidr: Cidr,
    pub kind: ZoneKind,
    pub availability_zone: String,
}

impl Zone {
    pub fn new(
        id: impl Into<String>,
        cidr: Cidr,
        kind: ZoneKind,
        availability_zone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            cidr,
            kind,
            availability_zone: availability_zone.into(),
        }
    }

    pub fn is_public(&self) -> bool {
        self.kind == ZoneKind::Public
    }
}

/// Lay out the default two-tier zone set over `network`
///
/// One public and one private zone per availability zone, each a `/prefix`
/// block. Public zones take the first blocks: with two availability zones
/// and `/24` inside `10.0.0.0/16` this yields `public-1` = `10.0.0.0/24`,
/// `public-2` = `10.0.1.0/24`, `private-1` = `10.0.2.0/24`,
/// `private-2` = `10.0.3.0/24`.
pub fn carve_zones(
    network: &Cidr,
    availability_zones: &[String],
    prefix: u8,
) -> Result<Vec<Zone>, NetworkError> {
    let mut zones = Vec::with_capacity(availability_zones.len() * 2);
    let tiers = [("public", ZoneKind::Public), ("private", ZoneKind::PrivateWithEgress)];

    let mut index = 0u32;
    for (name, kind) in tiers {
        for (n, az) in availability_zones.iter().enumerate() {
            let cidr = network.subnet(prefix, index)?;
            zones.push(Zone::new(format!("{}-{}", name, n + 1), cidr, kind, az.clone()));
            index += 1;
        }
    }

    Ok(zones)
}
