//! Access groups (security-group-like rule sets)

use super::network::Cidr;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exposure class of an access group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupTier {
    /// Externally reachable tier (bastion, load balancer)
    Public,
    /// Internal compute; never reachable straight from the internet
    #[default]
    Private,
}

impl GroupTier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(GroupTier::Public),
            "private" => Some(GroupTier::Private),
            _ => None,
        }
    }
}

impl fmt::Display for GroupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupTier::Public => write!(f, "public"),
            GroupTier::Private => write!(f, "private"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
    All,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "icmp" => Some(Protocol::Icmp),
            "all" | "-1" => Some(Protocol::All),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Icmp => write!(f, "icmp"),
            Protocol::All => write!(f, "all"),
        }
    }
}

/// Port or inclusive port range a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRange {
    Single(u16),
    Range(u16, u16),
    All,
}

impl PortRange {
    /// Parses `22`, `8000-8080` or `all`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s == "*" {
            return Some(PortRange::All);
        }
        if let Some((from, to)) = s.split_once('-') {
            let from = from.trim().parse().ok()?;
            let to = to.trim().parse().ok()?;
            return (from <= to).then_some(PortRange::Range(from, to));
        }
        s.parse().ok().map(PortRange::Single)
    }

}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRange::Single(p) => write!(f, "{}", p),
            PortRange::Range(from, to) => write!(f, "{}-{}", from, to),
            PortRange::All => write!(f, "all"),
        }
    }
}

/// Where traffic comes from (ingress) or goes to (egress)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Raw address range
    Range(Cidr),
    /// Members of another access group (trust edge)
    Group(String),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::Range(cidr) => write!(f, "{}", cidr),
            Peer::Group(id) => write!(f, "group:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub direction: Direction,
    pub protocol: Protocol,
    pub ports: PortRange,
    pub peer: Peer,
    #[serde(default)]
    pub description: Option<String>,
}

impl AccessRule {
    pub fn ingress(protocol: Protocol, ports: PortRange, peer: Peer) -> Self {
        Self {
            direction: Direction::Ingress,
            protocol,
            ports,
            peer,
            description: None,
        }
    }

    pub fn egress(protocol: Protocol, ports: PortRange, peer: Peer) -> Self {
        Self {
            direction: Direction::Egress,
            protocol,
            ports,
            peer,
            description: None,
        }
    }

    pub fn is_ingress(&self) -> bool {
        self.direction == Direction::Ingress
    }

    /// Id of the referenced group, if the peer is a group
    pub fn group_ref(&self) -> Option<&str> {
        match &self.peer {
            Peer::Group(id) => Some(id),
            Peer::Range(_) => None,
        }
    }
}

/// A named, ordered set of ingress/egress rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGroup {
    pub id: String,
    #[serde(default)]
    pub tier: GroupTier,
    #[serde(default)]
    pub description: Option<String>,
    pub rules: Vec<AccessRule>,
    pub default_egress_allowed: bool,
}

impl AccessGroup {
    pub fn new(id: impl Into<String>, tier: GroupTier) -> Self {
        Self {
            id: id.into(),
            tier,
            description: None,
            rules: Vec::new(),
            default_egress_allowed: true,
        }
    }

    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_public(&self) -> bool {
        self.tier == GroupTier::Public
    }

    /// Ingress rules with their position in `rules`
    pub fn ingress_rules(&self) -> impl Iterator<Item = (usize, &AccessRule)> {
        self.rules.iter().enumerate().filter(|(_, r)| r.is_ingress())
    }

    /// Groups this one trusts, excluding itself, in rule order
    pub fn referenced_groups(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if let Some(id) = rule.group_ref()
                && id != self.id
                && !refs.contains(&id)
            {
                refs.push(id);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_parse() {
        assert_eq!(PortRange::parse("22"), Some(PortRange::Single(22)));
        assert_eq!(PortRange::parse("8000-8080"), Some(PortRange::Range(8000, 8080)));
        assert_eq!(PortRange::parse("all"), Some(PortRange::All));
        assert_eq!(PortRange::parse("90-80"), None);
        assert_eq!(PortRange::parse("ssh"), None);
    }

    #[test]
    fn test_referenced_groups_skips_self_and_duplicates() {
        let group = AccessGroup::new("priv", GroupTier::Private)
            .with_rule(AccessRule::ingress(
                Protocol::Tcp,
                PortRange::Single(22),
                Peer::Group("pub".to_string()),
            ))
            .with_rule(AccessRule::ingress(
                Protocol::All,
                PortRange::All,
                Peer::Group("priv".to_string()),
            ))
            .with_rule(AccessRule::ingress(
                Protocol::Tcp,
                PortRange::Single(3000),
                Peer::Group("pub".to_string()),
            ));

        assert_eq!(group.referenced_groups(), vec!["pub"]);
        assert_eq!(group.ingress_rules().count(), 3);
    }

    #[test]
    fn test_default_tier_is_private() {
        assert_eq!(GroupTier::default(), GroupTier::Private);
    }
}
