//! Address range value object

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Address range validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Subnet /{prefix} #{index} does not fit in {network}")]
    SubnetOutOfRange {
        network: String,
        prefix: u8,
        index: u32,
    },
}

/// Address range in CIDR notation
///
/// Host bits are cleared on construction, so `10.0.1.7/24` and `10.0.1.0/24`
/// compare equal.
///
/// ```rust
/// use tierflow_core::model::Cidr;
///
/// let zone: Cidr = "10.0.1.0/24".parse().unwrap();
/// let vpc: Cidr = "10.0.0.0/16".parse().unwrap();
/// assert!(vpc.contains(&zone));
/// assert!(zone.is_private());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    address: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, NetworkError> {
        let max = max_prefix(&address);
        if prefix > max {
            return Err(NetworkError::InvalidPrefixLength(prefix));
        }
        let address = match address {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & mask_v4(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & mask_v6(prefix))),
        };
        Ok(Self { address, prefix })
    }

    /// `0.0.0.0/0`
    pub fn any_ipv4() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix: 0,
        }
    }

    /// `::/0`
    pub fn any_ipv6() -> Self {
        Self {
            address: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            prefix: 0,
        }
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Matches every address of its family
    pub fn is_unrestricted(&self) -> bool {
        self.prefix == 0
    }

    /// Whether the whole range lies in non-routable space
    /// (RFC 1918, RFC 6598 shared space, IPv6 unique local)
    pub fn is_private(&self) -> bool {
        const V4_PRIVATE: [(&str, u8); 4] = [
            ("10.0.0.0", 8),
            ("172.16.0.0", 12),
            ("192.168.0.0", 16),
            ("100.64.0.0", 10),
        ];
        match self.address {
            IpAddr::V4(_) => V4_PRIVATE.iter().any(|(addr, prefix)| {
                Ipv4Addr::from_str(addr)
                    .ok()
                    .and_then(|a| Cidr::new(IpAddr::V4(a), *prefix).ok())
                    .is_some_and(|block| block.contains(self))
            }),
            IpAddr::V6(_) => {
                let ula = Cidr {
                    address: IpAddr::V6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0)),
                    prefix: 7,
                };
                ula.contains(self)
            }
        }
    }

    /// Whether `other` lies entirely inside this range
    pub fn contains(&self, other: &Cidr) -> bool {
        if other.prefix < self.prefix {
            return false;
        }
        match (self.address, other.address) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                let mask = mask_v4(self.prefix);
                u32::from(a) & mask == u32::from(b) & mask
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                let mask = mask_v6(self.prefix);
                u128::from(a) & mask == u128::from(b) & mask
            }
            _ => false,
        }
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// The `index`-th block of length `prefix` inside this range
    pub fn subnet(&self, prefix: u8, index: u32) -> Result<Cidr, NetworkError> {
        let out_of_range = || NetworkError::SubnetOutOfRange {
            network: self.to_string(),
            prefix,
            index,
        };
        if prefix < self.prefix || prefix > max_prefix(&self.address) {
            return Err(out_of_range());
        }
        let bits = u32::from(prefix - self.prefix);
        if bits < 32 && u64::from(index) >= 1u64 << bits {
            return Err(out_of_range());
        }
        match self.address {
            IpAddr::V4(base) => {
                let step = 1u64 << (32 - u32::from(prefix));
                let offset = u64::from(index) * step;
                let addr = u64::from(u32::from(base)) + offset;
                let addr = u32::try_from(addr).map_err(|_| out_of_range())?;
                Cidr::new(IpAddr::V4(Ipv4Addr::from(addr)), prefix)
            }
            IpAddr::V6(base) => {
                let shift = 128 - u32::from(prefix);
                let offset = u128::from(index)
                    .checked_shl(shift)
                    .ok_or_else(out_of_range)?;
                let addr = u128::from(base)
                    .checked_add(offset)
                    .ok_or_else(out_of_range)?;
                Cidr::new(IpAddr::V6(Ipv6Addr::from(addr)), prefix)
            }
        }
    }

    /// Address at `offset` from the start of the range, if it fits
    pub fn host(&self, offset: u32) -> Option<IpAddr> {
        match self.address {
            IpAddr::V4(base) => {
                let size = 1u64 << (32 - u32::from(self.prefix));
                if u64::from(offset) >= size {
                    return None;
                }
                Some(IpAddr::V4(Ipv4Addr::from(u32::from(base) + offset)))
            }
            IpAddr::V6(base) => {
                let host_bits = 128 - u32::from(self.prefix);
                if host_bits < 32 && u128::from(offset) >= 1u128 << host_bits {
                    return None;
                }
                u128::from(base)
                    .checked_add(u128::from(offset))
                    .map(|a| IpAddr::V6(Ipv6Addr::from(a)))
            }
        }
    }
}

fn max_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (addr_str, prefix_str) = s
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(s.to_string()))?;

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(s.to_string()))?;

        Cidr::new(address, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
