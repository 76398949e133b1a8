//! Ambient stack configuration

use super::network::Cidr;
use serde::{Deserialize, Serialize};

/// Account, region and key material handed explicitly to the synthesizer
/// and the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Stack name
    pub name: String,

    /// Cloud account id
    #[serde(default)]
    pub account: Option<String>,

    /// Region every zone must belong to (e.g. "ap-southeast-1")
    #[serde(default)]
    pub region: Option<String>,

    /// Name of the pre-existing key pair used by instances
    #[serde(default)]
    pub key_pair: Option<String>,

    /// Network address space every zone must lie inside
    #[serde(default)]
    pub network: Option<Cidr>,

    /// Availability zones for the generated zone layout
    #[serde(default)]
    pub availability_zones: Vec<String>,

    /// Prefix length of generated zones (default /24)
    #[serde(default)]
    pub zone_prefix: Option<u8>,
}

impl StackConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Replace values with externally supplied ones (environment, flags)
    pub fn apply_overrides(
        &mut self,
        account: Option<String>,
        region: Option<String>,
        key_pair: Option<String>,
    ) {
        if account.is_some() {
            self.account = account;
        }
        if region.is_some() {
            self.region = region;
        }
        if key_pair.is_some() {
            self.key_pair = key_pair;
        }
    }

    /// Local private key path derived from the key pair name
    pub fn default_key_path(&self) -> String {
        format!("./{}.pem", self.key_pair.as_deref().unwrap_or("id_rsa"))
    }
}
