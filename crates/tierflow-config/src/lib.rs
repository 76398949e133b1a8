//! Locating topology files and reading environment overrides

pub mod error;

pub use error::*;

use std::path::PathBuf;
use tierflow_core::StackConfig;
use tracing::debug;

/// Points directly at a topology file
pub const TOPOLOGY_PATH_ENV: &str = "TIERFLOW_TOPOLOGY_PATH";
pub const ACCOUNT_ENV: &str = "TIERFLOW_ACCOUNT";
pub const REGION_ENV: &str = "TIERFLOW_REGION";
pub const KEY_PAIR_ENV: &str = "TIERFLOW_KEY_PAIR";

const CANDIDATES: [&str; 4] = [
    "topology.local.kdl",
    ".topology.local.kdl",
    "topology.kdl",
    ".topology.kdl",
];

/// `~/.config/tierflow`, created on first use
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("tierflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the project's topology file
///
/// Search order:
/// 1. `TIERFLOW_TOPOLOGY_PATH`
/// 2. current directory: topology.local.kdl, .topology.local.kdl, topology.kdl, .topology.kdl
/// 3. the same names inside `./.tierflow/`
/// 4. `~/.config/tierflow/topology.kdl`
pub fn find_topology_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(TOPOLOGY_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        debug!(path = %path.display(), "{} points at a missing file", TOPOLOGY_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".tierflow");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("tierflow").join("topology.kdl");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::TopologyFileNotFound)
}

/// Account, region and key pair supplied through the environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub account: Option<String>,
    pub region: Option<String>,
    pub key_pair: Option<String>,
}

impl EnvOverrides {
    /// Read `TIERFLOW_ACCOUNT`, `TIERFLOW_REGION` and `TIERFLOW_KEY_PAIR`; empty values count as unset
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        Self {
            account: var(ACCOUNT_ENV),
            region: var(REGION_ENV),
            key_pair: var(KEY_PAIR_ENV),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.account.is_none() && self.region.is_none() && self.key_pair.is_none()
    }

    pub fn apply(&self, stack: &mut StackConfig) {
        if !self.is_empty() {
            debug!(overrides = ?self, "Applying environment overrides");
        }
        stack.apply_overrides(
            self.account.clone(),
            self.region.clone(),
            self.key_pair.clone(),
        );
    }
}
