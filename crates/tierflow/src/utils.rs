use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tierflow_config::EnvOverrides;
use tierflow_core::{ProvisioningPlan, Topology};

/// A loaded topology and where it came from
pub struct Loaded {
    pub path: PathBuf,
    /// Directory holding the topology file; state lives under it
    pub project_root: PathBuf,
    pub topology: Topology,
}

/// Locate, render and parse the topology, then apply environment overrides
pub fn load(file: Option<&Path>) -> anyhow::Result<Loaded> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => tierflow_config::find_topology_file()?,
    };

    let mut topology = tierflow_core::load_topology(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    EnvOverrides::from_env().apply(&mut topology.stack);

    let project_root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(Loaded {
        path,
        project_root,
        topology,
    })
}

pub fn print_loaded(loaded: &Loaded) {
    println!(
        "📄 {} (stack {})",
        loaded.path.display().to_string().cyan(),
        loaded.topology.stack.name.bold()
    );
}

/// Synthesize, turning a fatal declaration problem into a CLI error
pub fn synthesize(topology: &Topology) -> anyhow::Result<ProvisioningPlan> {
    tierflow_core::synthesize(topology).context("topology cannot be provisioned")
}
