//! Topology loader
//!
//! Variable collection, template expansion and KDL parsing in one step.

use crate::error::{DeclarationError, Result};
use crate::model::Topology;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, extract_variables};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Load a topology file
///
/// 1. collect `variables { }` blocks
/// 2. add `TIERFLOW_*` environment variables and a sibling `.env` file
/// 3. render the file through Tera
/// 4. parse the KDL
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_topology(path: &Path) -> Result<Topology> {
    let content = std::fs::read_to_string(path).map_err(|e| DeclarationError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    debug!("Step 1: Preparing template processor");
    let mut processor = TemplateProcessor::new();
    processor.add_variable(
        "TOPOLOGY_DIR",
        serde_json::Value::String(base_dir.to_string_lossy().to_string()),
    );
    processor.add_variables(extract_variables(&content)?);
    processor.add_env_variables();

    let env_file = base_dir.join(".env");
    if env_file.is_file() {
        processor.add_env_file_variables(&env_file)?;
    }

    debug!("Step 2: Expanding templates");
    let expanded = processor.render_file(path)?;

    debug!("Step 3: Parsing KDL");
    let name = base_dir
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "unnamed".to_string());
    let topology = parse_kdl_string(&expanded, name)?;

    info!(
        stack = %topology.stack.name,
        zones = topology.zones.len(),
        access_groups = topology.access_groups.len(),
        descriptors = topology.descriptors.len(),
        "Topology loaded"
    );
    Ok(topology)
}

/// Load a topology from an in-memory string, rendering templates first
pub fn load_topology_str(content: &str, default_name: &str) -> Result<Topology> {
    let mut processor = TemplateProcessor::new();
    processor.add_variables(extract_variables(content)?);
    processor.add_env_variables();
    let expanded = processor.render_str(content)?;
    parse_kdl_string(&expanded, default_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BASTION: &str = r#"
variables {
    region "ap-southeast-1"
}

stack "custody" {
    region "{{ region }}"
    key-pair "custody"
    network "10.0.0.0/16"
    availability-zones "{{ region }}a"
}

access-group "pub" tier="public" {
    ingress "tcp" 22 from="0.0.0.0/0"
}

access-group "priv" {
    ingress "tcp" 22 group="pub"
}

instance "bastion" {
    zone "public-1"
    access-group "pub"
    user "ec2-user"
}

instance "server" {
    zone "private-1"
    access-group "priv"
    user "ubuntu"
}

ssh-output "SshCommand" bastion="bastion" target="server"
"#;

    #[test]
    fn test_load_topology_renders_variables() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("topology.kdl");
        fs::write(&path, BASTION).unwrap();

        let topology = load_topology(&path).unwrap();
        assert_eq!(topology.stack.name, "custody");
        assert_eq!(topology.stack.region.as_deref(), Some("ap-southeast-1"));
        assert_eq!(topology.zones.len(), 2);
        assert_eq!(topology.zones[0].availability_zone, "ap-southeast-1a");
        assert_eq!(topology.descriptors.len(), 2);
    }

    #[test]
    fn test_load_topology_reads_env_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("topology.kdl");
        fs::write(&path, "stack \"{{ STACK_NAME }}\" {}\n").unwrap();
        fs::write(temp.path().join(".env"), "STACK_NAME=from-env-file\n").unwrap();

        let topology = load_topology(&path).unwrap();
        assert_eq!(topology.stack.name, "from-env-file");
    }

    #[test]
    fn test_load_topology_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = load_topology(&temp.path().join("missing.kdl"));
        assert!(matches!(result, Err(DeclarationError::IoError { .. })));
    }

    #[test]
    fn test_user_data_survives_loading() {
        let with_bootstrap = BASTION.replace(
            r#"    user "ubuntu"
"#,
            r#"    user "ubuntu"
    user-data {
        - "echo ${#ARGS[@]} args"
        - "docker ps --format '{{.Names}}'"
    }
"#,
        );

        let topology = load_topology_str(&with_bootstrap, "inline").unwrap();
        let server = topology.descriptors[1].as_instance().unwrap();
        assert_eq!(topology.stack.region.as_deref(), Some("ap-southeast-1"));
        assert_eq!(
            server.user_data,
            vec!["echo ${#ARGS[@]} args", "docker ps --format '{{.Names}}'"]
        );
    }

    #[test]
    fn test_load_topology_str() {
        let topology = load_topology_str(BASTION, "inline").unwrap();
        assert_eq!(topology.access_groups.len(), 2);
        assert_eq!(topology.outputs.len(), 1);
    }
}
