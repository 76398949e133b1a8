use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Topology file not found. Looked in:\n\
        - current directory: topology.local.kdl, .topology.local.kdl, topology.kdl, .topology.kdl\n\
        - ./.tierflow/ directory\n\
        - ~/.config/tierflow/topology.kdl\n\
        Set TIERFLOW_TOPOLOGY_PATH to point at a file directly"
    )]
    TopologyFileNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
