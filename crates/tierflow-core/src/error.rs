//! Error types for loading, synthesis and output resolution

use crate::model::{EntityKind, NetworkError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading a declaration
#[derive(Error, Debug)]
pub enum DeclarationError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid declaration: {0}")]
    InvalidConfig(String),

    #[error("Invalid {node} name '{id}': use letters, digits, '-' and '_'")]
    InvalidId { node: String, id: String },

    #[error("Invalid address range in '{node}': {source}")]
    InvalidNetwork {
        node: String,
        #[source]
        source: NetworkError,
    },

    #[error("Template error: {file}\nreason: {message}")]
    TemplateError { file: PathBuf, message: String },

    #[error("Template render error: {0}")]
    TemplateRenderError(String),
}

/// Fatal synthesis errors; the declaration must be fixed, never retried
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Cyclic dependency: {}", involved_ids.join(" -> "))]
    CyclicDependency { involved_ids: Vec<String> },

    #[error("'{from}' references unknown id '{to}'")]
    UnknownReference { from: String, to: String },

    #[error("'{from}' references '{to}' which is a {actual}, expected a {expected}")]
    ReferenceKindMismatch {
        from: String,
        to: String,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Id '{id}' may only use letters, digits, '-' and '_'")]
    InvalidId { id: String },

    #[error("Duplicate id '{id}'")]
    DuplicateId { id: String },

    #[error("Zones '{first}' and '{second}' have overlapping address ranges")]
    OverlappingZones { first: String, second: String },

    #[error("Zone '{zone_id}' lies outside the network {network}")]
    ZoneOutsideNetwork { zone_id: String, network: String },

    #[error("Zone '{zone_id}' is not in region '{region}'")]
    ZoneOutsideRegion { zone_id: String, region: String },

    #[error("Insecure ingress in access group '{group_id}' rule #{rule_index}: {reason}")]
    InsecureIngress {
        group_id: String,
        rule_index: usize,
        reason: String,
    },

    #[error(
        "Instance '{descriptor_id}' sits in a private zone but uses public access group '{group_id}'"
    )]
    ExposedPrivateInstance {
        descriptor_id: String,
        group_id: String,
    },

    #[error("Listener '{listener_id}' terminates TLS but declares no certificate")]
    MissingCertificate { listener_id: String },

    #[error("Output '{output}' needs a login user for instance '{instance}'")]
    MissingLoginUser { output: String, instance: String },
}

/// Errors while substituting backend values into outputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("No handle for '{descriptor_id}': the step never ran or the backend returned nothing")]
    MissingHandle { descriptor_id: String },

    #[error("Handle for '{descriptor_id}' has no attribute '{attribute}'")]
    MissingAttribute {
        descriptor_id: String,
        attribute: String,
    },

    #[error("Output '{output}' references '{descriptor_id}' which is not in the plan")]
    UnknownDescriptor {
        output: String,
        descriptor_id: String,
    },
}

pub type Result<T> = std::result::Result<T, DeclarationError>;
