//! Backend and state error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a single create call, reported per step
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum BackendError {
    #[error("Rejected by backend: {0}")]
    Rejected(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported resource: {0}")]
    Unsupported(String),
}

impl BackendError {
    /// Whether calling again might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Errors around persisted state
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
