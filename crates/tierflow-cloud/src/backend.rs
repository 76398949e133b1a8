//! Provisioning backend trait definition

use crate::error::BackendError;
use async_trait::async_trait;
use std::time::Duration;
use tierflow_core::{Entity, Handle, HandleSet};

/// Provisioning backend abstraction
///
/// Creates one plan node at a time. The executor calls this once per step,
/// only after every dependency has a handle; `dependencies` holds exactly
/// those handles.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Backend name for logs (e.g. "simulated")
    fn name(&self) -> &str;

    /// Create the resource for `entity` and report its handle
    async fn create_resource(
        &self,
        entity: Entity<'_>,
        dependencies: &HandleSet,
    ) -> Result<Handle, BackendError>;
}

/// Retry policy for transient backend failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for the delay
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay to wait after `attempt` (1-based) failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_after(1), Duration::from_secs(1));
        assert_eq!(retry.delay_after(2), Duration::from_secs(2));
        assert_eq!(retry.delay_after(10), Duration::from_secs(30));
    }
}
