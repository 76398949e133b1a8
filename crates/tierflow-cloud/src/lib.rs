//! TierFlow provisioning
//!
//! The backend trait the executor drives, the executor itself, a
//! deterministic simulated backend and persisted handle state.
//!
//! ```text
//! ProvisioningPlan → Executor ─create_resource→ ProvisioningBackend
//!                       ↓
//!                  ApplyReport.handles → StateManager (.tierflow/state.json)
//! ```

pub mod backend;
pub mod error;
pub mod executor;
pub mod simulate;
pub mod state;

pub use backend::{ProvisioningBackend, RetryConfig};
pub use error::{BackendError, CloudError, Result};
pub use executor::{ApplyReport, Executor, FailurePolicy, SkippedStep, StepFailure};
pub use simulate::SimulatedBackend;
pub use state::{StackState, StateLock, StateManager};
