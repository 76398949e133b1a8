//! TierFlow core
//!
//! Declares a two-tier network topology (public bastion and load balancer
//! tier, private compute tier), checks its access policy and synthesizes a
//! dependency-ordered provisioning plan.
//!
//! ```text
//! topology.kdl → load_topology → synthesize → ProvisioningPlan
//!                                                   ↓ (backend)
//!                                  HandleSet → resolve → outputs
//! ```

pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod plan;
pub mod policy;
pub mod resolve;
pub mod synth;
pub mod template;

pub use error::{DeclarationError, ResolutionError, Result, SynthesisError};
pub use loader::{load_topology, load_topology_str};
pub use model::*;
pub use parser::parse_kdl_string;
pub use plan::{PlanStep, PlanSummary, ProvisioningPlan};
pub use policy::{Advisory, PolicyReport, Violation, ViolationKind};
pub use resolve::{ResolvedOutput, resolve};
pub use synth::{Synthesis, audit, synthesize, synthesize_with_report};
pub use template::{TemplateProcessor, Variables, extract_variables};
