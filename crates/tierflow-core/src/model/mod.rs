//! Declaration model
//!
//! Zones, access groups and resource descriptors that make up a topology,
//! plus the handles a backend reports once they exist.

mod access;
mod handle;
mod network;
mod output;
mod resource;
mod stack;
mod topology;
mod zone;

// Re-exports
pub use access::*;
pub use handle::*;
pub use network::*;
pub use output::*;
pub use resource::*;
pub use stack::*;
pub use topology::*;
pub use zone::*;
