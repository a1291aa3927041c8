//! Clients for the compute orchestrator and the service registry.

mod compute;
mod memory;
mod registry;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use compute::*;
pub use memory::*;
pub use registry::*;
pub use traits::*;
