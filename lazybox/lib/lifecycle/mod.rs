//! The sandbox lifecycle: provisioning, starting, idle-checking and stopping.
//!
//! [`LifecycleController`] runs each operation to completion against the collaborators.
//! [`LifecycleWorker`] runs them off the request path for callers that must not wait.

mod command;
mod controller;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use command::*;
pub use controller::*;
