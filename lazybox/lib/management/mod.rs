//! Wiring for the `lazybox` binary.
//!
//! This module connects the configured collaborators to the lifecycle controller and runs the
//! long-lived services. The CLI commands that act on one sandbox use the same wiring.

mod app;
mod serve;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use app::*;
pub use serve::*;
