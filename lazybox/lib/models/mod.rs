//! Models for lazybox.
//!
//! This module contains the core data structures shared by the lifecycle controller, the
//! routing gateway and the collaborator implementations.

mod routing;
mod sandbox;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use routing::*;
pub use sandbox::*;
