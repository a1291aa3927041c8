//! Control API for lazybox.
//!
//! This module serves the REST API operators and CI hooks use to provision sandboxes, start them,
//! run idle-checks and inspect records. It also serves the waiting page the gateway redirects
//! sleeping sandboxes to.

mod data;
mod handlers;
mod routes;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use data::*;
pub use routes::*;
pub use state::*;
