//! The routing gateway in front of every sandbox host.

mod forward;
mod route;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use forward::*;
pub use route::*;
