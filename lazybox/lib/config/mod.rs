//! Configuration types and helpers.

mod defaults;
mod lazybox;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use lazybox::*;
