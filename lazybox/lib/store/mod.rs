//! Persistence for sandbox records and request activity.
//!
//! Both concerns sit behind traits so the lifecycle controller and gateway can run against
//! SQLite in production and in-memory maps in tests.

mod activity;
mod db;
mod memory;
mod sandbox;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use activity::*;
pub use db::*;
pub use memory::*;
pub use sandbox::*;
pub use traits::*;
