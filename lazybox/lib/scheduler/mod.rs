//! Delayed idle-check actions.
//!
//! Schedules are named one-shot timers. The [`ScheduleRunner`] turns the ones that come due
//! into lifecycle commands.

mod memory;
mod runner;
mod sqlite;
mod traits;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use memory::*;
pub use runner::*;
pub use sqlite::*;
pub use traits::*;
