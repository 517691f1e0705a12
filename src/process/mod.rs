//! Process supervision module
//!
//! This module spawns background commands, tracks them through the
//! status state machine, captures their output, and fans out change
//! events to observers.

mod bus;
pub mod format;
mod manager;
mod types;

pub use bus::*;
pub use manager::*;
pub use types::*;
