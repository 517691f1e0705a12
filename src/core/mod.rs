//! Plumbing shared by the supervisor and both front ends
//!
//! Settings, terminal input, the event wire types observers receive, and the
//! two places process output lands: the in-memory ring and the log files.

mod config;
mod events;
mod log_buffer;
mod log_store;

pub mod ipc;

pub use config::*;
pub use events::*;
pub use ipc::*;
pub use log_buffer::*;
pub use log_store::*;
