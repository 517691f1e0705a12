//! Types exchanged between the supervisor and its observers

use serde::Serialize;

use crate::process::ProcessStatus;

/// Unique identifier for a supervised process (`proc_<n>`)
pub type ProcessId = String;

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Events emitted by the process manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    /// A process entered the table
    Spawned { id: ProcessId, pid: u32 },
    /// A process produced a line of output
    Output {
        id: ProcessId,
        stream: OutputStream,
        line: String,
    },
    /// A process moved along the state machine
    StatusChanged {
        id: ProcessId,
        from: ProcessStatus,
        to: ProcessStatus,
    },
    /// Finished entries were removed from the table
    Cleared { ids: Vec<ProcessId> },
}
