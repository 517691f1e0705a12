//! Process types, the status state machine, and supervisor errors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::FileSizes;

pub use crate::core::ipc::ProcessId;

/// Status of a supervised process.
///
/// ```text
/// running ──► terminating ──► terminate_timeout ──► killed
///    │             │
///    └─────────────┴──► exited | killed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Process is running
    Running,
    /// A termination signal was sent and the grace period is running
    Terminating,
    /// The grace period elapsed and the process is still alive
    TerminateTimeout,
    /// Process exited on its own
    Exited,
    /// Process exited after a kill request
    Killed,
}

impl ProcessStatus {
    /// Get a short string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Terminating => "terminating",
            ProcessStatus::TerminateTimeout => "terminate_timeout",
            ProcessStatus::Exited => "exited",
            ProcessStatus::Killed => "killed",
        }
    }

    /// Exited and killed are final; nothing leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessStatus::Exited | ProcessStatus::Killed)
    }

    /// Check if the process is still alive as far as the supervisor knows
    pub fn is_alive(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Running, Terminating)
                | (Running, Exited)
                | (Running, Killed)
                | (Terminating, TerminateTimeout)
                | (Terminating, Exited)
                | (Terminating, Killed)
                | (TerminateTimeout, Killed)
        )
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one process-table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub name: String,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    pub status: ProcessStatus,
    /// Milliseconds since the Unix epoch
    pub start_time: i64,
    /// Set once, on entering a terminal status
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub pid: u32,
}

impl ProcessInfo {
    /// Milliseconds between start and end, or start and `now_ms` while alive
    pub fn runtime_ms(&self, now_ms: i64) -> i64 {
        (self.end_time.unwrap_or(now_ms) - self.start_time).max(0)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// What to launch
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    /// Display label; empty means "derive from the command"
    pub name: String,
    /// Shell command line
    pub command: String,
    /// Working directory; the supervisor's own when absent
    pub cwd: Option<PathBuf>,
    /// Variables merged over the inherited environment
    pub env: HashMap<String, String>,
}

impl SpawnRequest {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Signals the supervisor knows how to send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillSignal {
    #[serde(rename = "SIGTERM")]
    Term,
    #[serde(rename = "SIGKILL")]
    Kill,
    #[serde(rename = "SIGINT")]
    Int,
    #[serde(rename = "SIGHUP")]
    Hup,
}

impl KillSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            KillSignal::Term => "SIGTERM",
            KillSignal::Kill => "SIGKILL",
            KillSignal::Int => "SIGINT",
            KillSignal::Hup => "SIGHUP",
        }
    }

    #[cfg(unix)]
    pub(crate) fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
            KillSignal::Int => Signal::SIGINT,
            KillSignal::Hup => Signal::SIGHUP,
        }
    }
}

impl std::fmt::Display for KillSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KillSignal {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        match bare {
            "TERM" | "15" => Ok(KillSignal::Term),
            "KILL" | "9" => Ok(KillSignal::Kill),
            "INT" | "2" => Ok(KillSignal::Int),
            "HUP" | "1" => Ok(KillSignal::Hup),
            _ => Err(ProcessError::UnknownSignal(s.to_string())),
        }
    }
}

/// Signal plus how long to wait for the process to go away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillOptions {
    pub signal: KillSignal,
    pub timeout: Duration,
}

impl KillOptions {
    pub fn new(signal: KillSignal, timeout: Duration) -> Self {
        Self { signal, timeout }
    }

    /// SIGTERM with a 3 second grace period
    pub fn graceful() -> Self {
        Self::new(KillSignal::Term, Duration::from_millis(3000))
    }

    /// SIGKILL with a 200 ms wait
    pub fn force() -> Self {
        Self::new(KillSignal::Kill, Duration::from_millis(200))
    }
}

impl Default for KillOptions {
    fn default() -> Self {
        Self::graceful()
    }
}

/// How a kill request resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum KillOutcome {
    /// The process reached a terminal status before the timeout
    Finished { status: ProcessStatus },
    /// The timeout elapsed with the process still alive
    TimedOut { status: ProcessStatus },
    /// The process was already terminal; nothing was sent
    AlreadyFinished { status: ProcessStatus },
}

impl KillOutcome {
    pub fn status(&self) -> ProcessStatus {
        match self {
            KillOutcome::Finished { status }
            | KillOutcome::TimedOut { status }
            | KillOutcome::AlreadyFinished { status } => *status,
        }
    }
}

/// Point-in-time read of a process's captured output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputSnapshot {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub sizes: FileSizes,
}

/// Supervisor errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Process not found: {0}")]
    NotFound(ProcessId),

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Working directory does not exist: {}", .0.display())]
    InvalidCwd(PathBuf),

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create log files: {0}")]
    LogStore(#[source] std::io::Error),

    #[error("Failed to send {signal} to {id}: {reason}")]
    Signal {
        id: ProcessId,
        signal: KillSignal,
        reason: String,
    },

    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}
