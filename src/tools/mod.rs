//! Agent-facing tool surface
//!
//! A [`ProcessTool`] turns one action request into a call on the
//! [`ProcessManager`] and always answers with a [`ToolResult`]: a readable
//! text summary plus a structured `details` payload. Bad input becomes a
//! failure result, never an error that escapes the boundary.

pub mod stdio;
pub mod truncate;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{FileSizes, LogFiles, ProcessPreferences};
use crate::process::format::{format_runtime, format_size, status_label, strip_ansi, truncate_command};
use crate::process::{
    now_ms, KillOptions, KillOutcome, KillSignal, ProcessInfo, ProcessManager, ProcessStatus,
    SpawnRequest,
};

pub use truncate::{truncate_tail, truncation_notice, TruncatedBy, Truncation, MAX_BYTES, MAX_LINES};

/// Width the command column is cut to in `list` output
const LIST_COMMAND_WIDTH: usize = 60;

/// One tool call, tagged by `action`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ToolParams {
    Start {
        name: Option<String>,
        command: Option<String>,
        cwd: Option<PathBuf>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    List {},
    Output {
        id: Option<String>,
    },
    Kill {
        id: Option<String>,
        signal: Option<String>,
        #[serde(rename = "timeoutMs")]
        timeout_ms: Option<u64>,
    },
    Clear {},
}

impl ToolParams {
    pub fn action(&self) -> &'static str {
        match self {
            ToolParams::Start { .. } => "start",
            ToolParams::List {} => "list",
            ToolParams::Output { .. } => "output",
            ToolParams::Kill { .. } => "kill",
            ToolParams::Clear {} => "clear",
        }
    }
}

/// Structured output of the `output` action
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDetails {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub sizes: FileSizes,
    pub truncation: Truncation,
}

/// Machine-readable half of a [`ToolResult`]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDetails {
    pub action: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<Vec<ProcessInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process: Option<ProcessInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_files: Option<LogFiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<KillOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub content: String,
    pub details: ToolDetails,
}

impl ToolResult {
    fn success(action: &str, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            details: ToolDetails {
                action: action.to_string(),
                success: true,
                ..Default::default()
            },
        }
    }

    pub fn failure(action: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: message.clone(),
            details: ToolDetails {
                action: action.to_string(),
                success: false,
                message: Some(message),
                ..Default::default()
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.details.success
    }
}

/// Tool handlers over a shared [`ProcessManager`]
#[derive(Debug, Clone)]
pub struct ProcessTool {
    manager: ProcessManager,
    /// Wait applied to `kill` requests without `timeoutMs`
    terminate_timeout: Duration,
    /// Same, when the signal is SIGKILL
    force_timeout: Duration,
}

impl ProcessTool {
    pub fn new(manager: ProcessManager) -> Self {
        Self {
            manager,
            terminate_timeout: KillOptions::graceful().timeout,
            force_timeout: KillOptions::force().timeout,
        }
    }

    /// Take default kill timeouts from the process config
    pub fn with_kill_timeouts(mut self, prefs: &ProcessPreferences) -> Self {
        self.terminate_timeout = prefs.terminate_timeout();
        self.force_timeout = prefs.force_kill_timeout();
        self
    }

    pub fn manager(&self) -> &ProcessManager {
        &self.manager
    }

    /// Run a request given as raw JSON
    pub async fn execute_json(&self, params: Value) -> ToolResult {
        let action = params
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        match serde_json::from_value::<ToolParams>(params) {
            Ok(params) => self.execute(params).await,
            Err(err) => {
                debug!(%action, error = %err, "rejected tool params");
                ToolResult::failure(&action, format!("Invalid parameters: {err}"))
            }
        }
    }

    pub async fn execute(&self, params: ToolParams) -> ToolResult {
        debug!(action = params.action(), "tool request");
        match params {
            ToolParams::Start {
                name,
                command,
                cwd,
                env,
            } => self.start(name, command, cwd, env),
            ToolParams::List {} => self.list(),
            ToolParams::Output { id } => self.output(id),
            ToolParams::Kill {
                id,
                signal,
                timeout_ms,
            } => self.kill(id, signal, timeout_ms).await,
            ToolParams::Clear {} => self.clear(),
        }
    }

    fn start(
        &self,
        name: Option<String>,
        command: Option<String>,
        cwd: Option<PathBuf>,
        env: HashMap<String, String>,
    ) -> ToolResult {
        let Some(command) = command else {
            return ToolResult::failure("start", "Missing required parameter: command");
        };

        let mut request = SpawnRequest::new(name.unwrap_or_default(), command);
        request.cwd = cwd;
        request.env = env;

        let info = match self.manager.spawn(request) {
            Ok(info) => info,
            Err(err) => return ToolResult::failure("start", err.to_string()),
        };
        let files = self.manager.get_log_files(&info.id);

        let mut content = format!("Started {} \"{}\" (pid {})", info.id, info.name, info.pid);
        if let Some(files) = &files {
            content.push_str(&format!(
                "\nstdout: {}\nstderr: {}",
                files.stdout_file.display(),
                files.stderr_file.display()
            ));
        }

        let mut result = ToolResult::success("start", content);
        result.details.process = Some(info);
        result.details.log_files = files;
        result
    }

    fn list(&self) -> ToolResult {
        let processes = self.manager.list();
        let content = if processes.is_empty() {
            "No background processes running".to_string()
        } else {
            let now = now_ms();
            processes
                .iter()
                .map(|p| {
                    format!(
                        "{} \"{}\": {} [{}] {}",
                        p.id,
                        p.name,
                        truncate_command(&p.command, LIST_COMMAND_WIDTH),
                        status_label(p),
                        format_runtime(p.runtime_ms(now))
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut result = ToolResult::success("list", content);
        result.details.processes = Some(processes);
        result
    }

    fn output(&self, id: Option<String>) -> ToolResult {
        let Some(id) = id else {
            return ToolResult::failure("output", "Missing required parameter: id");
        };
        let (Some(info), Some(files)) = (self.manager.find(&id), self.manager.get_log_files(&id)) else {
            return ToolResult::failure("output", format!("Process not found: {id}"));
        };
        let Some(snapshot) = self.manager.get_output(&id, None) else {
            return ToolResult::failure("output", format!("Could not read output for {id}"));
        };

        let stdout: Vec<String> = snapshot.stdout.iter().map(|l| strip_ansi(l)).collect();
        let stderr: Vec<String> = snapshot.stderr.iter().map(|l| strip_ansi(l)).collect();

        let mut sections = vec![status_line(&info), String::new()];
        push_section(&mut sections, "stdout", snapshot.sizes.stdout, &stdout);
        sections.push(String::new());
        push_section(&mut sections, "stderr", snapshot.sizes.stderr, &stderr);
        let combined = sections.join("\n");

        let truncation = truncate_tail(&combined, MAX_LINES, MAX_BYTES);
        let content = if truncation.truncated {
            format!("{}\n\n{}", truncation.content, truncation_notice(&truncation, &files))
        } else {
            truncation.content.clone()
        };

        let mut result = ToolResult::success("output", content);
        result.details.process = Some(info);
        result.details.log_files = Some(files);
        result.details.output = Some(OutputDetails {
            stdout: bounded_lines(&stdout, MAX_BYTES / 2),
            stderr: bounded_lines(&stderr, MAX_BYTES / 2),
            sizes: snapshot.sizes,
            truncation,
        });
        result
    }

    async fn kill(&self, id: Option<String>, signal: Option<String>, timeout_ms: Option<u64>) -> ToolResult {
        let Some(id) = id else {
            return ToolResult::failure("kill", "Missing required parameter: id");
        };
        let signal = match signal.as_deref().map(str::parse::<KillSignal>) {
            Some(Ok(signal)) => signal,
            Some(Err(err)) => return ToolResult::failure("kill", err.to_string()),
            None => KillSignal::Term,
        };
        let timeout = match timeout_ms {
            Some(ms) => Duration::from_millis(ms),
            None if signal == KillSignal::Kill => self.force_timeout,
            None => self.terminate_timeout,
        };

        let outcome = match self.manager.kill(&id, KillOptions::new(signal, timeout)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(%id, error = %err, "kill failed");
                return ToolResult::failure("kill", err.to_string());
            }
        };

        let content = match outcome {
            KillOutcome::Finished { status } => format!("Process {id} stopped ({status})"),
            KillOutcome::AlreadyFinished { status } => format!("Process {id} already finished ({status})"),
            KillOutcome::TimedOut {
                status: ProcessStatus::TerminateTimeout,
            } => format!(
                "Process {id} did not exit within {}ms after {signal} (terminate_timeout). Send SIGKILL to force it.",
                timeout.as_millis()
            ),
            KillOutcome::TimedOut { status } => {
                format!("Process {id} still {status} after {}ms", timeout.as_millis())
            }
        };

        debug!(%id, %signal, status = %outcome.status(), "kill resolved");
        let mut result = ToolResult::success("kill", content);
        result.details.outcome = Some(outcome);
        result.details.process = self.manager.find(&id);
        result
    }

    fn clear(&self) -> ToolResult {
        let cleared = self.manager.clear_finished();
        let content = match cleared {
            0 => "No finished processes to clear".to_string(),
            1 => "Cleared 1 finished process".to_string(),
            n => format!("Cleared {n} finished processes"),
        };
        let mut result = ToolResult::success("clear", content);
        result.details.cleared = Some(cleared);
        result
    }
}

fn status_line(info: &ProcessInfo) -> String {
    format!(
        "{} \"{}\" [{}] {}: {}",
        info.id,
        info.name,
        status_label(info),
        format_runtime(info.runtime_ms(now_ms())),
        info.command
    )
}

fn push_section(out: &mut Vec<String>, label: &str, size: u64, lines: &[String]) {
    out.push(format!("{label} ({}):", format_size(size)));
    if lines.is_empty() {
        out.push("(empty)".to_string());
    } else {
        out.extend(lines.iter().cloned());
    }
}

/// Newest lines of one stream within the line limit and `max_bytes`
fn bounded_lines(lines: &[String], max_bytes: usize) -> Vec<String> {
    if lines.is_empty() {
        return Vec::new();
    }
    let kept = truncate_tail(&lines.join("\n"), MAX_LINES, max_bytes);
    kept.content.split('\n').map(str::to_string).collect()
}
