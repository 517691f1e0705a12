//! Process manager for spawning and supervising background processes

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::{EventBus, Subscription};
use super::types::*;
use crate::core::{
    FileSizes, LogBuffer, LogFiles, LogLine, LogStore, LogWriter, OutputStream, ProcessEvent,
    ProcessPreferences,
};

/// How long the exit watcher waits for the pipes to drain after the child exits
const READER_DRAIN: Duration = Duration::from_millis(250);

/// Knobs the manager needs from the configuration
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Shell used as `<shell> -c <command>`
    pub shell: String,
    /// In-memory ring size per process
    pub log_buffer_size: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from(&ProcessPreferences::default())
    }
}

impl From<&ProcessPreferences> for ManagerSettings {
    fn from(prefs: &ProcessPreferences) -> Self {
        Self {
            shell: prefs.shell.clone(),
            log_buffer_size: prefs.log_buffer_size,
        }
    }
}

/// How far the exit watcher got with one child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitState {
    Alive,
    /// The child was reaped; its status is recorded once the pipes drain
    Reaped,
    Recorded,
}

/// One row of the process table
#[derive(Debug)]
struct ManagedProcess {
    info: ProcessInfo,
    log_files: LogFiles,
    log_buffer: LogBuffer,
    /// Set when a signal was sent on behalf of `kill`; decides exited vs killed
    kill_requested: bool,
    exit_tx: watch::Sender<ExitState>,
}

#[derive(Debug)]
struct Inner {
    /// Insertion-ordered process table
    table: Mutex<Vec<ManagedProcess>>,
    bus: Arc<EventBus>,
    store: LogStore,
    settings: ManagerSettings,
    next_id: AtomicU64,
}

/// Supervises background processes.
///
/// Cheap to clone; all clones share one process table. Every mutation of the
/// table happens under a single lock and emits its event before releasing it,
/// so observers see changes in the order they happened.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    inner: Arc<Inner>,
}

impl ProcessManager {
    /// Create a new process manager writing logs into `store`
    pub fn new(store: LogStore, settings: ManagerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Vec::new()),
                bus: EventBus::new(),
                store,
                settings,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a manager from config, with a fresh log directory
    pub fn from_preferences(prefs: &ProcessPreferences) -> io::Result<Self> {
        let store = match &prefs.log_dir {
            Some(base) => LogStore::new(base)?,
            None => LogStore::in_temp_dir()?,
        };
        Ok(Self::new(store, ManagerSettings::from(prefs)))
    }

    /// Directory holding this instance's log files
    pub fn log_dir(&self) -> &Path {
        self.inner.store.dir()
    }

    /// Subscribe to every state-affecting change
    pub fn on_event(&self) -> Subscription {
        self.inner.bus.subscribe()
    }

    /// Spawn a new process.
    ///
    /// Returns as soon as the OS handle exists. Nothing is added to the table
    /// when this fails.
    pub fn spawn(&self, request: SpawnRequest) -> Result<ProcessInfo, ProcessError> {
        let command = request.command.trim();
        if command.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        if let Some(cwd) = &request.cwd {
            if !cwd.is_dir() {
                return Err(ProcessError::InvalidCwd(cwd.clone()));
            }
        }

        let id = format!("proc_{}", self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let name = match request.name.trim() {
            "" => default_name(command),
            name => name.to_string(),
        };

        let mut cmd = Command::new(&self.inner.settings.shell);
        cmd.arg("-c")
            .arg(command)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        // Own process group, so signals reach the whole pipeline
        #[cfg(unix)]
        cmd.process_group(0);

        let (log_files, stdout_log, stderr_log) =
            self.inner.store.create(&id).map_err(ProcessError::LogStore)?;

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                let _ = std::fs::remove_file(&log_files.stdout_file);
                let _ = std::fs::remove_file(&log_files.stderr_file);
                warn!(%id, command, error = %source, "spawn failed");
                return Err(ProcessError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let pid = child.id().unwrap_or(0);
        let info = ProcessInfo {
            id: id.clone(),
            name,
            command: command.to_string(),
            cwd: request.cwd.clone(),
            status: ProcessStatus::Running,
            start_time: now_ms(),
            end_time: None,
            exit_code: None,
            success: None,
            pid,
        };

        {
            let mut table = self.inner.table();
            let (exit_tx, _) = watch::channel(ExitState::Alive);
            table.push(ManagedProcess {
                info: info.clone(),
                log_files,
                log_buffer: LogBuffer::new(self.inner.settings.log_buffer_size),
                kill_requested: false,
                exit_tx,
            });
            self.inner.bus.emit(ProcessEvent::Spawned {
                id: id.clone(),
                pid,
            });
        }

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(capture_stream(
                Arc::clone(&self.inner),
                id.clone(),
                OutputStream::Stdout,
                stdout,
                stdout_log,
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(capture_stream(
                Arc::clone(&self.inner),
                id.clone(),
                OutputStream::Stderr,
                stderr,
                stderr_log,
            )));
        }
        tokio::spawn(watch_exit(Arc::clone(&self.inner), id.clone(), child, readers));

        info!(%id, pid, command, "process spawned");
        Ok(info)
    }

    /// Request termination.
    ///
    /// Sends `options.signal` to the process group, then waits for the exit or
    /// for `options.timeout`, whichever comes first. A `running` process moves
    /// to `terminating`; if the timeout wins it moves on to
    /// `terminate_timeout`, which is reported, not an error. The race ends
    /// when the child is reaped, even if a descendant still holds its pipes.
    /// Killing a finished process is a no-op.
    pub async fn kill(&self, id: &str, options: KillOptions) -> Result<KillOutcome, ProcessError> {
        let mut exit_rx = {
            let mut table = self.inner.table();
            let entry = find_mut(&mut table, id).ok_or_else(|| ProcessError::NotFound(id.to_string()))?;
            let status = entry.info.status;
            if status.is_terminal() {
                debug!(%id, %status, "kill ignored, process already finished");
                return Ok(KillOutcome::AlreadyFinished { status });
            }

            send_signal(id, entry.info.pid, options.signal)?;
            info!(%id, pid = entry.info.pid, signal = %options.signal, "signal sent");

            entry.kill_requested = true;
            if status == ProcessStatus::Running {
                self.inner.transition(entry, ProcessStatus::Terminating);
            }
            entry.exit_tx.subscribe()
        };

        // The timer is dropped as soon as the child is reaped
        let reaped = tokio::time::timeout(
            options.timeout,
            exit_rx.wait_for(|state| *state != ExitState::Alive),
        )
        .await
        .is_ok();
        if reaped {
            // Recorded at most READER_DRAIN after the reap
            let _ = exit_rx.wait_for(|state| *state == ExitState::Recorded).await;
        }

        let mut table = self.inner.table();
        let Some(entry) = find_mut(&mut table, id) else {
            // Only terminal entries are ever cleared, and this one exited after our signal
            return Ok(KillOutcome::Finished {
                status: ProcessStatus::Killed,
            });
        };

        let status = entry.info.status;
        if reaped || status.is_terminal() || *entry.exit_tx.borrow() != ExitState::Alive {
            return Ok(KillOutcome::Finished { status });
        }

        if status == ProcessStatus::Terminating {
            warn!(%id, timeout_ms = options.timeout.as_millis() as u64, "process ignored termination request");
            self.inner.transition(entry, ProcessStatus::TerminateTimeout);
        }
        Ok(KillOutcome::TimedOut {
            status: entry.info.status,
        })
    }

    /// Force-kill every process that is still alive
    pub async fn stop_all(&self) {
        let alive: Vec<ProcessId> = self
            .list()
            .into_iter()
            .filter(|p| p.status.is_alive())
            .map(|p| p.id)
            .collect();

        for id in alive {
            if let Err(err) = self.kill(&id, KillOptions::force()).await {
                warn!(%id, error = %err, "failed to stop process");
            }
        }
    }

    /// Snapshot of the table in insertion order
    pub fn list(&self) -> Vec<ProcessInfo> {
        self.inner.table().iter().map(|p| p.info.clone()).collect()
    }

    pub fn find(&self, id: &str) -> Option<ProcessInfo> {
        self.inner
            .table()
            .iter()
            .find(|p| p.info.id == id)
            .map(|p| p.info.clone())
    }

    /// Remove every exited or killed entry. Log files stay on disk.
    pub fn clear_finished(&self) -> usize {
        let mut table = self.inner.table();
        let mut cleared = Vec::new();
        table.retain(|p| {
            if p.info.status.is_terminal() {
                cleared.push(p.info.id.clone());
                false
            } else {
                true
            }
        });

        let count = cleared.len();
        if count > 0 {
            info!(count, "cleared finished processes");
            self.inner.bus.emit(ProcessEvent::Cleared { ids: cleared });
        }
        count
    }

    /// Most recent lines of each stream, read from the log files
    pub fn get_output(&self, id: &str, max_lines: Option<usize>) -> Option<OutputSnapshot> {
        let files = self.get_log_files(id)?;
        let (stdout, stderr) = match files.read_lines(max_lines) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(%id, error = %err, "could not read logs");
                return None;
            }
        };
        let sizes = files.sizes().ok()?;
        Some(OutputSnapshot {
            stdout,
            stderr,
            sizes,
        })
    }

    pub fn get_file_size(&self, id: &str) -> Option<FileSizes> {
        self.get_log_files(id)?.sizes().ok()
    }

    pub fn get_log_files(&self, id: &str) -> Option<LogFiles> {
        self.inner
            .table()
            .iter()
            .find(|p| p.info.id == id)
            .map(|p| p.log_files.clone())
    }

    /// Combined stdout/stderr lines from the in-memory ring, plus the ring's length
    pub fn log_tail(&self, id: &str, count: usize, offset_from_end: usize) -> Option<(Vec<LogLine>, usize)> {
        let table = self.inner.table();
        let entry = table.iter().find(|p| p.info.id == id)?;
        let lines = entry
            .log_buffer
            .tail(count, offset_from_end)
            .into_iter()
            .cloned()
            .collect();
        Some((lines, entry.log_buffer.len()))
    }
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, Vec<ManagedProcess>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `to` if it is an edge of the state machine; emits on success
    fn transition(&self, entry: &mut ManagedProcess, to: ProcessStatus) -> bool {
        let from = entry.info.status;
        if !from.can_transition_to(to) {
            debug!(id = %entry.info.id, %from, %to, "transition rejected");
            return false;
        }
        entry.info.status = to;
        if to.is_terminal() {
            entry.info.end_time = Some(now_ms());
        }
        debug!(id = %entry.info.id, %from, %to, "status changed");
        self.bus.emit(ProcessEvent::StatusChanged {
            id: entry.info.id.clone(),
            from,
            to,
        });
        true
    }

    fn record_output(&self, id: &str, stream: OutputStream, line: String) {
        let mut table = self.table();
        if let Some(entry) = find_mut(&mut table, id) {
            entry.log_buffer.push_line(&line, stream);
            self.bus.emit(ProcessEvent::Output {
                id: id.to_string(),
                stream,
                line,
            });
        }
    }

    /// Ends any pending kill race; the status itself is recorded later
    fn mark_reaped(&self, id: &str) {
        let mut table = self.table();
        if let Some(entry) = find_mut(&mut table, id) {
            entry.exit_tx.send_replace(ExitState::Reaped);
        }
    }

    fn record_exit(&self, id: &str, exit_code: Option<i32>) {
        let mut table = self.table();
        let Some(entry) = find_mut(&mut table, id) else {
            return;
        };

        let to = if entry.kill_requested {
            ProcessStatus::Killed
        } else {
            ProcessStatus::Exited
        };
        if !entry.info.status.can_transition_to(to) {
            entry.exit_tx.send_replace(ExitState::Recorded);
            return;
        }
        match to {
            ProcessStatus::Exited => {
                let code = exit_code.unwrap_or(-1);
                entry.info.exit_code = Some(code);
                entry.info.success = Some(code == 0);
            }
            _ => {
                entry.info.exit_code = exit_code;
                entry.info.success = Some(false);
            }
        }
        self.transition(entry, to);
        entry.exit_tx.send_replace(ExitState::Recorded);
        info!(%id, status = %to, exit_code = ?exit_code, "process finished");
    }
}

fn find_mut<'a>(table: &'a mut [ManagedProcess], id: &str) -> Option<&'a mut ManagedProcess> {
    table.iter_mut().find(|p| p.info.id == id)
}

/// First three words of the command
fn default_name(command: &str) -> String {
    command.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

#[cfg(unix)]
fn send_signal(id: &str, pid: u32, signal: KillSignal) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let fail = |reason: String| ProcessError::Signal {
        id: id.to_string(),
        signal,
        reason,
    };
    let raw = i32::try_from(pid).map_err(|_| fail(format!("pid {pid} out of range")))?;
    if raw <= 0 {
        return Err(fail("process has no pid".to_string()));
    }

    match killpg(Pid::from_raw(raw), signal.to_nix()) {
        // Already gone; the exit watcher records it
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(fail(errno.desc().to_string())),
    }
}

#[cfg(not(unix))]
fn send_signal(_id: &str, _pid: u32, _signal: KillSignal) -> Result<(), ProcessError> {
    Err(ProcessError::Unsupported("sending signals"))
}

fn exit_code_of(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(128 + signal);
        }
    }
    None
}

/// Copy one pipe into its log file and the ring, line by line
async fn capture_stream<R>(
    inner: Arc<Inner>,
    id: ProcessId,
    stream: OutputStream,
    pipe: R,
    mut log: LogWriter,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if let Err(err) = log.append(&buf).await {
                    warn!(%id, stream = stream.as_str(), error = %err, "failed to append to log file");
                }
                let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
                inner.record_output(&id, stream, line);
            }
            Err(err) => {
                warn!(%id, stream = stream.as_str(), error = %err, "output reader failed");
                break;
            }
        }
    }
}

fn trim_newline(mut bytes: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = bytes {
        bytes = rest;
    }
    if let [rest @ .., b'\r'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Wait for the child, let the readers drain, then record the exit
async fn watch_exit(inner: Arc<Inner>, id: ProcessId, mut child: Child, readers: Vec<JoinHandle<()>>) {
    let status = child.wait().await;
    inner.mark_reaped(&id);

    let deadline = tokio::time::Instant::now() + READER_DRAIN;
    for reader in readers {
        if tokio::time::timeout_at(deadline, reader).await.is_err() {
            // A grandchild still holds the pipe open
            debug!(%id, "output reader still open after exit");
        }
    }

    let exit_code = match status {
        Ok(status) => exit_code_of(status),
        Err(err) => {
            warn!(%id, error = %err, "failed to wait for process");
            None
        }
    };
    inner.record_exit(&id, exit_code);
}
