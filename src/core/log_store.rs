//! Append-only, file-backed capture of process output
//!
//! Every supervisor instance owns one directory; each process gets a
//! `<id>.stdout.log` / `<id>.stderr.log` pair inside it. Files are created once
//! and only ever appended to, and they stay on disk after the process entry is
//! cleared so truncated tool output can point at them.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// On-disk log locations of one process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFiles {
    pub stdout_file: PathBuf,
    pub stderr_file: PathBuf,
}

/// Byte sizes of a process's log files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileSizes {
    pub stdout: u64,
    pub stderr: u64,
}

impl FileSizes {
    pub fn total(&self) -> u64 {
        self.stdout + self.stderr
    }
}

impl LogFiles {
    /// Current sizes of both files
    pub fn sizes(&self) -> io::Result<FileSizes> {
        Ok(FileSizes {
            stdout: std::fs::metadata(&self.stdout_file)?.len(),
            stderr: std::fs::metadata(&self.stderr_file)?.len(),
        })
    }

    /// Read what has been flushed so far, keeping at most `max_lines` per stream
    pub fn read_lines(&self, max_lines: Option<usize>) -> io::Result<(Vec<String>, Vec<String>)> {
        Ok((
            read_tail_lines(&self.stdout_file, max_lines)?,
            read_tail_lines(&self.stderr_file, max_lines)?,
        ))
    }
}

/// Read a log file as lines, keeping only the newest `max_lines` when given
pub fn read_tail_lines(path: &Path, max_lines: Option<usize>) -> io::Result<Vec<String>> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = text.lines().collect();
    let start = match max_lines {
        Some(max) => lines.len().saturating_sub(max),
        None => 0,
    };
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}

/// Per-instance log directory
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    /// Create a fresh `bgproc-<uuid>` directory under `base`
    pub fn new(base: &Path) -> io::Result<Self> {
        let dir = base.join(format!("bgproc-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Create the instance directory under the system temp dir
    pub fn in_temp_dir() -> io::Result<Self> {
        Self::new(&std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths a process's logs live at; does not touch the filesystem
    pub fn files_for(&self, id: &str) -> LogFiles {
        LogFiles {
            stdout_file: self.dir.join(format!("{id}.stdout.log")),
            stderr_file: self.dir.join(format!("{id}.stderr.log")),
        }
    }

    /// Create both log files for `id` and open them for appending.
    ///
    /// Fails if either file already exists.
    pub fn create(&self, id: &str) -> io::Result<(LogFiles, LogWriter, LogWriter)> {
        let files = self.files_for(id);
        let stdout = LogWriter::create(&files.stdout_file)?;
        let stderr = LogWriter::create(&files.stderr_file)?;
        Ok((files, stdout, stderr))
    }
}

/// Exclusive append handle on one log file
#[derive(Debug)]
pub struct LogWriter {
    file: tokio::fs::File,
}

impl LogWriter {
    fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).create_new(true).open(path)?;
        Ok(Self {
            file: tokio::fs::File::from_std(file),
        })
    }

    /// Append a chunk and flush it so readers see it immediately
    pub async fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await?;
        self.file.flush().await
    }
}
