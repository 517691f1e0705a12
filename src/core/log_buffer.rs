//! In-memory tail of a process's combined output, feeding the log pane
//!
//! The on-disk logs stay authoritative; this ring only holds what the
//! dashboard can show without touching the filesystem.

use std::collections::VecDeque;

use super::OutputStream;

#[derive(Debug, Clone)]
pub struct LogLine {
    pub content: String,
    pub stream: OutputStream,
}

impl LogLine {
    pub fn is_stderr(&self) -> bool {
        matches!(self.stream, OutputStream::Stderr)
    }
}

/// Fixed-capacity ring; the oldest line goes once it is full
#[derive(Debug)]
pub struct LogBuffer {
    ring: VecDeque<LogLine>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // grows on demand up to `capacity`
            ring: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Record one line as read from a pipe
    ///
    /// Progress output that redraws itself with `\r` is collapsed to the text
    /// after the last carriage return, which is what a terminal would show.
    pub fn push_line(&mut self, raw: &str, stream: OutputStream) {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let visible = raw.rsplit('\r').next().unwrap_or(raw);

        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(LogLine {
            content: visible.to_owned(),
            stream,
        });
    }

    /// Up to `count` lines ending `skip_newest` lines before the newest one, oldest first
    pub fn tail(&self, count: usize, skip_newest: usize) -> Vec<&LogLine> {
        let end = self.ring.len().saturating_sub(skip_newest);
        let start = end.saturating_sub(count);
        self.ring.range(start..end).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}
