//! Keyboard, resize and tick events for the dashboard loop
//!
//! crossterm's reader blocks, so polling runs on a blocking thread and hands
//! events to the async loop over a channel.

use anyhow::{anyhow, Result};
use crossterm::event::{self, Event as CrosstermEvent, KeyEvent, KeyEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// The tick interval elapsed
    Tick,
    Key(KeyEvent),
    Resize(u16, u16),
}

/// Maps a raw crossterm event to the ones the dashboard reacts to
fn translate(raw: CrosstermEvent) -> Option<TerminalEvent> {
    match raw {
        // Windows reports releases as well; only presses count
        CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Some(TerminalEvent::Key(key)),
        CrosstermEvent::Resize(width, height) => Some(TerminalEvent::Resize(width, height)),
        _ => None,
    }
}

/// Handle on the polling thread; dropping it stops the thread
pub struct TerminalEvents {
    rx: mpsc::UnboundedReceiver<TerminalEvent>,
    stop: Arc<AtomicBool>,
}

impl TerminalEvents {
    pub fn new(tick_rate_ms: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate_ms.max(10));
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_flag = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || poll_terminal(&tx, tick_rate, &stop_flag));

        Self { rx, stop }
    }

    pub async fn next(&mut self) -> Result<TerminalEvent> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow!("terminal event thread stopped"))
    }
}

impl Drop for TerminalEvents {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Returns when asked to stop, when the receiver is gone, or on a read error
fn poll_terminal(tx: &UnboundedSender<TerminalEvent>, tick_rate: Duration, stop: &AtomicBool) {
    let mut next_tick = Instant::now() + tick_rate;

    while !stop.load(Ordering::Relaxed) {
        let wait = next_tick.saturating_duration_since(Instant::now());
        if matches!(event::poll(wait), Ok(true)) {
            let Ok(raw) = event::read() else {
                return;
            };
            if let Some(event) = translate(raw) {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }

        if Instant::now() >= next_tick {
            if tx.send(TerminalEvent::Tick).is_err() {
                return;
            }
            next_tick = Instant::now() + tick_rate;
        }
    }
}
