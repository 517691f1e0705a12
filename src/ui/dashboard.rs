//! Process dashboard
//!
//! Holds the selection and scroll state, reacts to keys and supervisor
//! events, and produces the styled lines the frame renderer draws. Lines are
//! memoized per terminal width until something invalidates them.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::{Line, Span};
use tracing::{debug, info, warn};

use super::theme::{Styler, ThemeColor};
use crate::core::{ProcessEvent, ProcessPreferences, UiPreferences};
use crate::process::format::{
    fit_column, format_runtime, format_size, status_label, status_style, strip_ansi,
};
use crate::process::{
    now_ms, KillOptions, KillSignal, ProcessInfo, ProcessManager, ProcessStatus, Subscription,
};

const ID_WIDTH: usize = 9;
const NAME_WIDTH: usize = 14;
const STATUS_WIDTH: usize = 17;
const RUNTIME_WIDTH: usize = 8;
const SIZE_WIDTH: usize = 8;
const MIN_COMMAND_WIDTH: usize = 10;
/// Pointer, mark and the single spaces between columns
const ROW_OVERHEAD: usize = 2 + 2 + 5;

/// What the caller should do after a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Handled,
    Ignored,
    Close,
}

pub struct Dashboard {
    manager: ProcessManager,
    subscription: Option<Subscription>,

    selected: usize,
    list_scroll: usize,
    /// Lines back from the newest log line
    log_scroll: usize,

    visible_rows: usize,
    log_lines: usize,
    scroll_step: usize,

    /// `x` on a running process
    graceful: KillOptions,
    /// `x` on a process that ignored the graceful request
    force: KillOptions,

    cached_width: Option<u16>,
    cached_lines: Vec<Line<'static>>,

    notice: Option<String>,
}

impl Dashboard {
    pub fn new(manager: ProcessManager, prefs: &UiPreferences) -> Self {
        let subscription = Some(manager.on_event());
        Self {
            manager,
            subscription,
            selected: 0,
            list_scroll: 0,
            log_scroll: 0,
            visible_rows: prefs.visible_rows.max(1),
            log_lines: prefs.log_lines.max(1),
            scroll_step: prefs.log_scroll_step.max(1),
            graceful: KillOptions::graceful(),
            force: KillOptions::force(),
            cached_width: None,
            cached_lines: Vec::new(),
            notice: None,
        }
    }

    /// Take kill timeouts from the process config
    pub fn with_kill_timeouts(mut self, prefs: &ProcessPreferences) -> Self {
        self.graceful = KillOptions::new(KillSignal::Term, prefs.terminate_timeout());
        self.force = KillOptions::new(KillSignal::Kill, prefs.force_kill_timeout());
        self
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_none()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.manager.list().get(self.selected).map(|p| p.id.clone())
    }

    /// Drop the memoized lines
    pub fn invalidate(&mut self) {
        self.cached_width = None;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if self.is_closed() {
            return KeyOutcome::Close;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.close();
                return KeyOutcome::Close;
            }
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.close();
                return KeyOutcome::Close;
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Char('K') => self.scroll_log(true),
            KeyCode::Char('J') => self.scroll_log(false),
            KeyCode::Char('x') => self.kill_selected(),
            KeyCode::Char('c') | KeyCode::Char('C') => self.clear_finished(),
            _ => return KeyOutcome::Ignored,
        }

        self.invalidate();
        KeyOutcome::Handled
    }

    /// Unsubscribe from the supervisor. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("dashboard closed");
        }
    }

    /// Wait for the next supervisor event; `None` once closed
    pub async fn next_event(&mut self) -> Option<ProcessEvent> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        }
    }

    /// React to one supervisor event
    pub fn apply_event(&mut self, event: &ProcessEvent) {
        if let ProcessEvent::Cleared { ids } = event {
            debug!(count = ids.len(), "processes cleared");
        }
        self.clamp_selection(self.manager.list().len());
        self.invalidate();
    }

    /// Apply every queued event; true when there was at least one
    pub fn drain_events(&mut self) -> bool {
        let mut events = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Some(event) = subscription.try_recv() {
                events.push(event);
            }
        }
        for event in &events {
            self.apply_event(event);
        }
        !events.is_empty()
    }

    /// Runtimes keep moving while anything is alive
    pub fn on_tick(&mut self) {
        if self.manager.list().iter().any(|p| p.status.is_alive()) {
            self.invalidate();
        }
    }

    /// Styled lines for a pane `width` columns wide
    pub fn render_lines<S: Styler>(&mut self, width: u16, styler: &S) -> &[Line<'static>] {
        if self.cached_width != Some(width) {
            self.cached_lines = self.build_lines(usize::from(width), styler);
            self.cached_width = Some(width);
        }
        &self.cached_lines
    }

    fn move_selection(&mut self, delta: isize) {
        let count = self.manager.list().len();
        if count > 0 {
            self.selected = self.selected.saturating_add_signed(delta).min(count - 1);
        }
        self.log_scroll = 0;
        self.clamp_selection(count);
    }

    fn clamp_selection(&mut self, count: usize) {
        if count == 0 {
            self.selected = 0;
            self.list_scroll = 0;
            return;
        }
        self.selected = self.selected.min(count - 1);
        self.list_scroll = self.list_scroll.min(count.saturating_sub(self.visible_rows));
        if self.selected < self.list_scroll {
            self.list_scroll = self.selected;
        } else if self.selected >= self.list_scroll + self.visible_rows {
            self.list_scroll = self.selected + 1 - self.visible_rows;
        }
    }

    fn scroll_log(&mut self, older: bool) {
        let total = self
            .selected_id()
            .and_then(|id| self.manager.log_tail(&id, 0, 0))
            .map_or(0, |(_, total)| total);
        let max_offset = total.saturating_sub(self.log_lines);
        self.log_scroll = if older {
            (self.log_scroll + self.scroll_step).min(max_offset)
        } else {
            self.log_scroll.saturating_sub(self.scroll_step)
        };
    }

    fn kill_selected(&mut self) {
        let Some(info) = self.manager.list().into_iter().nth(self.selected) else {
            return;
        };
        let options = match info.status {
            ProcessStatus::Running => self.graceful,
            ProcessStatus::TerminateTimeout => self.force,
            status => {
                self.notice = Some(format!("{} is {status}", info.id));
                return;
            }
        };

        self.notice = Some(format!("Sent {} to {}", options.signal, info.id));
        let manager = self.manager.clone();
        let id = info.id;
        tokio::spawn(async move {
            match manager.kill(&id, options).await {
                Ok(outcome) => debug!(%id, status = %outcome.status(), "kill from dashboard resolved"),
                Err(err) => warn!(%id, error = %err, "kill from dashboard failed"),
            }
        });
    }

    fn clear_finished(&mut self) {
        let cleared = self.manager.clear_finished();
        if cleared > 0 {
            info!(cleared, "cleared from dashboard");
        }
        self.notice = Some(match cleared {
            0 => "Nothing to clear".to_string(),
            n => format!("Cleared {n} finished"),
        });
        self.clamp_selection(self.manager.list().len());
    }

    fn build_lines<S: Styler>(&self, width: usize, s: &S) -> Vec<Line<'static>> {
        let processes = self.manager.list();
        let alive = processes.iter().filter(|p| p.status.is_alive()).count();
        let mut lines = vec![Line::from(vec![
            s.bold("Background processes"),
            s.fg(
                ThemeColor::Muted,
                &format!("  {alive} running, {} total", processes.len()),
            ),
        ])];

        if processes.is_empty() {
            lines.push(Line::from(s.fg(ThemeColor::Muted, "No background processes")));
        } else {
            let command_width = width
                .saturating_sub(ROW_OVERHEAD + ID_WIDTH + NAME_WIDTH + STATUS_WIDTH + RUNTIME_WIDTH + SIZE_WIDTH)
                .max(MIN_COMMAND_WIDTH);
            lines.push(Line::from(s.fg(
                ThemeColor::Dim,
                &format!(
                    "    {} {} {} {} {} {}",
                    fit_column("ID", ID_WIDTH),
                    fit_column("NAME", NAME_WIDTH),
                    fit_column("COMMAND", command_width),
                    fit_column("STATUS", STATUS_WIDTH),
                    fit_column("RUNTIME", RUNTIME_WIDTH),
                    fit_column("SIZE", SIZE_WIDTH),
                ),
            )));

            if self.list_scroll > 0 {
                lines.push(Line::from(s.fg(
                    ThemeColor::Dim,
                    &format!("    … {} more above", self.list_scroll),
                )));
            }
            let now = now_ms();
            for (index, info) in processes
                .iter()
                .enumerate()
                .skip(self.list_scroll)
                .take(self.visible_rows)
            {
                lines.push(self.process_row(info, index == self.selected, command_width, now, s));
            }
            let below = processes
                .len()
                .saturating_sub(self.list_scroll + self.visible_rows);
            if below > 0 {
                lines.push(Line::from(s.fg(ThemeColor::Dim, &format!("    … {below} more below"))));
            }

            lines.push(Line::from(s.fg(ThemeColor::Border, &s.rule().repeat(width))));
            if let Some(info) = processes.get(self.selected) {
                self.push_log_pane(&mut lines, info, width, s);
            }
        }

        lines.push(Line::from(s.fg(
            ThemeColor::Dim,
            "↑↓/jk select  J/K scroll output  x kill  c clear finished  q close",
        )));
        if let Some(notice) = &self.notice {
            lines.push(Line::from(s.fg(ThemeColor::Muted, notice)));
        }
        lines
    }

    fn process_row<S: Styler>(
        &self,
        info: &ProcessInfo,
        selected: bool,
        command_width: usize,
        now: i64,
        s: &S,
    ) -> Line<'static> {
        let (mark, tone) = status_style(info.status, info.success);
        let tone = ThemeColor::from(tone);
        let size = self
            .manager
            .get_file_size(&info.id)
            .map(|sizes| format_size(sizes.total()))
            .unwrap_or_default();

        let name = fit_column(&info.name, NAME_WIDTH);
        let spans: Vec<Span<'static>> = vec![
            s.fg(ThemeColor::Accent, if selected { s.pointer() } else { "  " }),
            s.fg(tone, &format!("{} ", s.mark(mark))),
            s.fg(ThemeColor::Muted, &format!("{} ", fit_column(&info.id, ID_WIDTH))),
            if selected {
                s.bold(&format!("{name} "))
            } else {
                s.fg(ThemeColor::Text, &format!("{name} "))
            },
            s.fg(ThemeColor::Text, &format!("{} ", fit_column(&info.command, command_width))),
            s.fg(tone, &format!("{} ", fit_column(&status_label(info), STATUS_WIDTH))),
            s.fg(
                ThemeColor::Muted,
                &format!("{} ", fit_column(&format_runtime(info.runtime_ms(now)), RUNTIME_WIDTH)),
            ),
            s.fg(ThemeColor::Dim, &fit_column(&size, SIZE_WIDTH)),
        ];
        Line::from(spans)
    }

    fn push_log_pane<S: Styler>(&self, lines: &mut Vec<Line<'static>>, info: &ProcessInfo, width: usize, s: &S) {
        let (tail, total) = self
            .manager
            .log_tail(&info.id, self.log_lines, self.log_scroll)
            .unwrap_or_default();

        let end = total.saturating_sub(self.log_scroll);
        let start = end.saturating_sub(tail.len());
        let range = if total == 0 {
            String::new()
        } else {
            format!("  lines {}-{end} of {total}", start + 1)
        };
        lines.push(Line::from(vec![
            s.bold(&format!("{} \"{}\"", info.id, info.name)),
            s.fg(ThemeColor::Muted, &range),
        ]));

        if tail.is_empty() {
            lines.push(Line::from(s.fg(ThemeColor::Muted, "(no output yet)")));
        }
        for line in tail {
            let text: String = strip_ansi(&line.content).chars().take(width).collect();
            let color = if line.is_stderr() {
                ThemeColor::Error
            } else {
                ThemeColor::Text
            };
            lines.push(Line::from(s.fg(color, &text)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogStore;
    use crate::process::format::StatusMark;
    use crate::process::{ManagerSettings, SpawnRequest};
    use crossterm::event::KeyEventKind;
    use std::cell::RefCell;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    struct Plain;

    impl Styler for Plain {
        fn fg(&self, _color: ThemeColor, text: &str) -> Span<'static> {
            Span::raw(text.to_string())
        }

        fn bold(&self, text: &str) -> Span<'static> {
            Span::raw(text.to_string())
        }

        fn mark(&self, mark: StatusMark) -> &'static str {
            match mark {
                StatusMark::Active => "●",
                StatusMark::Failed => "✗",
                StatusMark::Succeeded => "✓",
            }
        }
    }

    /// Remembers which color each piece of text asked for
    #[derive(Default)]
    struct Recording {
        calls: RefCell<Vec<(ThemeColor, String)>>,
    }

    impl Styler for Recording {
        fn fg(&self, color: ThemeColor, text: &str) -> Span<'static> {
            self.calls.borrow_mut().push((color, text.to_string()));
            Span::raw(text.to_string())
        }

        fn bold(&self, text: &str) -> Span<'static> {
            Span::raw(text.to_string())
        }

        fn mark(&self, mark: StatusMark) -> &'static str {
            Plain.mark(mark)
        }
    }

    fn setup() -> (ProcessManager, Dashboard, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = ProcessManager::new(LogStore::new(dir.path()).unwrap(), ManagerSettings::default());
        let dashboard = Dashboard::new(manager.clone(), &UiPreferences::default());
        (manager, dashboard, dir)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        }
    }

    fn press(dashboard: &mut Dashboard, c: char) -> KeyOutcome {
        dashboard.handle_key(key(KeyCode::Char(c)))
    }

    fn text(dashboard: &mut Dashboard, width: u16) -> Vec<String> {
        dashboard
            .render_lines(width, &Plain)
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect()
    }

    async fn wait_until<F>(manager: &ProcessManager, pred: F)
    where
        F: Fn(&[ProcessInfo]) -> bool,
    {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !pred(&manager.list()) {
            assert!(Instant::now() < deadline, "timed out: {:?}", manager.list());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn all_finished(list: &[ProcessInfo]) -> bool {
        list.iter().all(|p| p.status.is_terminal())
    }

    #[tokio::test]
    async fn test_empty_dashboard() {
        let (_manager, mut dashboard, _dir) = setup();
        let lines = text(&mut dashboard, 80);
        assert!(lines[0].starts_with("Background processes"));
        assert_eq!(lines[1], "No background processes");
        assert_eq!(press(&mut dashboard, 'j'), KeyOutcome::Handled);
        assert_eq!(press(&mut dashboard, 'x'), KeyOutcome::Handled);
        assert_eq!(press(&mut dashboard, 'z'), KeyOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_navigation_clamps_and_resets_log_scroll() {
        let (manager, mut dashboard, _dir) = setup();
        for _ in 0..3 {
            manager.spawn(SpawnRequest::new("", "sleep 30")).unwrap();
        }

        press(&mut dashboard, 'k');
        assert_eq!(dashboard.selected, 0);
        for _ in 0..3 {
            press(&mut dashboard, 'j');
        }
        assert_eq!(dashboard.selected, 2);
        assert_eq!(dashboard.selected_id().as_deref(), Some("proc_3"));

        dashboard.log_scroll = 4;
        dashboard.handle_key(key(KeyCode::Up));
        assert_eq!(dashboard.selected, 1);
        assert_eq!(dashboard.log_scroll, 0);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_list_scrolls_past_visible_rows() {
        let (manager, mut dashboard, _dir) = setup();
        for _ in 0..10 {
            manager.spawn(SpawnRequest::new("", "true")).unwrap();
        }

        for _ in 0..9 {
            press(&mut dashboard, 'j');
        }
        assert_eq!(dashboard.selected, 9);
        assert_eq!(dashboard.list_scroll, 2);

        let lines = text(&mut dashboard, 100);
        assert!(lines.iter().any(|l| l.contains("2 more above")));
        assert!(lines.iter().any(|l| l.starts_with("> ") && l.contains("proc_10")));
        assert!(!lines.iter().any(|l| l.contains("proc_1 ")));
        assert!(!lines.iter().any(|l| l.contains("more below")));
    }

    #[tokio::test]
    async fn test_log_pane_scrolls() {
        let (manager, mut dashboard, _dir) = setup();
        let info = manager.spawn(SpawnRequest::new("count", "seq 1 30")).unwrap();
        wait_until(&manager, all_finished).await;
        assert_eq!(manager.log_tail(&info.id, 0, 0).map(|(_, n)| n), Some(30));

        let lines = text(&mut dashboard, 80);
        assert!(lines.iter().any(|l| l == "proc_1 \"count\"  lines 19-30 of 30"));
        assert!(lines.iter().any(|l| l == "30"));

        press(&mut dashboard, 'K');
        assert_eq!(dashboard.log_scroll, 5);
        let lines = text(&mut dashboard, 80);
        assert!(lines.iter().any(|l| l == "proc_1 \"count\"  lines 14-25 of 30"));
        assert!(!lines.iter().any(|l| l == "26"));

        for _ in 0..10 {
            press(&mut dashboard, 'K');
        }
        assert_eq!(dashboard.log_scroll, 18);
        press(&mut dashboard, 'J');
        assert_eq!(dashboard.log_scroll, 13);
    }

    #[tokio::test]
    async fn test_render_is_memoized_per_width() {
        let (manager, mut dashboard, _dir) = setup();
        text(&mut dashboard, 80);
        assert_eq!(dashboard.cached_width, Some(80));

        manager.spawn(SpawnRequest::new("", "true")).unwrap();
        // Still the cached, empty rendering
        assert_eq!(text(&mut dashboard, 80)[1], "No background processes");

        assert!(dashboard.drain_events());
        assert_eq!(dashboard.cached_width, None);
        assert!(text(&mut dashboard, 80).iter().any(|l| l.contains("proc_1")));

        text(&mut dashboard, 120);
        assert_eq!(dashboard.cached_width, Some(120));
        wait_until(&manager, all_finished).await;
    }

    #[tokio::test]
    async fn test_clear_reclamps_selection() {
        let (manager, mut dashboard, _dir) = setup();
        manager.spawn(SpawnRequest::new("", "sleep 30")).unwrap();
        for _ in 0..2 {
            manager.spawn(SpawnRequest::new("", "true")).unwrap();
        }
        wait_until(&manager, |list| list.iter().filter(|p| p.status.is_terminal()).count() == 2).await;

        press(&mut dashboard, 'j');
        press(&mut dashboard, 'j');
        assert_eq!(dashboard.selected, 2);

        press(&mut dashboard, 'c');
        assert_eq!(manager.list().len(), 1);
        assert_eq!(dashboard.selected, 0);
        assert!(text(&mut dashboard, 80).iter().any(|l| l == "Cleared 2 finished"));

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_kill_key_terminates_running_process() {
        let (manager, mut dashboard, _dir) = setup();
        manager.spawn(SpawnRequest::new("", "sleep 30")).unwrap();

        press(&mut dashboard, 'x');
        assert_eq!(dashboard.notice.as_deref(), Some("Sent SIGTERM to proc_1"));
        wait_until(&manager, |list| list[0].status == ProcessStatus::Killed).await;

        press(&mut dashboard, 'x');
        assert_eq!(dashboard.notice.as_deref(), Some("proc_1 is killed"));
    }

    #[tokio::test]
    async fn test_kill_key_escalates_after_terminate_timeout() {
        let (manager, dashboard, _dir) = setup();
        let prefs = ProcessPreferences {
            terminate_timeout_ms: 100,
            ..ProcessPreferences::default()
        };
        let mut dashboard = dashboard.with_kill_timeouts(&prefs);
        manager
            .spawn(SpawnRequest::new("stubborn", "trap '' TERM; echo ready; sleep 30"))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while manager.get_output("proc_1", None).map_or(true, |out| out.stdout.is_empty()) {
            assert!(Instant::now() < deadline, "trap never installed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        press(&mut dashboard, 'x');
        assert_eq!(dashboard.notice.as_deref(), Some("Sent SIGTERM to proc_1"));
        wait_until(&manager, |list| list[0].status == ProcessStatus::TerminateTimeout).await;

        press(&mut dashboard, 'x');
        assert_eq!(dashboard.notice.as_deref(), Some("Sent SIGKILL to proc_1"));
        wait_until(&manager, |list| list[0].status == ProcessStatus::Killed).await;
        assert_eq!(manager.list()[0].exit_code, Some(128 + 9));
    }

    #[tokio::test]
    async fn test_status_colors() {
        let (manager, mut dashboard, _dir) = setup();
        manager.spawn(SpawnRequest::new("", "exit 3")).unwrap();
        wait_until(&manager, all_finished).await;

        let styler = Recording::default();
        dashboard.render_lines(80, &styler);
        let calls = styler.calls.borrow();
        assert!(calls
            .iter()
            .any(|(color, text)| *color == ThemeColor::Error && text.starts_with("exited, code 3")));
        assert!(calls
            .iter()
            .any(|(color, text)| *color == ThemeColor::Error && text == "✗ "));
    }

    #[tokio::test]
    async fn test_close_unsubscribes_once() {
        let (manager, mut dashboard, _dir) = setup();
        assert_eq!(press(&mut dashboard, 'q'), KeyOutcome::Close);
        assert!(dashboard.is_closed());

        dashboard.close();
        assert_eq!(dashboard.handle_key(key(KeyCode::Esc)), KeyOutcome::Close);

        manager.spawn(SpawnRequest::new("", "true")).unwrap();
        assert!(!dashboard.drain_events());
        assert!(dashboard.next_event().await.is_none());
        wait_until(&manager, all_finished).await;
    }
}
