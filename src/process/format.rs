//! Pure formatting helpers shared by the tool surface and the dashboard

use tracing::warn;

use super::{ProcessInfo, ProcessStatus};

/// Semantic color of a status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Error,
}

/// Which glyph a status is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMark {
    /// ● still alive
    Active,
    /// ✗ timed out, killed, or exited non-zero
    Failed,
    /// ✓ exited zero
    Succeeded,
}

/// Glyph and color for a status; depends on nothing but its inputs
pub fn status_style(status: ProcessStatus, success: Option<bool>) -> (StatusMark, Tone) {
    match status {
        ProcessStatus::Running => (StatusMark::Active, Tone::Success),
        ProcessStatus::Terminating => (StatusMark::Active, Tone::Warning),
        ProcessStatus::TerminateTimeout | ProcessStatus::Killed => (StatusMark::Failed, Tone::Error),
        ProcessStatus::Exited if success == Some(true) => (StatusMark::Succeeded, Tone::Success),
        ProcessStatus::Exited => (StatusMark::Failed, Tone::Error),
    }
}

/// Status text including the exit code once there is one
pub fn status_label(info: &ProcessInfo) -> String {
    match (info.status, info.exit_code) {
        (ProcessStatus::Exited, Some(code)) => format!("exited, code {code}"),
        (ProcessStatus::Killed, Some(code)) => format!("killed, code {code}"),
        (status, _) => status.as_str().to_string(),
    }
}

/// Human-readable duration: `850ms`, `4.3s`, `3m 07s`, `1h 02m`
pub fn format_runtime(ms: i64) -> String {
    let ms = ms.max(0);
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

/// Human-readable byte count: `512B`, `50.0KB`, `1.2MB`
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

/// Collapse whitespace onto one line and cut to `max_chars`, ending in `…`
pub fn truncate_command(command: &str, max_chars: usize) -> String {
    let flat = command.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Pad or cut `text` to exactly `width` characters
pub fn fit_column(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count > width {
        truncate_command(text, width)
            .chars()
            .chain(std::iter::repeat(' '))
            .take(width)
            .collect()
    } else {
        format!("{text}{}", " ".repeat(width - count))
    }
}

/// Remove ANSI escape sequences
pub fn strip_ansi(text: &str) -> String {
    if !text.contains('\u{1b}') {
        return text.to_string();
    }
    match strip_ansi_escapes::strip(text.as_bytes()) {
        Ok(clean) => String::from_utf8_lossy(&clean).into_owned(),
        Err(err) => {
            warn!(?err, "failed to strip ANSI escapes");
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_style() {
        use ProcessStatus::*;
        assert_eq!(status_style(Running, None), (StatusMark::Active, Tone::Success));
        assert_eq!(status_style(Terminating, None), (StatusMark::Active, Tone::Warning));
        assert_eq!(status_style(TerminateTimeout, None), (StatusMark::Failed, Tone::Error));
        assert_eq!(status_style(Killed, Some(false)), (StatusMark::Failed, Tone::Error));
        assert_eq!(status_style(Exited, Some(true)), (StatusMark::Succeeded, Tone::Success));
        assert_eq!(status_style(Exited, Some(false)), (StatusMark::Failed, Tone::Error));
    }

    #[test]
    fn test_format_runtime() {
        assert_eq!(format_runtime(-5), "0ms");
        assert_eq!(format_runtime(850), "850ms");
        assert_eq!(format_runtime(4_300), "4.3s");
        assert_eq!(format_runtime(187_000), "3m 07s");
        assert_eq!(format_runtime(3_720_000), "1h 02m");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1023), "1023B");
        assert_eq!(format_size(50 * 1024), "50.0KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5MB");
    }

    #[test]
    fn test_truncate_command() {
        assert_eq!(truncate_command("npm  run\n dev", 40), "npm run dev");
        assert_eq!(truncate_command("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_fit_column() {
        assert_eq!(fit_column("ab", 4), "ab  ");
        assert_eq!(fit_column("abcdef", 4), "abc…");
        assert_eq!(fit_column("", 0), "");
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\u{1b}[31mred\u{1b}[0m plain"), "red plain");
        assert_eq!(strip_ansi("plain"), "plain");
    }
}
