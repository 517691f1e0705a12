//! Tail truncation for tool output
//!
//! Keeps the newest content: lines are taken from the end until either the
//! line limit is reached or the next line would push the byte count over the
//! byte limit. Each joined line costs one extra byte for its separator.

use serde::Serialize;

use crate::core::LogFiles;
use crate::process::format::format_size;

/// Line limit for tool output
pub const MAX_LINES: usize = 200;

/// Byte limit for tool output
pub const MAX_BYTES: usize = 50 * 1024;

/// Which limit stopped the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TruncatedBy {
    Lines,
    Bytes,
}

/// Result of truncating a text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Truncation {
    #[serde(skip)]
    pub content: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_by: Option<TruncatedBy>,
    pub total_lines: usize,
    pub total_bytes: usize,
    pub output_lines: usize,
    pub output_bytes: usize,
    /// Only the trailing bytes of the newest line were kept
    pub last_line_partial: bool,
    pub max_bytes: usize,
}

/// Keep the end of `content` within `max_lines` and `max_bytes`
pub fn truncate_tail(content: &str, max_lines: usize, max_bytes: usize) -> Truncation {
    let total_bytes = content.len();
    let lines: Vec<&str> = content.split('\n').collect();
    let total_lines = lines.len();

    if total_lines <= max_lines && total_bytes <= max_bytes {
        return Truncation {
            content: content.to_string(),
            truncated: false,
            truncated_by: None,
            total_lines,
            total_bytes,
            output_lines: total_lines,
            output_bytes: total_bytes,
            last_line_partial: false,
            max_bytes,
        };
    }

    let mut kept: Vec<String> = Vec::new();
    let mut byte_count = 0usize;
    let mut truncated_by = None;
    let mut last_line_partial = false;

    for line in lines.iter().rev() {
        if kept.len() >= max_lines {
            truncated_by = Some(TruncatedBy::Lines);
            break;
        }

        let line_bytes = line.len() + usize::from(!kept.is_empty());
        if byte_count + line_bytes > max_bytes {
            if kept.is_empty() {
                kept.push(tail_bytes(line, max_bytes).to_string());
                last_line_partial = true;
            }
            truncated_by = Some(TruncatedBy::Bytes);
            break;
        }

        kept.push((*line).to_string());
        byte_count += line_bytes;
    }

    kept.reverse();
    let output = kept.join("\n");

    Truncation {
        output_bytes: output.len(),
        output_lines: kept.len(),
        content: output,
        truncated: truncated_by.is_some(),
        truncated_by,
        total_lines,
        total_bytes,
        last_line_partial,
        max_bytes,
    }
}

/// Footer telling the reader what was dropped and where the full logs are
pub fn truncation_notice(truncation: &Truncation, files: &LogFiles) -> String {
    let limit = match truncation.truncated_by {
        Some(TruncatedBy::Bytes) => format!(" ({} limit)", format_size(truncation.max_bytes as u64)),
        _ => String::new(),
    };
    let total = truncation.total_lines;
    let shown = if truncation.last_line_partial {
        format!(
            "Showing last {} of line {total}{limit}",
            format_size(truncation.output_bytes as u64)
        )
    } else {
        let start = total - truncation.output_lines + 1;
        format!("Showing lines {start}-{total} of {total}{limit}")
    };
    format!(
        "[{shown}. Full logs: {} {}]",
        files.stdout_file.display(),
        files.stderr_file.display()
    )
}

/// The last `max_bytes` of `s`, starting on a char boundary
fn tail_bytes(s: &str, max_bytes: usize) -> &str {
    let mut start = s.len().saturating_sub(max_bytes);
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn files() -> LogFiles {
        LogFiles {
            stdout_file: PathBuf::from("/tmp/logs/proc_1.stdout.log"),
            stderr_file: PathBuf::from("/tmp/logs/proc_1.stderr.log"),
        }
    }

    fn numbered(count: usize, width: usize) -> String {
        (1..=count)
            .map(|i| format!("{i:0width$}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_within_limits_is_untouched() {
        let text = numbered(200, 10);
        let result = truncate_tail(&text, MAX_LINES, MAX_BYTES);
        assert!(!result.truncated);
        assert_eq!(result.content, text);
        assert_eq!(result.output_lines, 200);
    }

    #[test]
    fn test_line_limit_boundary() {
        let text = numbered(201, 10);
        let result = truncate_tail(&text, MAX_LINES, MAX_BYTES);

        assert!(result.truncated);
        assert_eq!(result.truncated_by, Some(TruncatedBy::Lines));
        assert_eq!(result.total_lines, 201);
        assert_eq!(result.output_lines, 200);
        assert_eq!(result.content.lines().count(), 200);
        assert!(result.content.starts_with("0000000002\n"));
        assert!(result.content.ends_with("0000000201"));

        let notice = truncation_notice(&result, &files());
        assert!(notice.contains("Showing lines 2-201 of 201"));
        assert!(!notice.contains("limit"));
        assert!(notice.contains("/tmp/logs/proc_1.stdout.log"));
        assert!(notice.contains("/tmp/logs/proc_1.stderr.log"));
    }

    #[test]
    fn test_byte_limit_boundary() {
        // 50 lines of 1228 bytes: about 60 KiB once joined
        let text = (0..50).map(|i| format!("{i:0>1228}")).collect::<Vec<_>>().join("\n");
        assert!(text.len() > 60 * 1024 - 100);

        let result = truncate_tail(&text, MAX_LINES, MAX_BYTES);
        assert!(result.truncated);
        assert_eq!(result.truncated_by, Some(TruncatedBy::Bytes));
        assert!(result.output_bytes <= MAX_BYTES);
        // 1228 + 40 * 1229 fits, one more line would not
        assert_eq!(result.output_lines, 41);
        assert_eq!(result.output_bytes, 1228 + 40 * 1229);

        let notice = truncation_notice(&result, &files());
        assert!(notice.contains("Showing lines 10-50 of 50 (50.0KB limit)"));
    }

    #[test]
    fn test_exact_byte_limit_is_untouched() {
        let text = "x".repeat(MAX_BYTES);
        let result = truncate_tail(&text, MAX_LINES, MAX_BYTES);
        assert!(!result.truncated);
    }

    #[test]
    fn test_oversized_last_line_keeps_its_tail() {
        let text = format!("short\n{}é", "y".repeat(MAX_BYTES));
        let result = truncate_tail(&text, MAX_LINES, MAX_BYTES);

        assert!(result.last_line_partial);
        assert_eq!(result.output_lines, 1);
        assert!(result.output_bytes <= MAX_BYTES);
        assert!(result.content.ends_with('é'));

        let notice = truncation_notice(&result, &files());
        assert!(notice.starts_with("[Showing last "));
        assert!(notice.contains("of line 2 (50.0KB limit)"));
    }
}
