//! Output formatting module
//!
//! Handles:
//! - Log file record rendering (header line plus indented detail lines)
//! - One-line console summaries for escalated events
//! - Per-run log file naming

use chrono::{DateTime, Local};
use std::borrow::Cow;
use crate::constants::{LOG_FILE_PREFIX, LOG_FILE_TIMESTAMP_FORMAT, RECORD_TIMESTAMP_FORMAT};
use crate::models::SecurityEvent;

/// Render an event as one complete log record.
///
/// ```text
/// [2024-05-01 10:22:03.118] [Critical] ProcessMonitor - Suspicious process detected
///     ProcessID: 200
///     ProcessName: mimikatz
///
/// ```
///
/// The record always ends with a blank line so records stay separable
/// when read back. Control characters in event text are escaped, so every
/// record has exactly one header line. An unstamped event renders with the
/// current time.
pub fn format_record(event: &SecurityEvent) -> String {
    let timestamp = event.timestamp.unwrap_or_else(Local::now);

    let mut record = format!(
        "[{}] [{}] {} - {}\n",
        timestamp.format(RECORD_TIMESTAMP_FORMAT),
        event.severity,
        escape_control(&event.source),
        escape_control(&event.message)
    );
    for (key, value) in event.details.iter() {
        record.push('\t');
        record.push_str(&escape_control(key));
        record.push_str(": ");
        record.push_str(&escape_control(value));
        record.push('\n');
    }
    record.push('\n');
    record
}

/// One-line console summary used for Warning and Critical events
pub fn format_console_line(event: &SecurityEvent) -> String {
    format!(
        "[{}] {}: {}",
        event.severity,
        escape_control(&event.source),
        escape_control(&event.message)
    )
}

/// Replace control characters with their escaped form (`\n`, `\t`, `\u{1b}`)
pub fn escape_control(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_control) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Log file name for a run started at `started`
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}{}.log", LOG_FILE_PREFIX, started.format(LOG_FILE_TIMESTAMP_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 10, 22, 3).single().unwrap()
    }

    #[test]
    fn test_record_header_and_details() {
        let event = SecurityEvent::critical("ProcessMonitor", "Suspicious process detected")
            .with_detail("ProcessID", "200")
            .with_detail("ProcessName", "mimikatz")
            .at(fixed_time());

        let record = format_record(&event);
        let lines: Vec<&str> = record.lines().collect();

        assert_eq!(lines[0], "[2024-05-01 10:22:03.000] [Critical] ProcessMonitor - Suspicious process detected");
        assert_eq!(lines[1], "\tProcessID: 200");
        assert_eq!(lines[2], "\tProcessName: mimikatz");
        assert_eq!(lines[3], "");
        assert!(record.ends_with("\n\n"));
    }

    #[test]
    fn test_record_without_details_is_header_plus_blank_line() {
        let event = SecurityEvent::info("SecurityMonitor", "All monitoring components initialized")
            .at(fixed_time());

        let record = format_record(&event);
        assert_eq!(record.lines().count(), 2);
        assert!(record.starts_with("[2024-05-01 10:22:03.000] [Info] SecurityMonitor - "));
    }

    #[test]
    fn test_console_line() {
        let event = SecurityEvent::warning("NetworkMonitor", "Suspicious UDP port listening detected")
            .with_detail("Port", "4444");
        assert_eq!(
            format_console_line(&event),
            "[Warning] NetworkMonitor: Suspicious UDP port listening detected"
        );
    }

    #[test]
    fn test_embedded_newlines_cannot_forge_a_record() {
        let forged = "rootkit\n[2026-01-01 00:00:00.000] [Info] SecurityMonitor - Security monitoring stopped";
        let event = SecurityEvent::warning("ProcessMonitor\r\n", "High privilege process detected\n")
            .with_detail("ProcessID", "7")
            .with_detail("ProcessName", forged)
            .at(fixed_time());

        let record = format_record(&event);
        assert_eq!(record.lines().filter(|line| line.starts_with('[')).count(), 1);
        assert_eq!(record.lines().count(), 4);
        assert!(record.contains("\tProcessName: rootkit\\n[2026-01-01"));
        assert!(record.starts_with("[2024-05-01 10:22:03.000] [Warning] ProcessMonitor\\r\\n - "));
    }

    #[test]
    fn test_escape_control_leaves_plain_text_borrowed() {
        assert!(matches!(escape_control("sshd: Failed password"), Cow::Borrowed(_)));
        assert_eq!(escape_control("a\tb\u{1b}[31m"), "a\\tb\\u{1b}[31m");
    }

    #[test]
    fn test_log_file_name() {
        assert_eq!(log_file_name(fixed_time()), "SecurityLog_20240501_102203.log");
    }
}
