//! System event monitor: classifies new system log entries by content

use crate::constants::{DETAIL_TIMESTAMP_FORMAT, SOURCE_SYSTEM_EVENTS};
use crate::models::{MonitorError, SecurityEvent, Severity, SystemLogEntry};
use crate::monitor::PollingMonitor;
use crate::sources::SystemLogSource;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Faults that indicate a crash or hardware failure
const SEVERE_PATTERNS: &[&str] = &[
    "unexpected shutdown",
    "unclean shutdown",
    "kernel panic",
    "out of memory",
    "oom-killer",
    "hardware error",
    "machine check",
];

/// Degraded but running
const ABNORMAL_PATTERNS: &[&str] = &[
    "low disk space",
    "disk space running low",
    "no space left on device",
    "i/o error",
    "read-only file system",
    "remounting filesystem read-only",
    "temperature above threshold",
    "link is down",
    "failed to start",
];

/// Severity of a log entry from its message text (case-insensitive)
pub fn classify_entry(message: &str) -> Severity {
    let message = message.to_lowercase();
    if SEVERE_PATTERNS.iter().any(|p| message.contains(p)) {
        Severity::Critical
    } else if ABNORMAL_PATTERNS.iter().any(|p| message.contains(p)) {
        Severity::Warning
    } else {
        Severity::Info
    }
}

pub struct SystemEventMonitor {
    source: Arc<dyn SystemLogSource>,
    interval: Duration,
    /// Entries seen per origin
    occurrences: Mutex<HashMap<String, u64>>,
}

impl SystemEventMonitor {
    pub fn new(source: Arc<dyn SystemLogSource>) -> Self {
        Self { source, interval: DEFAULT_INTERVAL, occurrences: Mutex::new(HashMap::new()) }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl PollingMonitor for SystemEventMonitor {
    fn name(&self) -> &'static str {
        SOURCE_SYSTEM_EVENTS
    }

    fn description(&self) -> &'static str {
        "System event monitoring"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError> {
        let entries = self.source.entries_since_last_poll()?;

        let counted: Vec<(SystemLogEntry, u64)> = {
            let mut occurrences = self.occurrences.lock();
            entries
                .into_iter()
                .map(|entry| {
                    let count = occurrences.entry(entry.origin.clone()).or_insert(0);
                    *count += 1;
                    (entry, *count)
                })
                .collect()
        };

        Ok(counted
            .into_iter()
            .map(|(entry, count)| {
                let severity = classify_entry(&entry.message);
                let observed = DateTime::<Local>::from(entry.observed_at);
                SecurityEvent::new(severity, SOURCE_SYSTEM_EVENTS, entry.message)
                    .with_detail("Origin", entry.origin)
                    .with_detail("EventTime", observed.format(DETAIL_TIMESTAMP_FORMAT).to_string())
                    .with_detail("OccurrenceCount", count.to_string())
            })
            .collect())
    }
}
