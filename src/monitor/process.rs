//! Process monitor: newly started processes checked against a blocklist

use crate::constants::{DETAIL_TIMESTAMP_FORMAT, PRIVILEGED_NAME_MARKERS, SOURCE_PROCESS};
use crate::models::{EventDetails, MonitorError, ProcessEntry, SecurityEvent};
use crate::monitor::{PollingMonitor, ProcessTracker};
use crate::sources::ProcessSource;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Credential dumpers, shells and crackers
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "mimikatz",
    "netcat",
    "nc",
    "powersploit",
    "metasploit",
    "cain",
    "john",
    "hashcat",
    "wce",
];

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub struct ProcessMonitor {
    source: Arc<dyn ProcessSource>,
    blocklist: HashSet<String>,
    interval: Duration,
    tracker: Mutex<ProcessTracker>,
}

impl ProcessMonitor {
    pub fn new(source: Arc<dyn ProcessSource>) -> Self {
        Self {
            source,
            blocklist: DEFAULT_BLOCKLIST.iter().map(|name| normalize_name(name)).collect(),
            interval: DEFAULT_INTERVAL,
            tracker: Mutex::new(ProcessTracker::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_blocklist<S: AsRef<str>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.blocklist = names.into_iter().map(|name| normalize_name(name.as_ref())).collect();
        self
    }

    fn classify(&self, process: &ProcessEntry) -> Option<SecurityEvent> {
        let name = normalize_name(&process.name);

        if self.blocklist.contains(&name) {
            return Some(
                SecurityEvent::critical(SOURCE_PROCESS, "Suspicious process detected")
                    .with_details(process_details(process)),
            );
        }

        if PRIVILEGED_NAME_MARKERS.iter().any(|marker| name.contains(marker)) {
            return Some(
                SecurityEvent::warning(SOURCE_PROCESS, "High privilege process detected")
                    .with_details(process_details(process))
                    .with_detail("Privilege", "High"),
            );
        }

        None
    }
}

/// Lower-case and drop a trailing `.exe`
pub fn normalize_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

fn process_details(process: &ProcessEntry) -> EventDetails {
    let mut details = EventDetails::new();
    details.insert("ProcessID", process.pid.to_string());
    details.insert("ProcessName", process.name.clone());
    if let Some(started) = process
        .start_time
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        details.insert(
            "StartTime",
            started.with_timezone(&Local).format(DETAIL_TIMESTAMP_FORMAT).to_string(),
        );
    }
    details.insert("MemoryUsage", format!("{} MB", process.memory_bytes / (1024 * 1024)));
    details
}

impl PollingMonitor for ProcessMonitor {
    fn name(&self) -> &'static str {
        SOURCE_PROCESS
    }

    fn description(&self) -> &'static str {
        "Process monitoring"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn describe(&self) -> EventDetails {
        let mut details = EventDetails::new();
        details.insert("BlocklistSize", self.blocklist.len().to_string());
        details
    }

    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError> {
        let table = self.source.processes()?;
        let new_processes = self.tracker.lock().detect_new_processes(table);
        Ok(new_processes.iter().filter_map(|p| self.classify(p)).collect())
    }
}
