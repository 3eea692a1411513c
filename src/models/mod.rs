//! Data models module
//!
//! Defines core data structures:
//! - SecurityEvent: the unit of data flowing from monitors to the event bus
//! - Severity: ordered alert level (Info < Warning < Critical)
//! - EventDetails: ordered key/value details attached to an event
//! - Observations: raw state reported by host collaborators (connections,
//!   processes, file events, authentication failures, system log entries)
//! - MonitorError: failures raised while a monitor ticks

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::SystemTime;

/// Alert level of a security event. Ordering is significant:
/// anything at or above `Warning` is escalated to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        }
    }

    /// Whether events of this level are written to the console at enqueue time
    pub fn escalates(&self) -> bool {
        *self >= Severity::Warning
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered string map. Insertion order is kept; keys are unique within
/// one event, so inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    entries: Vec<(String, String)>,
}

impl EventDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EventDetails {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut details = EventDetails::new();
        for (k, v) in iter {
            details.insert(k, v);
        }
        details
    }
}

/// A single security event. Built by a monitor or the threat cache,
/// owned by the event bus from enqueue until it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Creation time; the bus stamps the enqueue time when absent
    pub timestamp: Option<DateTime<Local>>,
    pub severity: Severity,
    /// Name of the emitting component
    pub source: String,
    pub message: String,
    pub details: EventDetails,
}

impl SecurityEvent {
    pub fn new(severity: Severity, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            severity,
            source: source.into(),
            message: message.into(),
            details: EventDetails::new(),
        }
    }

    pub fn info(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, source, message)
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, source, message)
    }

    pub fn critical(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, source, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key, value);
        self
    }

    pub fn with_details(mut self, details: EventDetails) -> Self {
        for (k, v) in details.iter() {
            self.details.insert(k, v);
        }
        self
    }

    pub fn at(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

//
// Observations reported by host collaborators
//

/// Transport protocol of an observed socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// One row of the TCP connection table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpConnection {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    /// Connection state name (ESTABLISHED, LISTEN, ...)
    pub state: String,
}

/// A bound UDP socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UdpListener {
    pub local: SocketAddr,
}

/// One entry of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    /// Start time as Unix timestamp (seconds since epoch), when known
    pub start_time: Option<u64>,
    /// Resident memory in bytes
    pub memory_bytes: u64,
}

/// A change observed inside the watched directory tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

/// One failed authentication read from the auth log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub identity: String,
    pub source_address: Option<String>,
}

/// One entry read from the system log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemLogEntry {
    /// Component that wrote the entry (kernel, systemd, ...)
    pub origin: String,
    pub message: String,
    pub observed_at: SystemTime,
}

/// Errors raised during a monitor tick. The polling harness downgrades
/// each one to a Warning event; none of them stops the monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("failed to parse {what}: {input}")]
    Parse { what: &'static str, input: String },

    #[error("{0} is unavailable on this host")]
    Unavailable(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
