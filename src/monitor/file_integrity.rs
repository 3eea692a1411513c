//! File integrity monitor
//!
//! Two inputs per tick: the change events buffered by the watched tree, and
//! a stat of each protected file compared with its recorded modification
//! time. Protected files are compared by path; a protected file changing
//! triggers Critical, anything created or renamed in the tree Warning.
//!
//! The two inputs fail independently. An unwatchable tree or a failed stat
//! is reported as a Warning alongside whatever the other input detected.

use crate::constants::{DETAIL_TIMESTAMP_FORMAT, SOURCE_FILE_INTEGRITY};
use crate::models::{EventDetails, FileEvent, MonitorError, SecurityEvent};
use crate::monitor::polling::tick_failure_event;
use crate::monitor::PollingMonitor;
use crate::sources::FileTree;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const DEFAULT_PROTECTED_FILES: &[&str] = &["/etc/passwd", "/etc/shadow", "/etc/sudoers", "/etc/ssh/sshd_config"];

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

pub struct FileIntegrityMonitor {
    tree: Arc<dyn FileTree>,
    protected: Vec<PathBuf>,
    interval: Duration,
    /// Last observed mtime of each protected file that existed
    baseline: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl FileIntegrityMonitor {
    /// Build the monitor and record the current mtime of each protected file
    pub fn new(tree: Arc<dyn FileTree>, protected: impl IntoIterator<Item = PathBuf>) -> Self {
        let protected: Vec<PathBuf> = protected.into_iter().collect();
        let mut baseline = HashMap::new();
        for path in &protected {
            match tree.modified(path) {
                Ok(Some(mtime)) => {
                    baseline.insert(path.clone(), mtime);
                }
                Ok(None) => log::debug!("Protected file {} does not exist yet", path.display()),
                Err(e) => log::warn!("Cannot stat protected file {}: {}", path.display(), e),
            }
        }

        Self { tree, protected, interval: DEFAULT_INTERVAL, baseline: Mutex::new(baseline) }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn is_protected(&self, path: &Path) -> bool {
        self.protected.iter().any(|p| p == path)
    }

    fn classify_tree_event(&self, event: &FileEvent) -> Option<SecurityEvent> {
        match event {
            FileEvent::Created(path) => Some(
                SecurityEvent::warning(SOURCE_FILE_INTEGRITY, "New file created in watched directory")
                    .with_detail("FilePath", path.display().to_string()),
            ),
            FileEvent::Deleted(path) if self.is_protected(path) => Some(
                SecurityEvent::critical(SOURCE_FILE_INTEGRITY, "Critical system file deleted")
                    .with_detail("FilePath", path.display().to_string()),
            ),
            FileEvent::Renamed { from, to } => {
                let event = if self.is_protected(from) {
                    SecurityEvent::critical(SOURCE_FILE_INTEGRITY, "Critical system file renamed")
                } else {
                    SecurityEvent::warning(SOURCE_FILE_INTEGRITY, "File renamed in watched directory")
                };
                Some(
                    event
                        .with_detail("OldPath", from.display().to_string())
                        .with_detail("NewPath", to.display().to_string()),
                )
            }
            // Protected modifications are caught by the mtime comparison
            FileEvent::Modified(_) | FileEvent::Deleted(_) => None,
        }
    }
}

fn format_mtime(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format(MODIFIED_FORMAT).to_string()
}

impl PollingMonitor for FileIntegrityMonitor {
    fn name(&self) -> &'static str {
        SOURCE_FILE_INTEGRITY
    }

    fn description(&self) -> &'static str {
        "File integrity monitoring"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn describe(&self) -> EventDetails {
        let mut details = EventDetails::new();
        details.insert("WatchedDirectory", self.tree.root().display().to_string());
        details.insert("ProtectedFiles", self.protected.len().to_string());
        details
    }

    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError> {
        let mut failures = Vec::new();

        // Stat before draining: drained tree events must survive a failed stat
        let mut observed = Vec::with_capacity(self.protected.len());
        for path in &self.protected {
            match self.tree.modified(path) {
                Ok(current) => observed.push((path, current)),
                Err(e) => failures.push(format!("{}: {}", path.display(), e)),
            }
        }

        let tree_events = match self.tree.drain_events() {
            Ok(events) => events,
            Err(e) => {
                failures.push(format!("{}: {}", self.tree.root().display(), e));
                Vec::new()
            }
        };

        let mut changed = Vec::new();
        {
            let mut baseline = self.baseline.lock();
            for (path, current) in observed {
                match current {
                    Some(mtime) => {
                        if let Some(previous) = baseline.insert(path.clone(), mtime) {
                            if previous != mtime {
                                changed.push((path, previous, mtime));
                            }
                        }
                    }
                    None => {
                        baseline.remove(path);
                    }
                }
            }
        }

        let mut events: Vec<SecurityEvent> = tree_events
            .iter()
            .filter_map(|event| self.classify_tree_event(event))
            .collect();

        for (path, previous, current) in changed {
            events.push(
                SecurityEvent::critical(SOURCE_FILE_INTEGRITY, "Critical system file modified")
                    .with_detail("FilePath", path.display().to_string())
                    .with_detail("PreviousModified", format_mtime(previous))
                    .with_detail("NewModified", format_mtime(current))
                    .with_detail("DetectedAt", Local::now().format(DETAIL_TIMESTAMP_FORMAT).to_string()),
            );
        }

        if !failures.is_empty() {
            let error = failures.join("; ");
            log::warn!("{} check incomplete: {}", self.name(), error);
            events.push(tick_failure_event(self, error));
        }

        Ok(events)
    }
}
