//! Login attempt monitor: failed authentications and brute-force escalation

use crate::constants::SOURCE_LOGIN;
use crate::models::{EventDetails, MonitorError, SecurityEvent};
use crate::monitor::PollingMonitor;
use crate::sources::AuthLogSource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Failures per identity at which a Critical is raised
pub const DEFAULT_BRUTE_FORCE_THRESHOLD: u32 = 5;

pub struct LoginAttemptMonitor {
    source: Arc<dyn AuthLogSource>,
    threshold: u32,
    interval: Duration,
    /// Failures per identity since the agent started; never reset
    attempts: Mutex<HashMap<String, u32>>,
}

impl LoginAttemptMonitor {
    pub fn new(source: Arc<dyn AuthLogSource>) -> Self {
        Self {
            source,
            threshold: DEFAULT_BRUTE_FORCE_THRESHOLD,
            interval: DEFAULT_INTERVAL,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn attempts_for(&self, identity: &str) -> u32 {
        self.attempts.lock().get(identity).copied().unwrap_or(0)
    }
}

impl PollingMonitor for LoginAttemptMonitor {
    fn name(&self) -> &'static str {
        SOURCE_LOGIN
    }

    fn description(&self) -> &'static str {
        "Login attempt monitoring"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn describe(&self) -> EventDetails {
        let mut details = EventDetails::new();
        details.insert("BruteForceThreshold", self.threshold.to_string());
        details
    }

    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError> {
        let failures = self.source.failures_since_last_poll()?;
        if failures.is_empty() {
            return Ok(Vec::new());
        }

        // Count under the lock, build events after releasing it
        let counted: Vec<_> = {
            let mut attempts = self.attempts.lock();
            failures
                .into_iter()
                .map(|failure| {
                    let count = attempts.entry(failure.identity.clone()).or_insert(0);
                    *count = count.saturating_add(1);
                    (failure, *count)
                })
                .collect()
        };

        Ok(counted
            .into_iter()
            .map(|(failure, count)| {
                let event = if count >= self.threshold {
                    SecurityEvent::critical(SOURCE_LOGIN, "Possible brute force attack detected")
                } else {
                    SecurityEvent::warning(SOURCE_LOGIN, "Failed login attempt detected")
                };
                let event = event
                    .with_detail("Username", failure.identity)
                    .with_detail("AttemptCount", count.to_string());
                match failure.source_address {
                    Some(address) => event.with_detail("SourceIP", address),
                    None => event,
                }
            })
            .collect())
    }
}
