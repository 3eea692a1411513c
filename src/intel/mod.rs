//! Threat intelligence cache
//!
//! Holds the set of flagged addresses consulted by the network monitor.
//! Readers take a short read lock on an `Arc` to the current set; a refresh
//! downloads and parses the feed with no lock held, then swaps in a fully
//! built set under the write lock. A reader therefore sees either the old set
//! or the new one, never a mix.

use crate::bus::EventBus;
use crate::constants::{FEED_TIMEOUT_SECS, SOURCE_THREAT_INTEL};
use crate::models::SecurityEvent;
use crate::monitor::polling::Ticker;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Known-bad addresses available before the first refresh
pub const DEFAULT_BOOTSTRAP: &[&str] = &[
    "45.155.205.233",  // known attacker
    "185.220.101.134", // Tor exit node
    "91.219.236.222",  // malware C2
];

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Errors from a threat feed download
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] Box<ureq::Error>),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),

    #[error("response is not a JSON array of strings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of address strings
pub trait ThreatFeed: Send + Sync {
    fn fetch(&self) -> Result<Vec<String>, FeedError>;
}

/// Downloads a JSON array of address strings over HTTP
pub struct HttpThreatFeed {
    url: String,
    timeout: Duration,
}

impl HttpThreatFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), timeout: Duration::from_secs(FEED_TIMEOUT_SECS) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ThreatFeed for HttpThreatFeed {
    fn fetch(&self) -> Result<Vec<String>, FeedError> {
        let response = ureq::get(&self.url)
            .timeout(self.timeout)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => FeedError::Status(code),
                other => FeedError::Http(Box::new(other)),
            })?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(FeedError::Status(status));
        }

        let body = response.into_string()?;
        Ok(serde_json::from_str::<Vec<String>>(&body)?)
    }
}

/// A fixed list, for hosts without feed access
pub struct StaticFeed {
    addresses: Vec<String>,
}

impl StaticFeed {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }
}

impl ThreatFeed for StaticFeed {
    fn fetch(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.addresses.clone())
    }
}

pub struct ThreatIntelCache {
    feed: Arc<dyn ThreatFeed>,
    bus: Arc<EventBus>,
    addresses: RwLock<Arc<HashSet<IpAddr>>>,
    refresher: Mutex<Option<Ticker>>,
}

impl ThreatIntelCache {
    pub fn new(
        feed: Arc<dyn ThreatFeed>,
        bootstrap: impl IntoIterator<Item = IpAddr>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            feed,
            bus,
            addresses: RwLock::new(Arc::new(bootstrap.into_iter().collect())),
            refresher: Mutex::new(None),
        }
    }

    pub fn is_suspicious(&self, address: &IpAddr) -> bool {
        self.addresses.read().contains(address)
    }

    /// The current set as one consistent view
    pub fn snapshot(&self) -> Arc<HashSet<IpAddr>> {
        Arc::clone(&*self.addresses.read())
    }

    pub fn len(&self) -> usize {
        self.addresses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Download the feed and replace the set. On failure the current set is
    /// kept and a single Warning event is published; nothing is retried
    /// until the next scheduled refresh.
    pub fn refresh(&self) -> Result<usize, FeedError> {
        let fetched = match self.feed.fetch() {
            Ok(list) => list,
            Err(e) => {
                log::warn!("Threat feed refresh failed: {}", e);
                self.bus.log_event(
                    SecurityEvent::warning(SOURCE_THREAT_INTEL, "Error updating threat feed")
                        .with_detail("Error", e.to_string()),
                );
                return Err(e);
            }
        };

        let next: HashSet<IpAddr> = fetched
            .iter()
            .filter_map(|s| s.trim().parse::<IpAddr>().ok())
            .collect();
        let count = next.len();
        let skipped = fetched.len() - count;

        *self.addresses.write() = Arc::new(next);

        log::debug!("Threat feed refreshed: {} addresses, {} entries skipped", count, skipped);
        self.bus.log_event(
            SecurityEvent::info(SOURCE_THREAT_INTEL, "Threat feed updated successfully")
                .with_detail("IPCount", count.to_string()),
        );
        Ok(count)
    }

    /// Begin periodic refreshes. Idempotent while running.
    pub fn start(self: &Arc<Self>, interval: Duration, refresh_on_start: bool) {
        let mut refresher = self.refresher.lock();
        if refresher.is_some() {
            return;
        }

        let first_delay = if refresh_on_start { Duration::ZERO } else { interval };
        let cache = Arc::downgrade(self);
        *refresher = Some(Ticker::spawn("ThreatFeedRefresh", interval, first_delay, move || {
            if let Some(cache) = cache.upgrade() {
                // Failures are already reported on the bus
                let _ = cache.refresh();
            }
        }));
    }

    /// Cancel future refreshes. Idempotent.
    pub fn stop(&self) {
        if let Some(ticker) = self.refresher.lock().take() {
            ticker.stop();
        }
    }
}

/// Parse the configured bootstrap list
pub fn parse_bootstrap<S: AsRef<str>>(entries: &[S]) -> Result<Vec<IpAddr>, std::net::AddrParseError> {
    entries.iter().map(|s| s.as_ref().trim().parse()).collect()
}
