//! Polling monitors
//!
//! Every monitor implements [`PollingMonitor`]: a tick queries a host
//! source, diffs it against the monitor's private state, merges the new
//! observations and classifies what changed into security events. The
//! [`polling`] harness owns the timer and turns tick failures into Warning
//! events.

pub mod file_integrity;
pub mod login;
pub mod network;
pub mod polling;
pub mod process;
pub mod process_tracker;
pub mod system_events;

use crate::models::{EventDetails, MonitorError, SecurityEvent};
use std::time::Duration;

pub use file_integrity::FileIntegrityMonitor;
pub use login::LoginAttemptMonitor;
pub use network::NetworkMonitor;
pub use polling::{run_tick, MonitorHandle, Ticker};
pub use process::ProcessMonitor;
pub use process_tracker::ProcessTracker;
pub use system_events::SystemEventMonitor;

/// Contract shared by the five monitors.
///
/// Implementations keep their diff state behind their own lock and must not
/// hold it while querying their source.
pub trait PollingMonitor: Send + Sync + 'static {
    /// Component name used as the event source
    fn name(&self) -> &'static str;

    /// Human label, e.g. "Network monitoring"
    fn description(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Extra details for the initialization event
    fn describe(&self) -> EventDetails {
        EventDetails::new()
    }

    /// One check. Called by at most one thread at a time.
    fn tick(&self) -> Result<Vec<SecurityEvent>, MonitorError>;
}
