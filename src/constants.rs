//! Global constants for hostwatch
//!
//! Centralized location for application-wide constants

/// Agent version reported in the startup event
pub const AGENT_VERSION: &str = env!("HOSTWATCH_VERSION");

/// Commit the binary was built from
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Application directory name used under the platform config/data dirs
pub const APP_DIR_NAME: &str = "hostwatch";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "hostwatch.toml";

/// Log file name prefix; the run timestamp is appended
pub const LOG_FILE_PREFIX: &str = "SecurityLog_";

/// Timestamp layout of the log file name
pub const LOG_FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp layout of a record header line
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp layout used inside event details
pub const DETAIL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Component names carried in SecurityEvent::source
pub const SOURCE_AGENT: &str = "SecurityMonitor";
pub const SOURCE_THREAT_INTEL: &str = "ThreatIntelligenceFeed";
pub const SOURCE_NETWORK: &str = "NetworkMonitor";
pub const SOURCE_PROCESS: &str = "ProcessMonitor";
pub const SOURCE_FILE_INTEGRITY: &str = "FileIntegrityMonitor";
pub const SOURCE_LOGIN: &str = "LoginAttemptMonitor";
pub const SOURCE_SYSTEM_EVENTS: &str = "SystemEventMonitor";

/// Event bus flush interval bounds in milliseconds
pub const FLUSH_INTERVAL_MIN_MS: u64 = 100;
pub const FLUSH_INTERVAL_MAX_MS: u64 = 60_000;

/// Upper bound for any monitor or refresh interval (24 hours)
pub const POLL_INTERVAL_MAX_SECS: u64 = 86_400;

/// Timeout applied to a single threat feed download
pub const FEED_TIMEOUT_SECS: u64 = 30;

/// Substrings that mark a process name as privileged (matched lower-case)
pub const PRIVILEGED_NAME_MARKERS: &[&str] = &["admin", "root", "system", "trustedinstaller"];
