//! Configuration management for the agent
//!
//! Handles TOML configuration parsing, defaults and validation. Every field
//! has a default so an empty file (or no file) yields a working agent.

use crate::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, FLUSH_INTERVAL_MAX_MS, FLUSH_INTERVAL_MIN_MS, POLL_INTERVAL_MAX_SECS,
};
use crate::daemon::logging::LogLevel;
use crate::intel::{self, DEFAULT_BOOTSTRAP};
use crate::monitor::{file_integrity, login, network, process, system_events};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors from loading or validating a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{field} must be between {min} and {max} {unit}, got {value}")]
    OutOfRange { field: &'static str, value: u64, min: u64, max: u64, unit: &'static str },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("invalid bootstrap address '{0}'")]
    BootstrapAddress(String),

    #[error("invalid log level '{0}' (expected error, warn, info, debug or trace)")]
    LogLevel(String),

    #[error("cannot determine a {0} directory for this user")]
    NoDirectory(&'static str),

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main agent configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfiguration {
    pub agent: AgentSettings,
    pub logging: LoggingSettings,
    pub threat_intel: ThreatIntelSettings,
    pub network: NetworkSettings,
    pub process: ProcessSettings,
    pub file_integrity: FileIntegritySettings,
    pub login: LoginSettings,
    pub system_events: SystemEventSettings,
}

/// Core agent runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Directory receiving the per-run security log
    pub log_directory: PathBuf,
    /// Event bus flush interval in milliseconds (100-60000)
    pub flush_interval_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self { log_directory: default_log_directory(), flush_interval_ms: 1000 }
    }
}

/// Diagnostic logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "warn".to_string() }
    }
}

/// Threat feed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatIntelSettings {
    /// Feed endpoint; without one the bootstrap list stays in force
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    pub refresh_interval_secs: u64,
    pub refresh_on_start: bool,
    pub bootstrap: Vec<String>,
}

impl Default for ThreatIntelSettings {
    fn default() -> Self {
        Self {
            feed_url: None,
            refresh_interval_secs: intel::DEFAULT_REFRESH_INTERVAL.as_secs(),
            refresh_on_start: false,
            bootstrap: DEFAULT_BOOTSTRAP.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub interval_secs: u64,
    pub suspicious_ports: Vec<u16>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            interval_secs: network::DEFAULT_INTERVAL.as_secs(),
            suspicious_ports: network::DEFAULT_SUSPICIOUS_PORTS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub interval_secs: u64,
    pub blocklist: Vec<String>,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            interval_secs: process::DEFAULT_INTERVAL.as_secs(),
            blocklist: process::DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileIntegritySettings {
    pub interval_secs: u64,
    pub watch_root: PathBuf,
    pub protected_files: Vec<PathBuf>,
}

impl Default for FileIntegritySettings {
    fn default() -> Self {
        Self {
            interval_secs: file_integrity::DEFAULT_INTERVAL.as_secs(),
            watch_root: PathBuf::from("/etc"),
            protected_files: file_integrity::DEFAULT_PROTECTED_FILES.iter().map(PathBuf::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    pub interval_secs: u64,
    pub auth_log: PathBuf,
    pub brute_force_threshold: u32,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            interval_secs: login::DEFAULT_INTERVAL.as_secs(),
            auth_log: PathBuf::from("/var/log/auth.log"),
            brute_force_threshold: login::DEFAULT_BRUTE_FORCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemEventSettings {
    pub interval_secs: u64,
    pub system_log: PathBuf,
}

impl Default for SystemEventSettings {
    fn default() -> Self {
        Self {
            interval_secs: system_events::DEFAULT_INTERVAL.as_secs(),
            system_log: PathBuf::from("/var/log/syslog"),
        }
    }
}

/// `<data dir>/hostwatch/logs`, or `./logs` when the platform has no data dir
fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl AgentConfiguration {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Toml { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/hostwatch/hostwatch.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoDirectory("configuration"))
    }

    /// Check every value the agent depends on
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "agent.flush_interval_ms",
            self.agent.flush_interval_ms,
            FLUSH_INTERVAL_MIN_MS,
            FLUSH_INTERVAL_MAX_MS,
            "ms",
        )?;
        if self.agent.log_directory.as_os_str().is_empty() {
            return Err(ConfigError::Empty("agent.log_directory"));
        }

        self.logging
            .level
            .parse::<LogLevel>()
            .map_err(|_| ConfigError::LogLevel(self.logging.level.clone()))?;

        check_poll_interval("threat_intel.refresh_interval_secs", self.threat_intel.refresh_interval_secs)?;
        if let Some(url) = &self.threat_intel.feed_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Empty("threat_intel.feed_url"));
            }
        }
        for entry in &self.threat_intel.bootstrap {
            if entry.trim().parse::<std::net::IpAddr>().is_err() {
                return Err(ConfigError::BootstrapAddress(entry.clone()));
            }
        }

        check_poll_interval("network.interval_secs", self.network.interval_secs)?;
        check_poll_interval("process.interval_secs", self.process.interval_secs)?;
        check_poll_interval("file_integrity.interval_secs", self.file_integrity.interval_secs)?;
        check_poll_interval("login.interval_secs", self.login.interval_secs)?;
        check_poll_interval("system_events.interval_secs", self.system_events.interval_secs)?;

        if self.file_integrity.watch_root.as_os_str().is_empty() {
            return Err(ConfigError::Empty("file_integrity.watch_root"));
        }
        if self.login.brute_force_threshold == 0 {
            return Err(ConfigError::OutOfRange {
                field: "login.brute_force_threshold",
                value: 0,
                min: 1,
                max: u32::MAX as u64,
                unit: "attempts",
            });
        }

        Ok(())
    }

    /// Ensure the log directory exists
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.agent.log_directory).map_err(|source| ConfigError::CreateDir {
            path: self.agent.log_directory.clone(),
            source,
        })
    }

    /// Render as TOML, for `--check-config`
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.agent.flush_interval_ms)
    }
}

fn check_poll_interval(field: &'static str, secs: u64) -> Result<(), ConfigError> {
    check_range(field, secs, 1, POLL_INTERVAL_MAX_SECS, "seconds")
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64, unit: &'static str) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange { field, value, min, max, unit });
    }
    Ok(())
}
