//! Host collaborators
//!
//! Monitors never touch the OS directly. Each one queries a source trait
//! defined here; the submodules provide the host implementations used by
//! the agent, and tests substitute their own.

pub mod files;
pub mod logtail;
pub mod procnet;
pub mod processes;

use crate::models::{
    AuthFailure, FileEvent, MonitorError, ProcessEntry, SystemLogEntry, TcpConnection, UdpListener,
};
use std::path::Path;
use std::time::SystemTime;

pub use files::NotifyFileTree;
pub use logtail::{AuthLogTail, SystemLogTail};
pub use procnet::ProcNetSource;
pub use processes::SysinfoProcessSource;

/// Live socket tables
pub trait NetworkSource: Send + Sync {
    fn tcp_connections(&self) -> Result<Vec<TcpConnection>, MonitorError>;
    fn udp_listeners(&self) -> Result<Vec<UdpListener>, MonitorError>;
}

/// Running processes
pub trait ProcessSource: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessEntry>, MonitorError>;
}

/// A watched directory tree
pub trait FileTree: Send + Sync {
    fn root(&self) -> &Path;

    /// Changes observed since the previous call
    fn drain_events(&self) -> Result<Vec<FileEvent>, MonitorError>;

    /// Current modification time, `None` when the file does not exist
    fn modified(&self, path: &Path) -> Result<Option<SystemTime>, MonitorError>;
}

/// Failed authentications
pub trait AuthLogSource: Send + Sync {
    fn failures_since_last_poll(&self) -> Result<Vec<AuthFailure>, MonitorError>;
}

/// System log entries
pub trait SystemLogSource: Send + Sync {
    fn entries_since_last_poll(&self) -> Result<Vec<SystemLogEntry>, MonitorError>;
}

/// Whether the agent runs with elevated privileges
pub trait PrivilegeCheck: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Effective-uid check on unix; other platforms report non-elevated
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPrivilege;

impl PrivilegeCheck for HostPrivilege {
    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    #[cfg(not(unix))]
    fn is_elevated(&self) -> bool {
        false
    }
}
