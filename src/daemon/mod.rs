//! Agent runtime: wires the event bus, threat cache and monitors together
//!
//! This module provides:
//! - Configuration management (`config`)
//! - Diagnostic logging setup (`logging`)
//! - The [`Agent`] lifecycle and the [`run_agent`] entry used by the binary

pub mod config;
pub mod logging;

use crate::bus::EventBus;
use crate::constants::SOURCE_AGENT;
use crate::daemon::config::AgentConfiguration;
use crate::intel::{self, HttpThreatFeed, StaticFeed, ThreatFeed, ThreatIntelCache};
use crate::models::{MonitorError, SecurityEvent};
use crate::monitor::polling::all_initialized_event;
use crate::monitor::{
    FileIntegrityMonitor, LoginAttemptMonitor, MonitorHandle, NetworkMonitor, PollingMonitor, ProcessMonitor,
    SystemEventMonitor,
};
use crate::sources::{
    AuthLogSource, AuthLogTail, FileTree, HostPrivilege, NetworkSource, NotifyFileTree, PrivilegeCheck,
    ProcNetSource, ProcessSource, SysinfoProcessSource, SystemLogSource, SystemLogTail,
};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Host collaborators the agent hands to its components
#[derive(Clone)]
pub struct Sources {
    pub network: Arc<dyn NetworkSource>,
    pub processes: Arc<dyn ProcessSource>,
    pub files: Arc<dyn FileTree>,
    pub auth: Arc<dyn AuthLogSource>,
    pub system: Arc<dyn SystemLogSource>,
    pub feed: Arc<dyn ThreatFeed>,
    pub privilege: Arc<dyn PrivilegeCheck>,
}

impl Sources {
    /// The real host: procfs, sysinfo, notify, tailed logs, HTTP feed
    pub fn host(config: &AgentConfiguration) -> Result<Self, MonitorError> {
        let feed: Arc<dyn ThreatFeed> = match &config.threat_intel.feed_url {
            Some(url) => Arc::new(HttpThreatFeed::new(url.clone())),
            None => Arc::new(StaticFeed::new(config.threat_intel.bootstrap.clone())),
        };

        Ok(Self {
            network: Arc::new(ProcNetSource::new()),
            processes: Arc::new(SysinfoProcessSource::new()),
            files: Arc::new(NotifyFileTree::new(config.file_integrity.watch_root.clone())),
            auth: Arc::new(AuthLogTail::new(config.login.auth_log.clone())?),
            system: Arc::new(SystemLogTail::new(config.system_events.system_log.clone())?),
            feed,
            privilege: Arc::new(HostPrivilege),
        })
    }
}

/// Components that exist only while the agent runs
struct Running {
    bus: Arc<EventBus>,
    cache: Arc<ThreatIntelCache>,
    monitors: Vec<MonitorHandle>,
}

pub struct Agent {
    config: AgentConfiguration,
    sources: Sources,
    console: bool,
    running: Mutex<Option<Running>>,
}

impl Agent {
    pub fn new(config: AgentConfiguration, sources: Sources) -> Self {
        Self { config, sources, console: true, running: Mutex::new(None) }
    }

    /// Disable stdout escalation of Warning and Critical events
    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn config(&self) -> &AgentConfiguration {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Bus of the current run
    pub fn bus(&self) -> Option<Arc<EventBus>> {
        self.running.lock().as_ref().map(|r| Arc::clone(&r.bus))
    }

    pub fn threat_cache(&self) -> Option<Arc<ThreatIntelCache>> {
        self.running.lock().as_ref().map(|r| Arc::clone(&r.cache))
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.running.lock().as_ref().map(|r| r.bus.log_path().to_path_buf())
    }

    /// Build and start every component. Idempotent while running.
    /// Must be called within a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let bootstrap = intel::parse_bootstrap(&self.config.threat_intel.bootstrap)
            .context("Invalid threat intelligence bootstrap address")?;

        let bus = Arc::new(
            EventBus::builder(&self.config.agent.log_directory)
                .flush_interval(self.config.flush_interval())
                .console(self.console)
                .privilege(Arc::clone(&self.sources.privilege))
                .build(),
        );
        bus.start().with_context(|| {
            format!("Failed to create log directory {}", self.config.agent.log_directory.display())
        })?;

        let cache = Arc::new(ThreatIntelCache::new(Arc::clone(&self.sources.feed), bootstrap, Arc::clone(&bus)));
        cache.start(
            Duration::from_secs(self.config.threat_intel.refresh_interval_secs),
            self.config.threat_intel.refresh_on_start,
        );

        let monitors = self
            .build_monitors(&cache)
            .into_iter()
            .map(|monitor| MonitorHandle::start(monitor, Arc::clone(&bus)))
            .collect::<Vec<_>>();
        bus.log_event(all_initialized_event(monitors.len()));

        log::info!("Agent started with {} monitors, logging to {}", monitors.len(), bus.log_path().display());
        *running = Some(Running { bus, cache, monitors });
        Ok(())
    }

    fn build_monitors(&self, cache: &Arc<ThreatIntelCache>) -> Vec<Arc<dyn PollingMonitor>> {
        let config = &self.config;
        let secs = Duration::from_secs;

        let network: Arc<dyn PollingMonitor> = Arc::new(
            NetworkMonitor::new(Arc::clone(&self.sources.network), Arc::clone(cache))
                .with_interval(secs(config.network.interval_secs))
                .with_suspicious_ports(config.network.suspicious_ports.iter().copied()),
        );
        let process: Arc<dyn PollingMonitor> = Arc::new(
            ProcessMonitor::new(Arc::clone(&self.sources.processes))
                .with_interval(secs(config.process.interval_secs))
                .with_blocklist(&config.process.blocklist),
        );
        let file_integrity: Arc<dyn PollingMonitor> = Arc::new(
            FileIntegrityMonitor::new(
                Arc::clone(&self.sources.files),
                config.file_integrity.protected_files.iter().cloned(),
            )
            .with_interval(secs(config.file_integrity.interval_secs)),
        );
        let login: Arc<dyn PollingMonitor> = Arc::new(
            LoginAttemptMonitor::new(Arc::clone(&self.sources.auth))
                .with_interval(secs(config.login.interval_secs))
                .with_threshold(config.login.brute_force_threshold),
        );
        let system_events: Arc<dyn PollingMonitor> = Arc::new(
            SystemEventMonitor::new(Arc::clone(&self.sources.system))
                .with_interval(secs(config.system_events.interval_secs)),
        );

        vec![network, process, file_integrity, login, system_events]
    }

    fn take_running(&self) -> Option<Running> {
        self.running.lock().take()
    }

    /// Stop all timers, record the shutdown and close the event log.
    /// Idempotent. Ticks already in flight finish on their own; events they
    /// produce after the final flush are not written.
    pub fn stop(&self) {
        if let Some(running) = self.take_running() {
            for monitor in &running.monitors {
                monitor.stop();
            }
            Self::close(running);
        }
    }

    /// Like [`stop`](Self::stop), but waits for in-flight ticks to finish
    /// first so their events reach the log file.
    pub async fn shutdown(&self) {
        if let Some(mut running) = self.take_running() {
            for monitor in &running.monitors {
                monitor.stop();
            }
            for monitor in running.monitors.drain(..) {
                monitor.join().await;
            }
            Self::close(running);
        }
    }

    fn close(running: Running) {
        running.cache.stop();
        running
            .bus
            .log_event(SecurityEvent::info(SOURCE_AGENT, "Security monitoring stopped"));
        running.bus.stop();
        log::info!("Agent stopped, {} events recorded", running.bus.written());
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the agent on the host until Ctrl-C or SIGTERM
pub async fn run_agent(config: AgentConfiguration) -> Result<()> {
    let sources = Sources::host(&config).context("Failed to initialize host sources")?;
    let agent = Agent::new(config, sources);
    agent.start()?;

    println!("Security monitoring started. Press Ctrl+C to exit.");
    if let Some(path) = agent.log_path() {
        println!("Logs are being written to: {}", path.display());
    }

    wait_for_shutdown_signal().await;

    agent.shutdown().await;
    println!("Security monitoring stopped.");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received Ctrl-C"),
                    _ = terminate.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
