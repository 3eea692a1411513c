//! Periodic scheduling shared by every timed activity in the agent
//!
//! Monitors, the event bus flush and the threat feed refresh all run on a
//! [`Ticker`]: one Tokio task per activity that waits for its interval, runs
//! the work on a blocking worker and awaits it before waiting again. An
//! activity therefore never overlaps itself, while different activities run
//! concurrently. Stopping a ticker prevents future runs only; a run already
//! in flight completes normally.

use crate::bus::EventBus;
use crate::constants::SOURCE_AGENT;
use crate::models::SecurityEvent;
use crate::monitor::PollingMonitor;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Handle to a periodic activity
pub struct Ticker {
    name: String,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Ticker {
    /// Run `work` every `period`, first after `first_delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, first_delay: Duration, work: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let work = Arc::new(work);
        let (shutdown, mut stop_rx) = watch::channel(false);
        let task_name = name.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + first_delay, period);
            // A slow run swallows the firings it overlapped instead of bursting afterwards
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }

                let work = Arc::clone(&work);
                if let Err(e) = tokio::task::spawn_blocking(move || work()).await {
                    log::warn!("{} run did not complete: {}", task_name, e);
                }
            }
            log::debug!("{} ticker stopped", task_name);
        });

        Self { name, shutdown, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prevent further runs. Idempotent.
    pub fn stop(&self) {
        // Err only means the task already exited
        let _ = self.shutdown.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the scheduling task, including any in-flight run
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            log::warn!("{} ticker task failed: {}", self.name, e);
        }
    }
}

/// A polling monitor bound to the event bus and running on its own ticker
pub struct MonitorHandle {
    monitor: Arc<dyn PollingMonitor>,
    ticker: Ticker,
}

impl MonitorHandle {
    /// Announce the monitor on the bus and start its timer. The first tick
    /// runs one full interval after start.
    pub fn start(monitor: Arc<dyn PollingMonitor>, bus: Arc<EventBus>) -> Self {
        bus.log_event(initialized_event(monitor.as_ref()));

        let interval = monitor.interval();
        let tick_monitor = Arc::clone(&monitor);
        let ticker = Ticker::spawn(monitor.name(), interval, interval, move || {
            run_tick(tick_monitor.as_ref(), &bus);
        });

        Self { monitor, ticker }
    }

    pub fn name(&self) -> &'static str {
        self.monitor.name()
    }

    pub fn stop(&self) {
        self.ticker.stop();
    }

    pub async fn join(self) {
        self.ticker.join().await;
    }
}

/// Execute one tick and publish its outcome. Errors and panics inside the
/// tick become a single Warning event naming the monitor.
///
/// Returns the number of events published.
pub fn run_tick(monitor: &dyn PollingMonitor, bus: &EventBus) -> usize {
    let outcome = catch_unwind(AssertUnwindSafe(|| monitor.tick()));

    let error = match outcome {
        Ok(Ok(events)) => {
            let count = events.len();
            for event in events {
                bus.log_event(event);
            }
            return count;
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic.as_ref()),
    };

    log::warn!("{} tick failed: {}", monitor.name(), error);
    bus.log_event(tick_failure_event(monitor, error));
    1
}

/// Warning published for a failed check of `monitor`
pub fn tick_failure_event(monitor: &dyn PollingMonitor, error: impl Into<String>) -> SecurityEvent {
    SecurityEvent::warning(
        monitor.name(),
        format!("Error during {} check", monitor.description().to_lowercase()),
    )
    .with_detail("Monitor", monitor.name())
    .with_detail("Error", error)
}

fn initialized_event(monitor: &dyn PollingMonitor) -> SecurityEvent {
    SecurityEvent::info(monitor.name(), format!("{} initialized", monitor.description()))
        .with_detail("ScanInterval", format_interval(monitor.interval()))
        .with_details(monitor.describe())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Human form of an interval: "30 seconds", "5 minutes", "6 hours"
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    if secs == 0 {
        format!("{} ms", interval.as_millis())
    } else if secs % 3600 == 0 {
        plural(secs / 3600, "hour")
    } else if secs % 60 == 0 {
        plural(secs / 60, "minute")
    } else {
        plural(secs, "second")
    }
}

/// Agent-level event announcing that every component is up
pub fn all_initialized_event(monitor_count: usize) -> SecurityEvent {
    SecurityEvent::info(SOURCE_AGENT, "All monitoring components initialized")
        .with_detail("MonitorCount", monitor_count.to_string())
}
