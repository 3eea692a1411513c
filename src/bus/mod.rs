//! Event bus: the hub every monitor and the threat cache publish into
//!
//! - `log_event` is safe from any thread and never touches the disk; it only
//!   pushes onto an in-memory queue (and prints Warning+ events to stdout)
//! - a flush cycle drains the queue on its own timer and appends each
//!   event's record to the per-run log file, in enqueue order
//! - events that could not be written stay retained, in order, and are
//!   written ahead of newer events on the next flush

use crate::constants::{AGENT_VERSION, GIT_HASH, SOURCE_AGENT};
use crate::models::SecurityEvent;
use crate::monitor::polling::Ticker;
use crate::output::{format_console_line, format_record, log_file_name};
use crate::sources::{HostPrivilege, PrivilegeCheck};
use chrono::Local;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default period of the flush cycle
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

pub struct EventBus {
    log_dir: PathBuf,
    log_path: PathBuf,
    flush_interval: Duration,
    console: bool,
    privilege: Arc<dyn PrivilegeCheck>,
    run_id: Uuid,
    /// Events awaiting the next flush. Held only for push/drain.
    queue: Mutex<VecDeque<SecurityEvent>>,
    /// Serializes disk writes; owns events dequeued but not yet written
    sink: Mutex<VecDeque<SecurityEvent>>,
    lifecycle: Mutex<Lifecycle>,
    written: AtomicU64,
}

enum Lifecycle {
    Idle,
    Running(Ticker),
    Stopped,
}

pub struct EventBusBuilder {
    log_dir: PathBuf,
    flush_interval: Duration,
    console: bool,
    privilege: Arc<dyn PrivilegeCheck>,
}

impl EventBusBuilder {
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Print Warning and Critical events to stdout at enqueue time
    pub fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    pub fn privilege(mut self, privilege: Arc<dyn PrivilegeCheck>) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn build(self) -> EventBus {
        let log_path = self.log_dir.join(log_file_name(Local::now()));
        EventBus {
            log_dir: self.log_dir,
            log_path,
            flush_interval: self.flush_interval,
            console: self.console,
            privilege: self.privilege,
            run_id: Uuid::new_v4(),
            queue: Mutex::new(VecDeque::new()),
            sink: Mutex::new(VecDeque::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
            written: AtomicU64::new(0),
        }
    }
}

impl EventBus {
    pub fn builder(log_dir: impl AsRef<Path>) -> EventBusBuilder {
        EventBusBuilder {
            log_dir: log_dir.as_ref().to_path_buf(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            console: true,
            privilege: Arc::new(HostPrivilege),
        }
    }

    /// Path of this run's log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of events written to the log file so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Enqueue an event. Never blocks on I/O.
    pub fn log_event(&self, mut event: SecurityEvent) {
        if event.timestamp.is_none() {
            event.timestamp = Some(Local::now());
        }

        // Console escalation is best-effort; lines from concurrent callers may interleave
        if self.console && event.severity.escalates() {
            println!("{}", format_console_line(&event));
        }

        self.queue.lock().push_back(event);
    }

    /// Events not yet written: retained ones first, then the queue
    pub fn queued(&self) -> Vec<SecurityEvent> {
        let sink = self.sink.lock();
        let queue = self.queue.lock();
        sink.iter().chain(queue.iter()).cloned().collect()
    }

    /// Drain the queue into the log file. Returns the number of events
    /// written. On error, every event not yet written is kept for the next
    /// flush in its original position.
    pub fn flush(&self) -> io::Result<usize> {
        let mut pending = self.sink.lock();
        pending.extend(self.queue.lock().drain(..));
        if pending.is_empty() {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        let mut end = file.metadata()?.len();

        let mut count = 0;
        while let Some(event) = pending.front() {
            end = append_record(&mut file, end, format_record(event).as_bytes())?;
            pending.pop_front();
            count += 1;
            self.written.fetch_add(1, Ordering::Relaxed);
        }

        log::debug!("Flushed {} events to {}", count, self.log_path.display());
        Ok(count)
    }

    fn flush_and_report(&self) {
        if let Err(e) = self.flush() {
            eprintln!("❌ Error writing to log file: {}", e);
            log::error!(
                "Flush to {} failed, {} events retained: {}",
                self.log_path.display(),
                self.sink.lock().len(),
                e
            );
        }
    }

    /// Create the log directory, announce startup and begin the flush cycle.
    /// Idempotent while running. Must be called within a Tokio runtime.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::Running(_)) {
            return Ok(());
        }

        std::fs::create_dir_all(&self.log_dir)?;

        self.log_event(
            SecurityEvent::info(SOURCE_AGENT, "Starting security monitoring system")
                .with_detail("Version", AGENT_VERSION)
                .with_detail("Build", GIT_HASH)
                .with_detail("OS", os_description())
                .with_detail("Host", sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()))
                .with_detail("RunId", self.run_id.to_string())
                .with_detail("LogFile", self.log_path.display().to_string()),
        );

        if !self.privilege.is_elevated() {
            self.log_event(
                SecurityEvent::warning(SOURCE_AGENT, "Application is not running with administrator privileges")
                    .with_detail("Impact", "Some security features may not function properly"),
            );
        }

        // Weak so the ticker does not keep the bus alive
        let bus = Arc::downgrade(self);
        let ticker = Ticker::spawn("EventBusFlush", self.flush_interval, self.flush_interval, move || {
            if let Some(bus) = bus.upgrade() {
                bus.flush_and_report();
            }
        });

        *lifecycle = Lifecycle::Running(ticker);
        Ok(())
    }

    /// Stop the flush cycle, record the shutdown and flush everything
    /// enqueued so far. Idempotent.
    ///
    /// A monitor tick still in flight may enqueue events after this returns;
    /// those are not written. Draining is best-effort, not strict.
    pub fn stop(&self) {
        let ticker = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(ticker) => ticker,
                other => {
                    *lifecycle = other;
                    return;
                }
            }
        };
        ticker.stop();

        // Counted before the shutdown record itself is written
        let total = self.written() + self.queued().len() as u64 + 1;
        self.log_event(
            SecurityEvent::info(SOURCE_AGENT, "Event log closed")
                .with_detail("EventsRecorded", total.to_string()),
        );
        self.flush_and_report();
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }
}

/// Truncation back to a known length, so a failed append leaves no
/// fragment behind
trait Rewind {
    fn rewind_to(&mut self, len: u64) -> io::Result<()>;
}

impl Rewind for File {
    fn rewind_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Append one whole record at `end`. On a failed or short write the output
/// is cut back to `end`, so the retried record starts on a record boundary.
/// Returns the new end.
fn append_record<W: Write + Rewind>(out: &mut W, end: u64, record: &[u8]) -> io::Result<u64> {
    if let Err(e) = out.write_all(record) {
        if let Err(rewind) = out.rewind_to(end) {
            log::error!("Cannot remove partial record: {}", rewind);
        }
        return Err(e);
    }
    Ok(end + record.len() as u64)
}

fn os_description() -> String {
    sysinfo::System::long_os_version()
        .or_else(sysinfo::System::name)
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    struct Elevated(bool);

    impl PrivilegeCheck for Elevated {
        fn is_elevated(&self) -> bool {
            self.0
        }
    }

    fn quiet_bus(dir: &Path) -> EventBus {
        EventBus::builder(dir).console(false).build()
    }

    #[test]
    fn test_log_event_stamps_missing_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let bus = quiet_bus(dir.path());

        bus.log_event(SecurityEvent::info("Test", "unstamped"));
        assert!(bus.queued()[0].timestamp.is_some());
    }

    #[test]
    fn test_log_event_keeps_explicit_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let bus = quiet_bus(dir.path());
        let when = Local::now() - chrono::Duration::hours(2);

        bus.log_event(SecurityEvent::info("Test", "stamped").at(when));
        assert_eq!(bus.queued()[0].timestamp, Some(when));
    }

    #[test]
    fn test_flush_writes_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let bus = quiet_bus(dir.path());

        for i in 0..5 {
            bus.log_event(SecurityEvent::info("Test", format!("event {}", i)));
        }
        assert_eq!(bus.flush().unwrap(), 5);
        assert!(bus.queued().is_empty());

        let content = std::fs::read_to_string(bus.log_path()).unwrap();
        let positions: Vec<usize> = (0..5)
            .map(|i| content.find(&format!("event {}", i)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_empty_flush_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let bus = quiet_bus(dir.path());

        assert_eq!(bus.flush().unwrap(), 0);
        assert!(!bus.log_path().exists());
    }

    #[test]
    fn test_failed_flush_retains_events_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-created-yet");
        let bus = quiet_bus(&missing);

        bus.log_event(SecurityEvent::warning("Test", "first"));
        bus.log_event(SecurityEvent::critical("Test", "second"));
        assert!(bus.flush().is_err());

        // Nothing lost, order kept, newer events queue behind retained ones
        bus.log_event(SecurityEvent::info("Test", "third"));
        let queued: Vec<String> = bus.queued().into_iter().map(|e| e.message).collect();
        assert_eq!(queued, vec!["first", "second", "third"]);

        std::fs::create_dir_all(&missing).unwrap();
        assert_eq!(bus.flush().unwrap(), 3);

        let content = std::fs::read_to_string(bus.log_path()).unwrap();
        let first = content.find("first").unwrap();
        let second = content.find("second").unwrap();
        let third = content.find("third").unwrap();
        assert!(first < second && second < third);
        assert_eq!(bus.written(), 3);
    }

    /// Accepts a fixed number of bytes, then fails like a full disk
    struct FullDisk {
        data: Vec<u8>,
        capacity: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity.saturating_sub(self.data.len());
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
            }
            let n = room.min(buf.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Rewind for FullDisk {
        fn rewind_to(&mut self, len: u64) -> io::Result<()> {
            self.data.truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_short_write_leaves_no_partial_record() {
        let first = format_record(&SecurityEvent::info("Test", "fits"));
        let second = format_record(&SecurityEvent::critical("Test", "does not fit").with_detail("Key", "value"));
        let mut disk = FullDisk { data: Vec::new(), capacity: first.len() + 10 };

        let end = append_record(&mut disk, 0, first.as_bytes()).unwrap();
        assert!(append_record(&mut disk, end, second.as_bytes()).is_err());
        assert_eq!(disk.data, first.as_bytes());

        // Room freed: the retry lands on a record boundary
        disk.capacity = usize::MAX;
        let end = append_record(&mut disk, end, second.as_bytes()).unwrap();
        assert_eq!(end as usize, first.len() + second.len());
        assert_eq!(String::from_utf8(disk.data).unwrap(), format!("{}{}", first, second));
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let bus = quiet_bus(dir.path());
        bus.stop();
        assert!(bus.queued().is_empty());
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn test_start_warns_when_not_elevated() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(
            EventBus::builder(dir.path().join("logs"))
                .console(false)
                .privilege(Arc::new(Elevated(false)))
                .build(),
        );

        bus.start().unwrap();
        bus.start().unwrap();

        let queued = bus.queued();
        // Second start is a no-op
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].message, "Starting security monitoring system");
        assert!(queued[0].details.get("Version").is_some());
        assert!(queued[0].details.get("OS").is_some());
        assert_eq!(queued[1].severity, Severity::Warning);

        bus.stop();
        bus.stop();
        assert!(bus.queued().is_empty());
        let content = std::fs::read_to_string(bus.log_path()).unwrap();
        assert_eq!(content.matches("Event log closed").count(), 1);
    }

    #[tokio::test]
    async fn test_start_without_warning_when_elevated() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(
            EventBus::builder(dir.path())
                .console(false)
                .privilege(Arc::new(Elevated(true)))
                .build(),
        );

        bus.start().unwrap();
        assert!(bus.queued().iter().all(|e| e.severity == Severity::Info));
        bus.stop();
    }

    #[tokio::test]
    async fn test_flush_cycle_runs_on_timer() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(
            EventBus::builder(dir.path())
                .console(false)
                .privilege(Arc::new(Elevated(true)))
                .flush_interval(Duration::from_millis(20))
                .build(),
        );

        bus.start().unwrap();
        bus.log_event(SecurityEvent::info("Test", "timed"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(bus.queued().is_empty());
        let content = std::fs::read_to_string(bus.log_path()).unwrap();
        assert!(content.contains("timed"));
        bus.stop();
    }
}
