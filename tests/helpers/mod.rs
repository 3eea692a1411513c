//! Fake host sources shared by the integration tests
#![allow(dead_code)]

use hostwatch::bus::EventBus;
use hostwatch::daemon::Sources;
use hostwatch::intel::{FeedError, ThreatFeed};
use hostwatch::models::{
    AuthFailure, FileEvent, MonitorError, ProcessEntry, SecurityEvent, SystemLogEntry, TcpConnection, UdpListener,
};
use hostwatch::sources::{
    AuthLogSource, FileTree, NetworkSource, PrivilegeCheck, ProcessSource, SystemLogSource,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Default)]
pub struct FakeNetwork {
    pub tcp: Mutex<Vec<TcpConnection>>,
    pub udp: Mutex<Vec<UdpListener>>,
}

impl FakeNetwork {
    pub fn connect(&self, local: &str, remote: &str) {
        self.tcp.lock().push(TcpConnection {
            local: local.parse().unwrap(),
            remote: remote.parse().unwrap(),
            state: "ESTABLISHED".to_string(),
        });
    }
}

impl NetworkSource for FakeNetwork {
    fn tcp_connections(&self) -> Result<Vec<TcpConnection>, MonitorError> {
        Ok(self.tcp.lock().clone())
    }

    fn udp_listeners(&self) -> Result<Vec<UdpListener>, MonitorError> {
        Ok(self.udp.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeProcesses {
    pub table: Mutex<Vec<ProcessEntry>>,
}

impl FakeProcesses {
    pub fn set(&self, entries: &[(u32, &str)]) {
        *self.table.lock() = entries
            .iter()
            .map(|(pid, name)| ProcessEntry {
                pid: *pid,
                name: name.to_string(),
                start_time: Some(1_700_000_000 + *pid as u64),
                memory_bytes: 4 * 1024 * 1024,
            })
            .collect();
    }
}

impl ProcessSource for FakeProcesses {
    fn processes(&self) -> Result<Vec<ProcessEntry>, MonitorError> {
        Ok(self.table.lock().clone())
    }
}

pub struct FakeFileTree {
    pub root: PathBuf,
    pub events: Mutex<Vec<FileEvent>>,
    pub mtimes: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl FakeFileTree {
    pub fn new(root: &str) -> Self {
        Self { root: PathBuf::from(root), events: Mutex::new(Vec::new()), mtimes: Mutex::new(HashMap::new()) }
    }
}

impl FileTree for FakeFileTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn drain_events(&self) -> Result<Vec<FileEvent>, MonitorError> {
        Ok(std::mem::take(&mut *self.events.lock()))
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>, MonitorError> {
        Ok(self.mtimes.lock().get(path).copied())
    }
}

#[derive(Default)]
pub struct FakeAuthLog {
    pub pending: Mutex<Vec<AuthFailure>>,
}

impl FakeAuthLog {
    pub fn fail(&self, identity: &str, from: &str, times: usize) {
        let mut pending = self.pending.lock();
        for _ in 0..times {
            pending.push(AuthFailure { identity: identity.to_string(), source_address: Some(from.to_string()) });
        }
    }
}

impl AuthLogSource for FakeAuthLog {
    fn failures_since_last_poll(&self) -> Result<Vec<AuthFailure>, MonitorError> {
        Ok(std::mem::take(&mut *self.pending.lock()))
    }
}

#[derive(Default)]
pub struct FakeSystemLog {
    pub pending: Mutex<Vec<SystemLogEntry>>,
}

impl FakeSystemLog {
    pub fn write(&self, origin: &str, message: &str) {
        self.pending.lock().push(SystemLogEntry {
            origin: origin.to_string(),
            message: message.to_string(),
            observed_at: SystemTime::now(),
        });
    }
}

impl SystemLogSource for FakeSystemLog {
    fn entries_since_last_poll(&self) -> Result<Vec<SystemLogEntry>, MonitorError> {
        Ok(std::mem::take(&mut *self.pending.lock()))
    }
}

/// Feed that replays scripted outcomes, then repeats the last one
pub struct ScriptedFeed {
    outcomes: Mutex<VecDeque<Result<Vec<String>, u16>>>,
    last: Mutex<Result<Vec<String>, u16>>,
    pub calls: AtomicUsize,
}

impl ScriptedFeed {
    /// `Err(status)` simulates a failed download
    pub fn new(outcomes: Vec<Result<Vec<&str>, u16>>) -> Self {
        let outcomes: VecDeque<_> = outcomes
            .into_iter()
            .map(|o| o.map(|list| list.into_iter().map(str::to_string).collect()))
            .collect();
        Self { outcomes: Mutex::new(outcomes), last: Mutex::new(Err(503)), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ThreatFeed for ScriptedFeed {
    fn fetch(&self) -> Result<Vec<String>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match self.outcomes.lock().pop_front() {
            Some(next) => {
                *self.last.lock() = next.clone();
                next
            }
            None => self.last.lock().clone(),
        };
        outcome.map_err(FeedError::Status)
    }
}

pub struct FixedPrivilege(pub bool);

impl PrivilegeCheck for FixedPrivilege {
    fn is_elevated(&self) -> bool {
        self.0
    }
}

/// Handles to the fakes behind a `Sources`
pub struct FakeHost {
    pub network: Arc<FakeNetwork>,
    pub processes: Arc<FakeProcesses>,
    pub files: Arc<FakeFileTree>,
    pub auth: Arc<FakeAuthLog>,
    pub system: Arc<FakeSystemLog>,
    pub feed: Arc<ScriptedFeed>,
}

impl FakeHost {
    pub fn new(feed: ScriptedFeed) -> Self {
        Self {
            network: Arc::new(FakeNetwork::default()),
            processes: Arc::new(FakeProcesses::default()),
            files: Arc::new(FakeFileTree::new("/etc")),
            auth: Arc::new(FakeAuthLog::default()),
            system: Arc::new(FakeSystemLog::default()),
            feed: Arc::new(feed),
        }
    }

    pub fn sources(&self) -> Sources {
        Sources {
            network: self.network.clone(),
            processes: self.processes.clone(),
            files: self.files.clone(),
            auth: self.auth.clone(),
            system: self.system.clone(),
            feed: self.feed.clone(),
            privilege: Arc::new(FixedPrivilege(true)),
        }
    }
}

pub fn quiet_bus(dir: &Path) -> Arc<EventBus> {
    Arc::new(
        EventBus::builder(dir)
            .console(false)
            .privilege(Arc::new(FixedPrivilege(true)))
            .build(),
    )
}

pub fn messages(events: &[SecurityEvent]) -> Vec<&str> {
    events.iter().map(|e| e.message.as_str()).collect()
}

/// Header lines of every record in a log file, in file order
pub fn record_headers(content: &str) -> Vec<&str> {
    content.lines().filter(|line| line.starts_with('[')).collect()
}
