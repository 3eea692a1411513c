//! Process table via sysinfo

use crate::models::{MonitorError, ProcessEntry};
use crate::sources::ProcessSource;
use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug, Default)]
pub struct SysinfoProcessSource;

impl SysinfoProcessSource {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSource for SysinfoProcessSource {
    fn processes(&self) -> Result<Vec<ProcessEntry>, MonitorError> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let entries = system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let start_time = process.start_time();
                ProcessEntry {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().to_string(),
                    start_time: (start_time > 0).then_some(start_time),
                    memory_bytes: process.memory(),
                }
            })
            .collect::<Vec<_>>();

        if entries.is_empty() {
            return Err(MonitorError::Unavailable("process table".to_string()));
        }
        Ok(entries)
    }
}
