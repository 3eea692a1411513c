use crate::models::ProcessEntry;
use std::collections::HashMap;

/// Manages process state tracking between polling cycles
pub struct ProcessTracker {
    /// pid -> start time of the process last seen under that pid
    known: HashMap<u32, Option<u64>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self { known: HashMap::new() }
    }

    /// Detect new processes by comparing the current table with what was
    /// seen before. On the first call every process is new.
    ///
    /// A pid counts as new again when both start times are known and differ
    /// (pid reuse). Pids missing from the table are forgotten so a later
    /// reuse is reported.
    pub fn detect_new_processes(&mut self, table: Vec<ProcessEntry>) -> Vec<ProcessEntry> {
        let mut next = HashMap::with_capacity(table.len());
        let mut new_processes = Vec::new();

        for process in table {
            let is_new = match self.known.get(&process.pid) {
                None => true,
                Some(&Some(previous)) => process.start_time.is_some_and(|start| start != previous),
                Some(None) => false,
            };
            next.insert(process.pid, process.start_time);
            if is_new {
                new_processes.push(process);
            }
        }

        self.known = next;
        new_processes
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test ProcessEntry
    fn create_test_process(pid: u32, name: &str, start_time: Option<u64>) -> ProcessEntry {
        ProcessEntry { pid, name: name.to_string(), start_time, memory_bytes: 4096 }
    }

    // ==================== ProcessTracker::new() tests ====================

    #[test]
    fn test_new_tracker_is_empty() {
        let tracker = ProcessTracker::new();
        assert!(tracker.is_empty());
    }

    // ==================== detect_new_processes() tests ====================

    #[test]
    fn test_first_table_reports_every_process() {
        let mut tracker = ProcessTracker::new();

        let new_procs = tracker.detect_new_processes(vec![
            create_test_process(100, "sshd", Some(1_700_000_000)),
            create_test_process(101, "bash", Some(1_700_000_100)),
        ]);

        assert_eq!(new_procs.len(), 2, "First table should report all processes");
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_new_process_detected_in_second_table() {
        let mut tracker = ProcessTracker::new();
        tracker.detect_new_processes(vec![create_test_process(100, "sshd", Some(1))]);

        let new_procs = tracker.detect_new_processes(vec![
            create_test_process(100, "sshd", Some(1)),
            create_test_process(102, "vim", Some(2)),
        ]);

        assert_eq!(new_procs.len(), 1, "Should detect exactly one new process");
        assert_eq!(new_procs[0].pid, 102);
        assert_eq!(new_procs[0].name, "vim");
    }

    #[test]
    fn test_unchanged_table_reports_nothing() {
        let mut tracker = ProcessTracker::new();
        let table = vec![create_test_process(100, "sshd", Some(1)), create_test_process(101, "cron", None)];

        tracker.detect_new_processes(table.clone());
        assert!(tracker.detect_new_processes(table).is_empty());
    }

    #[test]
    fn test_terminated_process_is_pruned() {
        let mut tracker = ProcessTracker::new();
        tracker.detect_new_processes(vec![
            create_test_process(100, "sshd", Some(1)),
            create_test_process(101, "cron", Some(1)),
        ]);

        let new_procs = tracker.detect_new_processes(vec![create_test_process(101, "cron", Some(1))]);

        assert!(new_procs.is_empty(), "No new processes when one terminates");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_pid_reuse_after_exit_detected_as_new_process() {
        let mut tracker = ProcessTracker::new();
        tracker.detect_new_processes(vec![create_test_process(100, "sshd", Some(1))]);
        tracker.detect_new_processes(vec![]);

        let new_procs = tracker.detect_new_processes(vec![create_test_process(100, "nc", Some(1))]);

        assert_eq!(new_procs.len(), 1, "Reused PID should be detected as new process");
        assert_eq!(new_procs[0].name, "nc");
    }

    #[test]
    fn test_pid_reuse_between_polls_detected_by_start_time() {
        let mut tracker = ProcessTracker::new();
        tracker.detect_new_processes(vec![create_test_process(100, "sshd", Some(1_000))]);

        let new_procs = tracker.detect_new_processes(vec![create_test_process(100, "nc", Some(2_000))]);

        assert_eq!(new_procs.len(), 1);
        assert_eq!(new_procs[0].name, "nc");
    }

    #[test]
    fn test_unknown_start_time_falls_back_to_pid() {
        let mut tracker = ProcessTracker::new();
        tracker.detect_new_processes(vec![create_test_process(100, "sshd", None)]);

        assert!(tracker
            .detect_new_processes(vec![create_test_process(100, "sshd", Some(5))])
            .is_empty());
    }
}
