//! Event bus ordering, record format and shutdown behavior

mod helpers;

use chrono::{Local, TimeZone};
use helpers::{quiet_bus, record_headers};
use hostwatch::models::SecurityEvent;
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_producers_keep_per_producer_order() {
    let dir = tempfile::tempdir().unwrap();
    let bus = quiet_bus(dir.path());

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for seq in 0..50 {
                    bus.log_event(SecurityEvent::info(format!("P{}", producer), format!("seq {:03}", seq)));
                }
            })
        })
        .collect();

    // Flush concurrently with the producers
    for _ in 0..10 {
        bus.flush().unwrap();
        thread::yield_now();
    }
    for producer in producers {
        producer.join().unwrap();
    }
    bus.flush().unwrap();

    let content = std::fs::read_to_string(bus.log_path()).unwrap();
    let headers = record_headers(&content);
    assert_eq!(headers.len(), 200);

    for producer in 0..4 {
        let tag = format!("P{} - ", producer);
        let seqs: Vec<&str> = headers
            .iter()
            .filter_map(|h| h.split_once(&tag).map(|(_, msg)| msg))
            .collect();
        let expected: Vec<String> = (0..50).map(|seq| format!("seq {:03}", seq)).collect();
        assert_eq!(seqs, expected, "producer {} out of order", producer);
    }
}

#[test]
fn test_record_layout_in_file() {
    let dir = tempfile::tempdir().unwrap();
    let bus = quiet_bus(dir.path());
    let when = Local.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();

    bus.log_event(
        SecurityEvent::critical("NetworkMonitor", "Connection to known malicious IP detected")
            .with_detail("RemoteEndpoint", "203.0.113.9:443")
            .with_detail("Protocol", "TCP")
            .at(when),
    );
    bus.flush().unwrap();

    let content = std::fs::read_to_string(bus.log_path()).unwrap();
    assert_eq!(
        content,
        "[2026-10-18 09:30:00.000] [Critical] NetworkMonitor - Connection to known malicious IP detected\n\
         \tRemoteEndpoint: 203.0.113.9:443\n\
         \tProtocol: TCP\n\
         \n"
    );
}

#[test]
fn test_log_file_name_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let bus = quiet_bus(dir.path());
    let name = bus.log_path().file_name().unwrap().to_string_lossy().to_string();

    let pattern = regex::Regex::new(r"^SecurityLog_\d{8}_\d{6}\.log$").unwrap();
    assert!(pattern.is_match(&name), "unexpected log file name {}", name);
    assert_eq!(bus.log_path().parent().unwrap(), dir.path());
}

#[tokio::test]
async fn test_stop_flushes_everything_with_shutdown_record_last() {
    let dir = tempfile::tempdir().unwrap();
    let bus = quiet_bus(&dir.path().join("nested").join("logs"));

    bus.start().unwrap();
    for i in 0..10 {
        bus.log_event(SecurityEvent::warning("Test", format!("pending {}", i)));
    }
    bus.stop();

    assert!(bus.queued().is_empty());
    let content = std::fs::read_to_string(bus.log_path()).unwrap();
    let headers = record_headers(&content);

    assert!(headers[0].contains("Starting security monitoring system"));
    assert!(headers.last().unwrap().contains("Event log closed"));
    assert_eq!(headers.iter().filter(|h| h.contains("pending")).count(), 10);
    assert!(content.contains("\tEventsRecorded: 12\n"));
}

#[tokio::test]
async fn test_events_after_stop_stay_queued() {
    let dir = tempfile::tempdir().unwrap();
    let bus = quiet_bus(dir.path());

    bus.start().unwrap();
    bus.stop();
    bus.log_event(SecurityEvent::info("Late", "after stop"));

    assert_eq!(bus.queued().len(), 1);
    let content = std::fs::read_to_string(bus.log_path()).unwrap();
    assert!(!content.contains("after stop"));
}
