//! Incremental readers for text logs (auth log, syslog)
//!
//! A [`LogTail`] remembers a byte offset. The first poll positions it at the
//! current end of the file, so history written before the agent started is
//! not replayed. A file that was replaced (new inode on unix) or is shorter
//! than the offset was rotated or truncated and is read again from the start.
//! Only complete lines are consumed.

use crate::models::{AuthFailure, MonitorError, SystemLogEntry};
use crate::sources::{AuthLogSource, SystemLogSource};
use parking_lot::Mutex;
use regex::Regex;
use std::fs::{File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub struct LogTail {
    path: PathBuf,
    position: Mutex<Option<Position>>,
}

/// Read position within one file generation
#[derive(Debug, Clone, Copy)]
struct Position {
    offset: u64,
    inode: Option<u64>,
}

#[cfg(unix)]
fn inode(meta: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn inode(_meta: &Metadata) -> Option<u64> {
    None
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), position: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines appended since the previous call
    pub fn read_new_lines(&self) -> Result<Vec<String>, MonitorError> {
        let mut file = File::open(&self.path)?;
        let meta = file.metadata()?;
        let len = meta.len();
        let current_inode = inode(&meta);

        let mut position = self.position.lock();
        let start = match *position {
            None => {
                *position = Some(Position { offset: len, inode: current_inode });
                return Ok(Vec::new());
            }
            Some(previous) if previous.inode != current_inode || previous.offset > len => 0,
            Some(previous) => previous.offset,
        };

        file.seek(SeekFrom::Start(start))?;
        let mut bytes = Vec::new();
        file.take(len - start).read_to_end(&mut bytes)?;

        // Leave a trailing partial line for the next poll
        let consumed = match bytes.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => 0,
        };
        *position = Some(Position { offset: start + consumed as u64, inode: current_inode });

        Ok(String::from_utf8_lossy(&bytes[..consumed])
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Failed logins from an sshd/sudo style auth log
pub struct AuthLogTail {
    tail: LogTail,
    patterns: Vec<Regex>,
}

impl AuthLogTail {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let patterns = vec![
            Regex::new(
                r"Failed (?:password|publickey|keyboard-interactive/pam) for (?:invalid user )?(?P<user>\S+) from (?P<ip>\S+)",
            )?,
            Regex::new(r"sudo:\s+(?P<user>\S+) : \d+ incorrect password attempts?")?,
        ];
        Ok(Self { tail: LogTail::new(path), patterns })
    }

    pub fn parse_line(&self, line: &str) -> Option<AuthFailure> {
        self.patterns.iter().find_map(|pattern| {
            let caps = pattern.captures(line)?;
            Some(AuthFailure {
                identity: caps.name("user")?.as_str().to_string(),
                source_address: caps.name("ip").map(|m| m.as_str().to_string()),
            })
        })
    }
}

impl AuthLogSource for AuthLogTail {
    fn failures_since_last_poll(&self) -> Result<Vec<AuthFailure>, MonitorError> {
        Ok(self
            .tail
            .read_new_lines()?
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect())
    }
}

/// Entries from a BSD or RFC 3339 timestamped syslog file
pub struct SystemLogTail {
    tail: LogTail,
    line: Regex,
}

impl SystemLogTail {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let line = Regex::new(
            r"^(?:\w{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}|\d{4}-\d{2}-\d{2}T\S+)\s+\S+\s+(?P<origin>[^\s\[:]+)(?:\[\d+\])?:\s*(?P<message>.*)$",
        )?;
        Ok(Self { tail: LogTail::new(path), line })
    }

    pub fn parse_line(&self, line: &str) -> Option<SystemLogEntry> {
        let caps = self.line.captures(line)?;
        Some(SystemLogEntry {
            origin: caps.name("origin")?.as_str().to_string(),
            message: caps.name("message")?.as_str().trim().to_string(),
            observed_at: SystemTime::now(),
        })
    }
}

impl SystemLogSource for SystemLogTail {
    fn entries_since_last_poll(&self) -> Result<Vec<SystemLogEntry>, MonitorError> {
        Ok(self
            .tail
            .read_new_lines()?
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect())
    }
}
