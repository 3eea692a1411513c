//! Watched directory tree backed by a recursive `notify` watcher
//!
//! The watcher callback buffers translated events; each tick drains the
//! buffer. The watch is established lazily on the first drain and retried
//! on later drains while the root cannot be watched.

use crate::models::{FileEvent, MonitorError};
use crate::sources::FileTree;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

pub struct NotifyFileTree {
    root: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    buffer: Arc<Mutex<Vec<FileEvent>>>,
}

impl NotifyFileTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            watcher: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ensure_watching(&self) -> Result<(), MonitorError> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => buffer.lock().extend(translate(event)),
                Err(e) => log::warn!("File watch error: {}", e),
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        log::debug!("Watching {}", self.root.display());
        *slot = Some(watcher);
        Ok(())
    }
}

impl FileTree for NotifyFileTree {
    fn root(&self) -> &Path {
        &self.root
    }

    fn drain_events(&self) -> Result<Vec<FileEvent>, MonitorError> {
        self.ensure_watching()?;
        Ok(std::mem::take(&mut *self.buffer.lock()))
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>, MonitorError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.modified()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a raw watcher event onto the changes the file integrity monitor
/// classifies. Half-rename notifications are dropped; the paired form
/// carries both paths.
pub(crate) fn translate(event: notify::Event) -> Vec<FileEvent> {
    let mut paths = event.paths;
    match event.kind {
        EventKind::Create(_) => paths.into_iter().map(FileEvent::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FileEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => {
            let to = paths.remove(1);
            let from = paths.remove(0);
            vec![FileEvent::Renamed { from, to }]
        }
        EventKind::Modify(ModifyKind::Name(_)) => Vec::new(),
        EventKind::Modify(_) => paths.into_iter().map(FileEvent::Modified).collect(),
        _ => Vec::new(),
    }
}
