//! Blocking FIFO between the directory watcher and the report processor.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use crate::error::WatchError;

/// A discovered report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFile {
    pub path: PathBuf,
    /// Watched root the file was found in
    pub root: PathBuf,
    pub discovered_at: SystemTime,
}

impl ReportFile {
    pub fn new(path: impl Into<PathBuf>, root: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            root: root.into(),
            discovered_at: SystemTime::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Default)]
struct Slots {
    files: VecDeque<ReportFile>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slots: Mutex<Slots>,
    available: Condvar,
}

/// Unbounded thread-safe FIFO of report files. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct ReportQueue {
    shared: Arc<Shared>,
}

impl ReportQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.shared
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a file and wake the consumer.
    pub fn put(&self, file: ReportFile) -> Result<(), WatchError> {
        {
            let mut slots = self.slots();
            if slots.closed {
                return Err(WatchError::QueueClosed);
            }
            slots.files.push_back(file);
        }
        self.shared.available.notify_one();
        Ok(())
    }

    /// Take the oldest file, waiting at most `timeout` for one to arrive.
    /// Returns `None` on timeout, or at once when the queue is closed and empty.
    pub fn poll(&self, timeout: Duration) -> Option<ReportFile> {
        let deadline = Instant::now() + timeout;
        let mut slots = self.slots();
        loop {
            if let Some(file) = slots.files.pop_front() {
                return Some(file);
            }
            if slots.closed {
                return None;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            slots = self
                .shared
                .available
                .wait_timeout(slots, remaining)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Take the oldest file without waiting.
    pub fn try_take(&self) -> Option<ReportFile> {
        self.slots().files.pop_front()
    }

    /// Refuse further files; queued ones can still be taken.
    pub fn close(&self) {
        self.slots().closed = true;
        self.shared.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slots().closed
    }

    pub fn len(&self) -> usize {
        self.slots().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
