use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::types::{ModelError, Result};

/// Multiple-reader, single-writer lock with bounded acquisition.
///
/// One instance gates all structural mutation of a tree. Acquisition waits at
/// most `timeout` and then fails with [`ModelError::Locked`]; the lock never
/// blocks indefinitely. The lock is not reentrant.
pub struct StructureLock {
    lock: RwLock<()>,
    timeout: Duration,
    readers: AtomicU32,
    writer: AtomicBool,
}

/// Snapshot of lock state for observability.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Number of active readers.
    pub readers: u32,
    /// Whether the writer lock is held.
    pub writer: bool,
}

/// Guard representing a held reader lock.
pub struct ReaderGuard<'a> {
    _guard: RwLockReadGuard<'a, ()>,
    readers: &'a AtomicU32,
}

/// Guard representing a held writer lock.
pub struct WriterGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
    writer: &'a AtomicBool,
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.writer.store(false, Ordering::Release);
    }
}

impl StructureLock {
    /// Creates an unlocked lock with the given acquisition timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            lock: RwLock::new(()),
            timeout,
            readers: AtomicU32::new(0),
            writer: AtomicBool::new(false),
        }
    }

    /// Configured acquisition timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquires a shared lock, waiting at most the configured timeout.
    ///
    /// Multiple readers can hold the lock concurrently. No ordering is
    /// promised between waiting readers and a waiting writer.
    pub fn acquire_reader(&self) -> Result<ReaderGuard<'_>> {
        let guard = self.lock.try_read_for(self.timeout).ok_or_else(|| {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "tree read lock timed out");
            ModelError::Locked {
                timeout: self.timeout,
            }
        })?;
        self.readers.fetch_add(1, Ordering::AcqRel);
        Ok(ReaderGuard {
            _guard: guard,
            readers: &self.readers,
        })
    }

    /// Acquires the exclusive lock, waiting at most the configured timeout.
    pub fn acquire_writer(&self) -> Result<WriterGuard<'_>> {
        let guard = self.lock.try_write_for(self.timeout).ok_or_else(|| {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "tree write lock timed out");
            ModelError::Locked {
                timeout: self.timeout,
            }
        })?;
        self.writer.store(true, Ordering::Release);
        Ok(WriterGuard {
            _guard: guard,
            writer: &self.writer,
        })
    }

    /// Returns a snapshot of the current lock state.
    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            readers: self.readers.load(Ordering::Acquire),
            writer: self.writer.load(Ordering::Acquire),
        }
    }
}
