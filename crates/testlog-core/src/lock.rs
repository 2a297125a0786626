//! Advisory file locks serializing writers against the report store.
//!
//! Ingestion and analysis hold [`IngestLock`] (exclusive) for their whole
//! run. Aggregation takes [`ReadLock`] (shared) so a metrics rebuild never
//! observes a report group that is still being written. Both are RAII
//! guards over the same lock file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use crate::error::ErrorCode;

/// Delay between attempts while a lock is contended.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from acquiring a store lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another process kept the lock for longer than the timeout.
    #[error("{}: lock on {} still held after {waited:?}", ErrorCode::LockContention, path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// The lock file could not be created or opened.
    #[error("{}: {0}", ErrorCode::InternalUnexpected)]
    Io(#[from] io::Error),
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::Io(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Shared,
    Exclusive,
}

/// Open lock file holding a shared or exclusive lock until dropped.
#[derive(Debug)]
struct Held {
    file: File,
    path: PathBuf,
}

impl Held {
    fn take(path: &Path, timeout: Duration, mode: Mode) -> Result<Self, LockError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let attempt = match mode {
                Mode::Shared => FileExt::try_lock_shared(&file),
                Mode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            if attempt.is_ok() {
                debug!(path = %path.display(), ?mode, "lock acquired");
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }
            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }
}

impl Drop for Held {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "unlock failed");
        }
    }
}

/// Exclusive lock held while ingesting or analyzing.
#[derive(Debug)]
pub struct IngestLock(Held);

impl IngestLock {
    /// Wait up to `timeout` for exclusive access to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if any other lock is still held when
    /// the timeout expires.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Held::take(path, timeout, Mode::Exclusive).map(Self)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Release now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

/// Shared lock held while aggregates may be rebuilt.
#[derive(Debug)]
pub struct ReadLock(Held);

impl ReadLock {
    /// Wait up to `timeout` for shared access to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if a writer still holds the lock when
    /// the timeout expires.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Held::take(path, timeout, Mode::Shared).map(Self)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0.path
    }

    /// Release now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}
