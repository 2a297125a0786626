pub mod analyze;
pub mod cache;
pub mod completions;
pub mod history;
pub mod import;
pub mod ingest;
pub mod init;
pub mod metrics;
pub mod reports;
pub mod show;

use std::path::Path;

use anyhow::Result;
use testlog_core::cache::AggregateCache;
use testlog_core::config::{ProjectConfig, ProjectPaths, load_project_config};
use testlog_core::db::SqliteStore;
use testlog_core::error::ErrorCode;
use testlog_core::lock::{IngestLock, LockError, ReadLock};

use crate::output::{OutputMode, fail};

/// An initialized project: its layout plus parsed configuration.
#[derive(Debug)]
pub struct Project {
    pub paths: ProjectPaths,
    pub config: ProjectConfig,
}

impl Project {
    /// Load the project rooted at `project_root`, failing with
    /// `NotInitialized` when `.testlog/` is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is not initialized or its config
    /// cannot be parsed.
    pub fn load(project_root: &Path, output: OutputMode) -> Result<Self> {
        let paths = ProjectPaths::new(project_root);
        if !paths.is_initialized() {
            return Err(fail(
                output,
                ErrorCode::NotInitialized,
                format!("no .testlog/ directory in {}", project_root.display()),
            ));
        }
        let config = load_project_config(project_root)
            .map_err(|e| fail(output, ErrorCode::ConfigParseError, format!("{e:#}")))?;
        Ok(Self { paths, config })
    }

    /// Open (and migrate) the report store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened.
    pub fn open_store(&self, output: OutputMode) -> Result<SqliteStore> {
        SqliteStore::open(&self.paths.store())
            .map_err(|e| fail(output, ErrorCode::StoreOpenFailed, format!("{e:#}")))
    }

    /// The aggregate cache under `.testlog/cache/`.
    pub fn cache(&self) -> AggregateCache {
        AggregateCache::new(self.paths.cache_dir())
    }

    /// Take the single-writer lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held past the configured timeout.
    pub fn write_lock(&self, output: OutputMode) -> Result<IngestLock> {
        IngestLock::acquire(&self.paths.lock(), self.config.store.lock_timeout())
            .map_err(|e| lock_failure(output, &e))
    }

    /// Take a shared lock that excludes writers.
    ///
    /// # Errors
    ///
    /// Returns an error if a writer holds the lock past the configured
    /// timeout.
    pub fn read_lock(&self, output: OutputMode) -> Result<ReadLock> {
        ReadLock::acquire(&self.paths.lock(), self.config.store.lock_timeout())
            .map_err(|e| lock_failure(output, &e))
    }
}

fn lock_failure(output: OutputMode, err: &LockError) -> anyhow::Error {
    let message = match err {
        LockError::Timeout { path, waited } => {
            format!("{} still held after {waited:?}", path.display())
        }
        LockError::Io(e) => format!("could not lock store: {e}"),
    };
    fail(output, err.code(), message)
}
