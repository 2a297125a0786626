//! Cache lifecycle: warm read, cold rebuild, explicit invalidation.
//!
//! [`AggregateCache`] is the entry point for cross-report aggregates. For
//! each artifact it:
//!
//! 1. **Warm**: decodes the artifact and returns it without touching the
//!    store.
//! 2. **Cold** (absent, unreadable, empty or undecodable): deletes any stale
//!    file, recomputes via [`MetricsEngine`], and writes the result back.
//!    A failed write is logged and the fresh value is still returned.
//!
//! There is no staleness detection. After ingesting new data the caller
//! must [`invalidate`](AggregateCache::invalidate) to see it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{CacheError, CacheFile};
use crate::db::RecordStore;
use crate::metrics::{MetricsEngine, TestHistory, TestMetrics};

/// File name of the cross-report metrics artifact.
pub const METRICS_FILE: &str = "metrics.json";
/// File name of the cross-report history artifact.
pub const HISTORY_FILE: &str = "history.json";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A cached value plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub source: LoadSource,
}

/// Where a cached value was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// Decoded from a warm artifact.
    Cache,
    /// Recomputed from the store and written back.
    Rebuilt,
    /// Recomputed from the store; writing the artifact failed (non-fatal).
    RebuildUnsaved,
}

/// State of one artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactState {
    /// Present and decodable.
    Warm { entries: usize },
    /// Not on disk.
    Missing,
    /// On disk but unreadable, empty or corrupt. The next read rebuilds it.
    Invalid,
}

impl ArtifactState {
    #[must_use]
    pub const fn is_warm(self) -> bool {
        matches!(self, Self::Warm { .. })
    }
}

/// Per-artifact cache state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub dir: PathBuf,
    pub metrics: ArtifactState,
    pub history: ArtifactState,
}

// ---------------------------------------------------------------------------
// AggregateCache
// ---------------------------------------------------------------------------

/// File-backed cache of cross-report metrics and history.
#[derive(Debug, Clone)]
pub struct AggregateCache {
    dir: PathBuf,
    metrics: CacheFile,
    history: CacheFile,
}

impl AggregateCache {
    /// Cache rooted at `dir`. Nothing is touched on disk until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            metrics: CacheFile::new(dir.join(METRICS_FILE)),
            history: CacheFile::new(dir.join(HISTORY_FILE)),
            dir,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn metrics_path(&self) -> &Path {
        self.metrics.path()
    }

    #[must_use]
    pub fn history_path(&self) -> &Path {
        self.history.path()
    }

    /// Cross-report test metrics, sorted by label.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cache is cold and the store cannot be
    /// read. Cache I/O problems never surface.
    pub fn metrics<S: RecordStore>(&self, store: &S) -> Result<Loaded<Vec<TestMetrics>>> {
        load_or_rebuild(&self.metrics, || MetricsEngine::new(store).cross_report_metrics())
    }

    /// Cross-report test history.
    ///
    /// # Errors
    ///
    /// Returns an error only if the cache is cold and the store cannot be
    /// read.
    pub fn history<S: RecordStore>(&self, store: &S) -> Result<Loaded<Vec<TestHistory>>> {
        load_or_rebuild(&self.history, || MetricsEngine::new(store).cross_report_history())
    }

    /// Delete both artifacts. Returns how many files were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing artifact cannot be deleted.
    pub fn invalidate(&self) -> Result<usize, CacheError> {
        let removed = usize::from(self.metrics.remove()?) + usize::from(self.history.remove()?);
        info!(dir = %self.dir.display(), removed, "invalidated aggregate cache");
        Ok(removed)
    }

    /// Inspect both artifacts without rebuilding anything.
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            dir: self.dir.clone(),
            metrics: inspect::<Vec<TestMetrics>>(&self.metrics),
            history: inspect::<Vec<TestHistory>>(&self.history),
        }
    }
}

fn inspect<T>(file: &CacheFile) -> ArtifactState
where
    T: DeserializeOwned + Len,
{
    match file.read::<T>() {
        Ok(value) => ArtifactState::Warm { entries: value.len() },
        Err(CacheError::Missing { .. }) => ArtifactState::Missing,
        Err(_) => ArtifactState::Invalid,
    }
}

/// Length of a cached collection.
trait Len {
    fn len(&self) -> usize;
}

impl<T> Len for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

fn load_or_rebuild<T, F>(file: &CacheFile, rebuild: F) -> Result<Loaded<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    match file.read::<T>() {
        Ok(value) => {
            debug!(path = %file.path().display(), "serving warm cache artifact");
            return Ok(Loaded {
                value,
                source: LoadSource::Cache,
            });
        }
        Err(CacheError::Missing { .. }) => {
            debug!(path = %file.path().display(), "cache artifact missing, rebuilding");
        }
        Err(e) => {
            warn!(error = %e, "discarding unusable cache artifact");
            if let Err(e) = file.remove() {
                warn!(error = %e, "failed to delete stale cache artifact");
            }
        }
    }

    let value = rebuild()?;
    let source = match file.write(&value) {
        Ok(()) => {
            info!(path = %file.path().display(), "rebuilt cache artifact");
            LoadSource::Rebuilt
        }
        Err(e) => {
            warn!(error = %e, "cache write failed (non-fatal)");
            LoadSource::RebuildUnsaved
        }
    };
    Ok(Loaded { value, source })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::db::ingest::Ingestor;
    use crate::event::parse_events;
    use crate::report::build_report;
    use std::fs;
    use tempfile::TempDir;

    fn ingest(store: &SqliteStore, run: &str, report: &str, stream: &[u8]) {
        let ingestor = Ingestor::new(store);
        let project = ingestor.ensure_project("default").unwrap();
        let rg = ingestor.ensure_report_group(project, run).unwrap();
        ingestor
            .store_report(rg, &build_report(report, &parse_events(stream).events))
            .unwrap();
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        ingest(&store, "Workflow Run 1", "a", br#"{"action":"pass","package":"p","test":"t"}"#);
        store
    }

    #[test]
    fn cold_then_warm() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path().join("cache"));
        let store = seeded_store();

        let first = cache.metrics(&store).unwrap();
        assert_eq!(first.source, LoadSource::Rebuilt);
        assert_eq!(first.value.len(), 1);
        assert!(cache.metrics_path().is_file());

        let second = cache.metrics(&store).unwrap();
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(second.value, first.value);
    }

    #[test]
    fn warm_cache_ignores_new_store_data_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path());
        let store = seeded_store();

        cache.history(&store).unwrap();
        ingest(&store, "Workflow Run 2", "b", br#"{"action":"fail","package":"p","test":"t"}"#);

        let stale = cache.history(&store).unwrap();
        assert_eq!(stale.source, LoadSource::Cache);
        assert_eq!(stale.value.len(), 1);

        assert_eq!(cache.invalidate().unwrap(), 1);
        let fresh = cache.history(&store).unwrap();
        assert_eq!(fresh.source, LoadSource::Rebuilt);
        assert_eq!(fresh.value.len(), 2);
    }

    #[test]
    fn corrupt_artifact_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path());
        fs::write(cache.metrics_path(), b"{not json").unwrap();
        assert_eq!(cache.status().metrics, ArtifactState::Invalid);

        let loaded = cache.metrics(&seeded_store()).unwrap();
        assert_eq!(loaded.source, LoadSource::Rebuilt);
        assert_eq!(cache.status().metrics, ArtifactState::Warm { entries: 1 });
    }

    #[test]
    fn empty_artifact_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path());
        fs::write(cache.history_path(), b"").unwrap();

        let loaded = cache.history(&seeded_store()).unwrap();
        assert_eq!(loaded.source, LoadSource::Rebuilt);
        assert!(loaded.value[0].passed);
    }

    #[test]
    fn unwritable_cache_still_returns_value() {
        let tmp = TempDir::new().unwrap();
        // A regular file where the cache directory should be.
        let blocker = tmp.path().join("cache");
        fs::write(&blocker, b"").unwrap();
        let cache = AggregateCache::new(&blocker);

        let loaded = cache.metrics(&seeded_store()).unwrap();
        assert_eq!(loaded.source, LoadSource::RebuildUnsaved);
        assert_eq!(loaded.value[0].pass_count, 1);
    }

    #[test]
    fn status_reports_each_artifact() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path());
        let status = cache.status();
        assert_eq!(status.metrics, ArtifactState::Missing);
        assert_eq!(status.history, ArtifactState::Missing);

        cache.metrics(&seeded_store()).unwrap();
        let status = cache.status();
        assert!(status.metrics.is_warm());
        assert_eq!(status.history, ArtifactState::Missing);
    }

    #[test]
    fn empty_store_caches_empty_lists() {
        let tmp = TempDir::new().unwrap();
        let cache = AggregateCache::new(tmp.path());
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(cache.metrics(&store).unwrap().value.is_empty());
        let again = cache.metrics(&store).unwrap();
        assert_eq!(again.source, LoadSource::Cache);
        assert_eq!(cache.status().metrics, ArtifactState::Warm { entries: 0 });
    }
}
