//! File-backed memoization of cross-report aggregates.
//!
//! The cache holds two JSON artifacts in one directory:
//!
//! - `metrics.json`: ordered `[{test_label, pass_count, fail_count}]`
//! - `history.json`: ordered `[{test_label, group_label, subgroup_label, passed}]`
//!
//! Each artifact is either warm (present and decodable) or cold. A warm
//! artifact is served as-is no matter how the store has changed since it was
//! written; the only way back to cold is deleting it
//! ([`AggregateCache::invalidate`]). Cold artifacts are recomputed from the
//! store and written back.
//!
//! # Module layout
//!
//! - [`artifact`]: [`CacheFile`], typed read/write of one JSON artifact.
//! - [`manager`]: [`AggregateCache`], the cold/warm lifecycle.
//! - [`CacheError`]: error type (this module).

pub mod artifact;
pub mod manager;

pub use artifact::CacheFile;
pub use manager::{
    AggregateCache, ArtifactState, CacheStatus, HISTORY_FILE, LoadSource, Loaded, METRICS_FILE,
};

use std::path::PathBuf;

use crate::error::ErrorCode;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors returned when reading or writing a cache artifact.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The artifact does not exist.
    #[error("cache artifact {} does not exist", path.display())]
    Missing { path: PathBuf },

    /// The artifact exists but has no content.
    #[error("cache artifact {} is empty", path.display())]
    Empty { path: PathBuf },

    /// The artifact could not be read.
    #[error("failed to read cache artifact {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact content is not valid JSON for the expected shape.
    #[error("cache artifact {} is corrupt: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be serialized.
    #[error("failed to encode cache value: {0}")]
    Encode(#[from] serde_json::Error),

    /// The artifact could not be written or removed.
    #[error("failed to write cache artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Encode(_) | Self::Write { .. } => ErrorCode::CacheWriteFailed,
            Self::Missing { .. } | Self::Empty { .. } | Self::Read { .. } | Self::Decode { .. } => {
                ErrorCode::InternalUnexpected
            }
        }
    }

    /// Returns `true` if this error means the artifact should be treated as
    /// a cold cache rather than surfaced.
    #[must_use]
    pub const fn is_cold(&self) -> bool {
        matches!(
            self,
            Self::Missing { .. } | Self::Empty { .. } | Self::Read { .. } | Self::Decode { .. }
        )
    }
}
