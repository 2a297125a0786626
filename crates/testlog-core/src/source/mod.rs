//! Where raw event streams come from.
//!
//! [`ArtifactSource`] is the contract the ingestion pipeline consumes: list
//! the available artifacts, then fetch each one's bytes. [`DirectorySource`]
//! implements it over a local directory:
//!
//! ```text
//! <root>/<run_id>/<name>.json    # ArtifactRef metadata
//! <root>/<run_id>/<name>.jsonl   # event stream, one JSON event per line
//! ```
//!
//! Remote download and archive unpacking happen outside this crate; whatever
//! performs them drops results into this layout (see [`DirectorySource::store`]).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorCode;

const METADATA_EXT: &str = "json";
const STREAM_EXT: &str = "jsonl";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identity of one artifact: a named event stream produced by one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: u64,
    pub name: String,
    /// Id of the run (e.g. CI workflow run) that produced the artifact.
    pub run_id: u64,
}

/// Errors from an [`ArtifactSource`].
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("artifact directory {} does not exist", root.display())]
    RootMissing { root: PathBuf },

    #[error("artifact '{name}' of run {run_id} not found")]
    NotFound { name: String, run_id: u64 },

    #[error("invalid artifact name '{name}': must be non-empty, without path separators or a leading dot")]
    InvalidName { name: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact metadata in {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SourceError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RootMissing { .. } | Self::NotFound { .. } => ErrorCode::ArtifactNotFound,
            Self::InvalidName { .. } | Self::Io { .. } | Self::Metadata { .. } => {
                ErrorCode::ArtifactReadFailed
            }
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A provider of artifact event streams.
pub trait ArtifactSource {
    /// Every available artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing itself fails.
    fn list(&self) -> Result<Vec<ArtifactRef>, SourceError>;

    /// Raw event-stream bytes of `artifact`.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is missing or unreadable.
    fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, SourceError>;
}

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// [`ArtifactSource`] over a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether both files of `artifact` are present.
    #[must_use]
    pub fn exists(&self, artifact: &ArtifactRef) -> bool {
        self.paths(artifact)
            .is_ok_and(|(meta, stream)| meta.is_file() && stream.is_file())
    }

    /// Write `bytes` and the metadata of `artifact` into the layout,
    /// replacing any previous copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the files cannot be
    /// written.
    pub fn store(&self, artifact: &ArtifactRef, bytes: &[u8]) -> Result<(), SourceError> {
        let (meta_path, stream_path) = self.paths(artifact)?;
        let run_dir = self.run_dir(artifact.run_id);
        fs::create_dir_all(&run_dir).map_err(|e| SourceError::io(&run_dir, e))?;

        fs::write(&stream_path, bytes).map_err(|e| SourceError::io(&stream_path, e))?;
        let meta = serde_json::to_vec_pretty(artifact).map_err(|source| SourceError::Metadata {
            path: meta_path.clone(),
            source,
        })?;
        fs::write(&meta_path, meta).map_err(|e| SourceError::io(&meta_path, e))?;

        debug!(name = %artifact.name, run_id = artifact.run_id, bytes = bytes.len(), "stored artifact");
        Ok(())
    }

    /// One more than the largest artifact id present (1 for an empty
    /// source).
    ///
    /// # Errors
    ///
    /// Returns an error if the existing artifacts cannot be listed.
    pub fn next_id(&self) -> Result<u64, SourceError> {
        match self.list() {
            Ok(artifacts) => Ok(artifacts.iter().map(|a| a.id).max().map_or(1, |id| id + 1)),
            Err(SourceError::RootMissing { .. }) => Ok(1),
            Err(e) => Err(e),
        }
    }

    fn run_dir(&self, run_id: u64) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn paths(&self, artifact: &ArtifactRef) -> Result<(PathBuf, PathBuf), SourceError> {
        validate_name(&artifact.name)?;
        let dir = self.run_dir(artifact.run_id);
        Ok((
            dir.join(format!("{}.{METADATA_EXT}", artifact.name)),
            dir.join(format!("{}.{STREAM_EXT}", artifact.name)),
        ))
    }

    fn read_run_dir(&self, dir: &Path, out: &mut Vec<ArtifactRef>) -> Result<(), SourceError> {
        for entry in fs::read_dir(dir).map_err(|e| SourceError::io(dir, e))? {
            let path = entry.map_err(|e| SourceError::io(dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(METADATA_EXT) {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| SourceError::io(&path, e))?;
            let artifact: ArtifactRef = serde_json::from_slice(&bytes)
                .map_err(|source| SourceError::Metadata { path: path.clone(), source })?;
            out.push(artifact);
        }
        Ok(())
    }
}

impl ArtifactSource for DirectorySource {
    /// Artifacts sorted by run id, then name, then id.
    fn list(&self) -> Result<Vec<ArtifactRef>, SourceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::RootMissing {
                    root: self.root.clone(),
                });
            }
            Err(e) => return Err(SourceError::io(&self.root, e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| SourceError::io(&self.root, e))?.path();
            if path.is_dir() {
                self.read_run_dir(&path, &mut artifacts)?;
            }
        }
        artifacts.sort_by(|a, b| (a.run_id, &a.name, a.id).cmp(&(b.run_id, &b.name, b.id)));
        Ok(artifacts)
    }

    fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, SourceError> {
        let (_, stream_path) = self.paths(artifact)?;
        fs::read(&stream_path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SourceError::NotFound {
                    name: artifact.name.clone(),
                    run_id: artifact.run_id,
                }
            } else {
                SourceError::io(&stream_path, e)
            }
        })
    }
}

fn validate_name(name: &str) -> Result<(), SourceError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(SourceError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
