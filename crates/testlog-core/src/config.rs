//! Project layout and `.testlog/config.toml`.
//!
//! ```toml
//! [project]
//! label = "default"
//!
//! [ingest]
//! artifact_dir = "/var/cache/ci-artifacts"
//! artifact_filter = "e2e"
//!
//! [store]
//! lock_timeout_ms = 5000
//! ```
//!
//! Every key is optional. A missing file means all defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::DEFAULT_PROJECT;

/// Project state directory, relative to the project root.
pub const TESTLOG_DIR: &str = ".testlog";
/// Environment variable overriding the artifact directory.
pub const ARTIFACT_DIR_ENV: &str = "TESTLOG_ARTIFACT_DIR";

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Well-known paths under a project's `.testlog/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.testlog/`
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.root.join(TESTLOG_DIR)
    }

    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.dir().join("config.toml")
    }

    #[must_use]
    pub fn store(&self) -> PathBuf {
        self.dir().join("testlog.sqlite3")
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.dir().join("cache")
    }

    #[must_use]
    pub fn lock(&self) -> PathBuf {
        self.dir().join("ingest.lock")
    }

    /// Whether `.testlog/` exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.dir().is_dir()
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Label of the project that owns ingested report groups.
    #[serde(default = "default_project_label")]
    pub label: String,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            label: default_project_label(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
    /// Only artifacts whose name contains this substring are ingested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Load `.testlog/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = ProjectPaths::new(project_root).config();
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// TOML text of the default configuration, written by `init`.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&ProjectConfig::default()).context("serialize default config")
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Artifact directory by precedence: CLI flag, `TESTLOG_ARTIFACT_DIR`,
/// config file, then the user cache directory (`<cache>/testlog`). Falls
/// back to `.testlog/artifacts` when the platform has no cache directory.
#[must_use]
pub fn resolve_artifact_dir(
    cli: Option<&Path>,
    env_value: Option<String>,
    config: &ProjectConfig,
    paths: &ProjectPaths,
) -> PathBuf {
    if let Some(dir) = cli {
        return dir.to_path_buf();
    }
    if let Some(dir) = env_value.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = &config.ingest.artifact_dir {
        return dir.clone();
    }
    dirs::cache_dir().map_or_else(|| paths.dir().join("artifacts"), |dir| dir.join("testlog"))
}

fn default_project_label() -> String {
    DEFAULT_PROJECT.to_string()
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}
