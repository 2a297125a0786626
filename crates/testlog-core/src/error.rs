use std::fmt;

/// Stable failure codes printed by `tlog` and matched by CI scripts.
///
/// The leading digit groups codes by area: 1 project setup, 2 store,
/// 3 artifacts, 4 cache, 5 locking, 9 anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    StoreOpenFailed,
    ReportGroupNotFound,
    ArtifactNotFound,
    ArtifactReadFailed,
    CacheWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// The `E####` identifier.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::StoreOpenFailed => "E2001",
            Self::ReportGroupNotFound => "E2002",
            Self::ArtifactNotFound => "E3001",
            Self::ArtifactReadFailed => "E3002",
            Self::CacheWriteFailed => "E4001",
            Self::LockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// One-line description of the failure class.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::StoreOpenFailed => "Report store could not be opened",
            Self::ReportGroupNotFound => "Report group not found",
            Self::ArtifactNotFound => "Artifact not found",
            Self::ArtifactReadFailed => "Artifact could not be read",
            Self::CacheWriteFailed => "Aggregate cache write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// What the operator can do about it, when there is something to do.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tlog init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .testlog/config.toml and retry."),
            Self::StoreOpenFailed => {
                Some("Check permissions on .testlog/testlog.sqlite3 or remove it and re-ingest.")
            }
            Self::ReportGroupNotFound => Some("Run `tlog reports` to list known report groups."),
            Self::ArtifactNotFound => Some("Run `tlog import` to add event streams first."),
            Self::ArtifactReadFailed => Some("Check the artifact directory and file permissions."),
            Self::CacheWriteFailed => Some("Check disk space and write permissions on .testlog/cache."),
            Self::LockContention => Some("Retry after the other `tlog` process releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
