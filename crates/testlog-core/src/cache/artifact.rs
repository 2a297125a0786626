//! Typed access to one JSON cache artifact.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use super::CacheError;

/// A single JSON artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFile {
    path: PathBuf,
}

impl CacheFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and decode the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Missing`], [`CacheError::Empty`],
    /// [`CacheError::Read`] or [`CacheError::Decode`]; all of them mean the
    /// artifact is cold.
    pub fn read<T: DeserializeOwned>(&self) -> Result<T, CacheError> {
        let bytes = fs::read(&self.path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                CacheError::Missing {
                    path: self.path.clone(),
                }
            } else {
                CacheError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(CacheError::Empty {
                path: self.path.clone(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    /// Serialize `value` and replace the artifact.
    ///
    /// The bytes go to a uniquely named sibling temp file that is renamed
    /// into place, so readers never observe a half-written artifact. The temp
    /// file is removed if the rename fails.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Encode`] or [`CacheError::Write`].
    pub fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value)?;
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.persist(&self.path)
            .map(drop)
            .map_err(|e| write_err(e.error))
    }

    /// Delete the artifact. Returns `true` if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] if the file exists but cannot be removed.
    pub fn remove(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CacheError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{TestHistory, TestMetrics};
    use tempfile::TempDir;

    #[test]
    fn metrics_and_history_round_trip() {
        let tmp = TempDir::new().unwrap();
        let metrics_file = CacheFile::new(tmp.path().join("metrics.json"));
        let history_file = CacheFile::new(tmp.path().join("history.json"));

        let metrics = vec![
            TestMetrics {
                test_label: "TestA".into(),
                pass_count: 3,
                fail_count: 1,
            },
            TestMetrics {
                test_label: "TestB".into(),
                pass_count: 0,
                fail_count: 0,
            },
        ];
        let history = vec![TestHistory {
            test_label: "TestA".into(),
            group_label: "Workflow Run 1".into(),
            subgroup_label: "e2e-linux".into(),
            passed: false,
        }];

        metrics_file.write(&metrics).unwrap();
        history_file.write(&history).unwrap();

        assert_eq!(metrics_file.read::<Vec<TestMetrics>>().unwrap(), metrics);
        assert_eq!(history_file.read::<Vec<TestHistory>>().unwrap(), history);
        assert!(!tmp.path().join("metrics.json.tmp").exists());
    }

    #[test]
    fn artifact_uses_documented_field_names() {
        let tmp = TempDir::new().unwrap();
        let file = CacheFile::new(tmp.path().join("metrics.json"));
        file.write(&[TestMetrics {
            test_label: "t".into(),
            pass_count: 1,
            fail_count: 2,
        }])
        .unwrap();
        let raw = fs::read_to_string(file.path()).unwrap();
        assert_eq!(raw, r#"[{"test_label":"t","pass_count":1,"fail_count":2}]"#);
    }

    #[test]
    fn missing_empty_and_corrupt_are_cold() {
        let tmp = TempDir::new().unwrap();
        let file = CacheFile::new(tmp.path().join("metrics.json"));

        let err = file.read::<Vec<TestMetrics>>().unwrap_err();
        assert!(matches!(err, CacheError::Missing { .. }));

        fs::write(file.path(), "  \n").unwrap();
        let err = file.read::<Vec<TestMetrics>>().unwrap_err();
        assert!(matches!(err, CacheError::Empty { .. }));

        fs::write(file.path(), "[{\"test_label\":").unwrap();
        let err = file.read::<Vec<TestMetrics>>().unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));
        assert!(err.is_cold());
    }

    #[test]
    fn remove_reports_whether_a_file_existed() {
        let tmp = TempDir::new().unwrap();
        let file = CacheFile::new(tmp.path().join("nested/history.json"));
        assert!(!file.remove().unwrap());
        file.write(&Vec::<TestHistory>::new()).unwrap();
        assert!(file.exists());
        assert!(file.remove().unwrap());
        assert!(!file.exists());
    }

    #[test]
    fn failed_replace_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("metrics.json");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("occupied"), "x").unwrap();

        let err = CacheFile::new(&target).write(&Vec::<TestMetrics>::new()).unwrap_err();
        assert!(matches!(err, CacheError::Write { .. }));

        let entries: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("metrics.json")]);
    }

    #[test]
    fn repeated_writes_replace_in_place() {
        let tmp = TempDir::new().unwrap();
        let file = CacheFile::new(tmp.path().join("history.json"));
        file.write(&Vec::<TestHistory>::new()).unwrap();
        file.write(&Vec::<TestHistory>::new()).unwrap();
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
