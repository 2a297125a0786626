//! Durable, deduplicated storage for report hierarchies.
//!
//! [`RecordStore`] is the storage contract the rest of the crate consumes;
//! [`SqliteStore`] implements it on top of `rusqlite`.
//!
//! Connection pragmas:
//! - `journal_mode = WAL`: readers proceed while a writer ingests
//! - `busy_timeout = 5s`
//! - `foreign_keys = ON`: deleting a level cascades to its subtree

pub mod ingest;
pub mod migrations;
pub mod query;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::warn;

use crate::report::{Report, ReportGroup, Status, Test, TestGroup, TestLog};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Contract types
// ---------------------------------------------------------------------------

/// The parent under which a label is unique.
///
/// Each variant names the owner; the child level is implied. `Root` is the
/// parent of projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentKey {
    Root,
    Project(i64),
    ReportGroup(i64),
    Report(i64),
    TestGroup(i64),
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Project(id) => write!(f, "project#{id}"),
            Self::ReportGroup(id) => write!(f, "report-group#{id}"),
            Self::Report(id) => write!(f, "report#{id}"),
            Self::TestGroup(id) => write!(f, "test-group#{id}"),
        }
    }
}

/// Outcome of an insert-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// A new row was written.
    Created(i64),
    /// A row with the same natural key already existed; nothing was written.
    Existing(i64),
}

impl Insert {
    /// Row id, whether new or pre-existing.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Created(id) | Self::Existing(id) => id,
        }
    }

    #[must_use]
    pub const fn is_created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Id and label of a stored child entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Child {
    pub id: i64,
    pub label: String,
}

/// Storage contract for report hierarchies.
///
/// Every entity is identified by `(parent, label)`. Inserting an entity
/// whose natural key already exists is a no-op that reports the existing
/// id, so repeated ingestion of the same input leaves row counts unchanged.
pub trait RecordStore {
    /// Id of the child of `parent` labelled `label`, if stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    fn find_by_label(&self, parent: ParentKey, label: &str) -> Result<Option<i64>>;

    /// Insert a label-only child of `parent` unless one already exists.
    ///
    /// Under [`ParentKey::TestGroup`] this creates a pending test with no
    /// logs; use [`RecordStore::insert_test_if_absent`] to store a full test.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying statement fails. Duplicates are
    /// not errors.
    fn insert_if_absent(&self, parent: ParentKey, label: &str) -> Result<Insert>;

    /// Insert a test and its logs unless a test with the same label already
    /// exists in the group. Logs are only written when the test is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying statements fail.
    fn insert_test_if_absent(&self, group_id: i64, test: &Test) -> Result<Insert>;

    /// Children of `parent` in insertion (id) order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    fn list_children(&self, parent: ParentKey) -> Result<Vec<Child>>;

    /// Every stored report group across all projects, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying query fails.
    fn report_groups(&self) -> Result<Vec<Child>>;

    /// Fully hydrated report group, or `None` if `id` is not stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying queries fail.
    fn load_report_group(&self, id: i64) -> Result<Option<ReportGroup>>;

    /// Fully hydrated report, or `None` if `id` is not stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying queries fail.
    fn load_report(&self, id: i64) -> Result<Option<Report>>;

    /// Run `f` as one write transaction. Nested calls join the outer
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `f`'s error (after rolling back) or a transaction error.
    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// [`RecordStore`] backed by a SQLite database.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the store database, apply runtime pragmas, and
    /// migrate schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;

        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a fresh private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate or migrate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self { conn, path: None })
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw connection for ad-hoc queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    fn load_tests(&self, group_id: i64) -> Result<Vec<Test>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT test_id, label, status, start_ms, end_ms
                 FROM tests
                 WHERE test_group_id = ?1
                 ORDER BY test_id",
            )
            .context("prepare test load")?;

        let rows = stmt
            .query_map(params![group_id], |row| {
                let status: String = row.get(2)?;
                let status = status.parse::<Status>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
                })?;
                Ok(Test {
                    id: Some(row.get(0)?),
                    label: row.get(1)?,
                    status,
                    start: row.get(3)?,
                    end: row.get(4)?,
                    logs: Vec::new(),
                })
            })
            .with_context(|| format!("load tests of test group {group_id}"))?;

        let mut tests = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("decode tests of test group {group_id}"))?;

        for test in &mut tests {
            if let Some(id) = test.id {
                test.logs = self.load_logs(id)?;
            }
        }
        Ok(tests)
    }

    fn load_logs(&self, test_id: i64) -> Result<Vec<TestLog>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT timestamp_ms, text FROM test_logs WHERE test_id = ?1 ORDER BY seq",
            )
            .context("prepare log load")?;
        let logs = stmt
            .query_map(params![test_id], |row| {
                Ok(TestLog {
                    timestamp: row.get(0)?,
                    text: row.get(1)?,
                })
            })
            .with_context(|| format!("load logs of test {test_id}"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("decode logs of test {test_id}"))?;
        Ok(logs)
    }

    fn label_of(&self, table: &str, id_col: &str, id: i64) -> Result<Option<String>> {
        let sql = format!("SELECT label FROM {table} WHERE {id_col} = ?1");
        self.conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()
            .with_context(|| format!("look up {table} row {id}"))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Table layout of the level owned by a parent key.
struct Level {
    table: &'static str,
    id_col: &'static str,
    parent_col: Option<&'static str>,
}

impl ParentKey {
    const fn child_level(self) -> (Level, Option<i64>) {
        match self {
            Self::Root => (
                Level {
                    table: "projects",
                    id_col: "project_id",
                    parent_col: None,
                },
                None,
            ),
            Self::Project(id) => (
                Level {
                    table: "report_groups",
                    id_col: "report_group_id",
                    parent_col: Some("project_id"),
                },
                Some(id),
            ),
            Self::ReportGroup(id) => (
                Level {
                    table: "reports",
                    id_col: "report_id",
                    parent_col: Some("report_group_id"),
                },
                Some(id),
            ),
            Self::Report(id) => (
                Level {
                    table: "test_groups",
                    id_col: "test_group_id",
                    parent_col: Some("report_id"),
                },
                Some(id),
            ),
            Self::TestGroup(id) => (
                Level {
                    table: "tests",
                    id_col: "test_id",
                    parent_col: Some("test_group_id"),
                },
                Some(id),
            ),
        }
    }
}

impl RecordStore for SqliteStore {
    fn find_by_label(&self, parent: ParentKey, label: &str) -> Result<Option<i64>> {
        let (level, parent_id) = parent.child_level();
        let found: rusqlite::Result<Option<i64>> = match (level.parent_col, parent_id) {
            (Some(col), Some(pid)) => {
                let sql = format!(
                    "SELECT {} FROM {} WHERE {col} = ?1 AND label = ?2",
                    level.id_col, level.table
                );
                self.conn
                    .prepare_cached(&sql)?
                    .query_row(params![pid, label], |row| row.get(0))
                    .optional()
            }
            _ => {
                let sql = format!("SELECT {} FROM {} WHERE label = ?1", level.id_col, level.table);
                self.conn
                    .prepare_cached(&sql)?
                    .query_row(params![label], |row| row.get(0))
                    .optional()
            }
        };
        found.with_context(|| format!("find '{label}' under {parent}"))
    }

    fn insert_if_absent(&self, parent: ParentKey, label: &str) -> Result<Insert> {
        let (level, parent_id) = parent.child_level();
        let changed = match (level.parent_col, parent_id) {
            (Some(col), Some(pid)) => {
                let sql = format!(
                    "INSERT INTO {} ({col}, label) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                    level.table
                );
                self.conn.prepare_cached(&sql)?.execute(params![pid, label])
            }
            _ => {
                let sql = format!(
                    "INSERT INTO {} (label) VALUES (?1) ON CONFLICT DO NOTHING",
                    level.table
                );
                self.conn.prepare_cached(&sql)?.execute(params![label])
            }
        }
        .with_context(|| format!("insert '{label}' under {parent}"))?;

        if changed == 1 {
            return Ok(Insert::Created(self.conn.last_insert_rowid()));
        }
        let id = self
            .find_by_label(parent, label)?
            .with_context(|| format!("'{label}' under {parent} vanished after conflicting insert"))?;
        Ok(Insert::Existing(id))
    }

    fn insert_test_if_absent(&self, group_id: i64, test: &Test) -> Result<Insert> {
        let changed = self
            .conn
            .prepare_cached(
                "INSERT INTO tests (test_group_id, label, status, start_ms, end_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT DO NOTHING",
            )?
            .execute(params![
                group_id,
                test.label,
                test.status.as_str(),
                test.start,
                test.end
            ])
            .with_context(|| format!("insert test '{}' into test group {group_id}", test.label))?;

        if changed != 1 {
            let id = self
                .find_by_label(ParentKey::TestGroup(group_id), &test.label)?
                .with_context(|| {
                    format!("test '{}' vanished after conflicting insert", test.label)
                })?;
            return Ok(Insert::Existing(id));
        }

        let test_id = self.conn.last_insert_rowid();
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO test_logs (test_id, seq, timestamp_ms, text) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (seq, log) in test.logs.iter().enumerate() {
            let seq = i64::try_from(seq).context("log sequence overflow")?;
            stmt.execute(params![test_id, seq, log.timestamp, log.text])
                .with_context(|| format!("insert log {seq} of test {test_id}"))?;
        }
        Ok(Insert::Created(test_id))
    }

    fn list_children(&self, parent: ParentKey) -> Result<Vec<Child>> {
        let (level, parent_id) = parent.child_level();
        let map_child = |row: &rusqlite::Row<'_>| -> rusqlite::Result<Child> {
            Ok(Child {
                id: row.get(0)?,
                label: row.get(1)?,
            })
        };
        let children = match (level.parent_col, parent_id) {
            (Some(col), Some(pid)) => {
                let sql = format!(
                    "SELECT {id}, label FROM {table} WHERE {col} = ?1 ORDER BY {id}",
                    id = level.id_col,
                    table = level.table
                );
                self.conn
                    .prepare_cached(&sql)?
                    .query_map(params![pid], map_child)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
            _ => {
                let sql = format!(
                    "SELECT {id}, label FROM {table} ORDER BY {id}",
                    id = level.id_col,
                    table = level.table
                );
                self.conn
                    .prepare_cached(&sql)?
                    .query_map([], map_child)?
                    .collect::<rusqlite::Result<Vec<_>>>()
            }
        };
        children.with_context(|| format!("list children of {parent}"))
    }

    fn report_groups(&self) -> Result<Vec<Child>> {
        self.conn
            .prepare_cached("SELECT report_group_id, label FROM report_groups ORDER BY report_group_id")?
            .query_map([], |row| {
                Ok(Child {
                    id: row.get(0)?,
                    label: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("list report groups")
    }

    fn load_report_group(&self, id: i64) -> Result<Option<ReportGroup>> {
        let Some(label) = self.label_of("report_groups", "report_group_id", id)? else {
            return Ok(None);
        };

        let mut reports = Vec::new();
        for child in self.list_children(ParentKey::ReportGroup(id))? {
            if let Some(report) = self.load_report(child.id)? {
                reports.push(report);
            }
        }

        Ok(Some(ReportGroup {
            id: Some(id),
            label,
            reports,
        }))
    }

    fn load_report(&self, id: i64) -> Result<Option<Report>> {
        let Some(label) = self.label_of("reports", "report_id", id)? else {
            return Ok(None);
        };

        let mut test_groups = Vec::new();
        for child in self.list_children(ParentKey::Report(id))? {
            test_groups.push(TestGroup {
                id: Some(child.id),
                tests: self.load_tests(child.id)?,
                label: child.label,
            });
        }

        Ok(Some(Report {
            id: Some(id),
            label,
            test_groups,
        }))
    }

    fn atomically<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }

        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .context("begin store transaction")?;

        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("COMMIT")
                    .context("commit store transaction")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback, "rollback after failed store transaction failed");
                }
                Err(err)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested").join("testlog.sqlite3");
        (dir, path)
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open in-memory store")
    }

    fn sample_test() -> Test {
        Test {
            id: None,
            label: "TestLogin".into(),
            status: Status::Fail,
            start: Some(100),
            end: Some(250),
            logs: vec![
                TestLog {
                    timestamp: Some(120),
                    text: "dialing\n".into(),
                },
                TestLog {
                    timestamp: None,
                    text: "timeout\n".into(),
                },
            ],
        }
    }

    /// project → report group → report → test group, returning the group id.
    fn seed_group(store: &SqliteStore) -> i64 {
        let project = store.insert_if_absent(ParentKey::Root, "default").unwrap().id();
        let rg = store
            .insert_if_absent(ParentKey::Project(project), "Workflow Run 1")
            .unwrap()
            .id();
        let report = store.insert_if_absent(ParentKey::ReportGroup(rg), "e2e-a").unwrap().id();
        store.insert_if_absent(ParentKey::Report(report), "pkg/auth").unwrap().id()
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let store = SqliteStore::open(&path).expect("open store");
        assert_eq!(store.path(), Some(path.as_path()));

        let conn = store.connection();
        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);

        let version = migrations::current_schema_version(conn).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn open_fails_when_path_is_a_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(SqliteStore::open(dir.path()).is_err());
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let store = store();
        let first = store.insert_if_absent(ParentKey::Root, "default").unwrap();
        let second = store.insert_if_absent(ParentKey::Root, "default").unwrap();

        assert!(first.is_created());
        assert_eq!(second, Insert::Existing(first.id()));
        assert_eq!(store.list_children(ParentKey::Root).unwrap().len(), 1);
    }

    #[test]
    fn find_by_label_is_scoped_to_parent() {
        let store = store();
        let a = store.insert_if_absent(ParentKey::Root, "a").unwrap().id();
        let b = store.insert_if_absent(ParentKey::Root, "b").unwrap().id();
        let rg = store.insert_if_absent(ParentKey::Project(a), "Workflow Run 1").unwrap().id();

        assert_eq!(
            store.find_by_label(ParentKey::Project(a), "Workflow Run 1").unwrap(),
            Some(rg)
        );
        assert_eq!(store.find_by_label(ParentKey::Project(b), "Workflow Run 1").unwrap(), None);
        assert_eq!(store.find_by_label(ParentKey::Root, "missing").unwrap(), None);
    }

    #[test]
    fn insert_under_missing_parent_is_an_error() {
        let store = store();
        assert!(store.insert_if_absent(ParentKey::Project(999), "rg").is_err());
    }

    #[test]
    fn test_logs_are_written_once() {
        let store = store();
        let group = seed_group(&store);

        let first = store.insert_test_if_absent(group, &sample_test()).unwrap();
        assert!(first.is_created());

        let mut changed = sample_test();
        changed.status = Status::Pass;
        changed.logs.push(TestLog {
            timestamp: None,
            text: "extra".into(),
        });
        let second = store.insert_test_if_absent(group, &changed).unwrap();
        assert_eq!(second, Insert::Existing(first.id()));

        let report_id = store.list_children(ParentKey::ReportGroup(1)).unwrap()[0].id;
        let report = store.load_report(report_id).unwrap().unwrap();
        let test = report.tests().next().unwrap();
        assert_eq!(test.status, Status::Fail);
        assert_eq!(test.logs.len(), 2);
    }

    #[test]
    fn load_report_group_hydrates_the_whole_tree() {
        let store = store();
        let group = seed_group(&store);
        store.insert_test_if_absent(group, &sample_test()).unwrap();

        let rg_id = store.report_groups().unwrap()[0].id;
        let rg = store.load_report_group(rg_id).unwrap().unwrap();
        assert_eq!(rg.label, "Workflow Run 1");
        assert_eq!(rg.reports.len(), 1);

        let report = &rg.reports[0];
        assert_eq!(report.label, "e2e-a");
        let test = report.group("pkg/auth").unwrap().test("TestLogin").unwrap();
        assert_eq!(test.status, Status::Fail);
        assert_eq!((test.start, test.end), (Some(100), Some(250)));
        let texts: Vec<_> = test.logs.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["dialing\n", "timeout\n"]);
        assert_eq!(test.logs[0].timestamp, Some(120));
        assert_eq!(test.logs[1].timestamp, None);
        assert!(test.id.is_some());
    }

    #[test]
    fn loading_missing_ids_yields_none() {
        let store = store();
        assert!(store.load_report_group(42).unwrap().is_none());
        assert!(store.load_report(42).unwrap().is_none());
        assert!(store.list_children(ParentKey::Report(42)).unwrap().is_empty());
    }

    #[test]
    fn empty_report_group_loads_with_no_reports() {
        let store = store();
        let project = store.insert_if_absent(ParentKey::Root, "default").unwrap().id();
        let rg = store.insert_if_absent(ParentKey::Project(project), "empty").unwrap().id();
        let loaded = store.load_report_group(rg).unwrap().unwrap();
        assert!(loaded.reports.is_empty());
        assert_eq!(loaded.time_window(), None);
    }

    #[test]
    fn atomically_rolls_back_on_error() {
        let store = store();
        let result: Result<()> = store.atomically(|s| {
            s.insert_if_absent(ParentKey::Root, "doomed")?;
            anyhow::bail!("abort");
        });
        assert!(result.is_err());
        assert!(store.list_children(ParentKey::Root).unwrap().is_empty());
        assert!(store.connection().is_autocommit());
    }

    #[test]
    fn atomically_nests_into_outer_transaction() {
        let store = store();
        store
            .atomically(|s| {
                s.insert_if_absent(ParentKey::Root, "outer")?;
                s.atomically(|inner| inner.insert_if_absent(ParentKey::Root, "inner"))
            })
            .unwrap();
        assert_eq!(store.list_children(ParentKey::Root).unwrap().len(), 2);
    }
}
