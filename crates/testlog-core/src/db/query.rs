//! Read helpers and persisted per-report metrics on [`SqliteStore`].
//!
//! These sit outside the [`RecordStore`](super::RecordStore) contract: they
//! are SQLite-specific conveniences for the CLI, the analysis step, and
//! idempotence checks.

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params, types::Type};
use serde::Serialize;

use super::{Child, SqliteStore};
use crate::metrics::TestMetrics;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Row counts per hierarchy table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub projects: u64,
    pub report_groups: u64,
    pub reports: u64,
    pub test_groups: u64,
    pub tests: u64,
    pub test_logs: u64,
    pub report_test_metrics: u64,
}

impl EntityCounts {
    /// Sum of every hierarchy row, excluding persisted metrics.
    #[must_use]
    pub const fn hierarchy_rows(&self) -> u64 {
        self.projects + self.report_groups + self.reports + self.test_groups + self.tests + self.test_logs
    }
}

fn count_to_u64(idx: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Count rows in every hierarchy table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entity_counts(&self) -> Result<EntityCounts> {
        self.conn
            .query_row(
                "SELECT
                    (SELECT COUNT(*) FROM projects),
                    (SELECT COUNT(*) FROM report_groups),
                    (SELECT COUNT(*) FROM reports),
                    (SELECT COUNT(*) FROM test_groups),
                    (SELECT COUNT(*) FROM tests),
                    (SELECT COUNT(*) FROM test_logs),
                    (SELECT COUNT(*) FROM report_test_metrics)",
                [],
                |row| {
                    Ok(EntityCounts {
                        projects: count_to_u64(0, row.get(0)?)?,
                        report_groups: count_to_u64(1, row.get(1)?)?,
                        reports: count_to_u64(2, row.get(2)?)?,
                        test_groups: count_to_u64(3, row.get(3)?)?,
                        tests: count_to_u64(4, row.get(4)?)?,
                        test_logs: count_to_u64(5, row.get(5)?)?,
                        report_test_metrics: count_to_u64(6, row.get(6)?)?,
                    })
                },
            )
            .context("count store entities")
    }

    /// Lowest-id report group, if any exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn first_report_group(&self) -> Result<Option<Child>> {
        self.conn
            .query_row(
                "SELECT report_group_id, label FROM report_groups ORDER BY report_group_id LIMIT 1",
                [],
                |row| {
                    Ok(Child {
                        id: row.get(0)?,
                        label: row.get(1)?,
                    })
                },
            )
            .optional()
            .context("query first report group")
    }

    /// Report group with `label` in any project; the lowest id wins when
    /// several projects share the label.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_report_group(&self, label: &str) -> Result<Option<Child>> {
        self.conn
            .query_row(
                "SELECT report_group_id, label FROM report_groups
                 WHERE label = ?1
                 ORDER BY report_group_id
                 LIMIT 1",
                params![label],
                |row| {
                    Ok(Child {
                        id: row.get(0)?,
                        label: row.get(1)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("find report group '{label}'"))
    }

    // -----------------------------------------------------------------------
    // Persisted per-report test metrics
    // -----------------------------------------------------------------------

    /// Persist per-test tallies for one report. Labels already stored for
    /// the report are left untouched. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails (e.g. unknown `report_id`).
    pub fn store_report_test_metrics(&self, report_id: i64, metrics: &[TestMetrics]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO report_test_metrics (report_id, test_label, pass_count, fail_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (report_id, test_label) DO NOTHING",
        )?;

        let mut written = 0;
        for m in metrics {
            let pass = i64::try_from(m.pass_count).context("pass count overflow")?;
            let fail = i64::try_from(m.fail_count).context("fail count overflow")?;
            written += stmt
                .execute(params![report_id, m.test_label, pass, fail])
                .with_context(|| format!("store metrics for '{}' in report {report_id}", m.test_label))?;
        }
        Ok(written)
    }

    /// Persisted tallies for one report, ordered by test label.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn report_test_metrics(&self, report_id: i64) -> Result<Vec<TestMetrics>> {
        self.conn
            .prepare_cached(
                "SELECT test_label, pass_count, fail_count
                 FROM report_test_metrics
                 WHERE report_id = ?1
                 ORDER BY test_label",
            )?
            .query_map(params![report_id], |row| {
                Ok(TestMetrics {
                    test_label: row.get(0)?,
                    pass_count: count_to_u64(1, row.get(1)?)?,
                    fail_count: count_to_u64(2, row.get(2)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("load metrics for report {report_id}"))
    }

    /// Ids of reports that already have persisted tallies.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn report_ids_with_test_metrics(&self) -> Result<Vec<i64>> {
        self.report_ids(
            "SELECT DISTINCT report_id FROM report_test_metrics ORDER BY report_id",
        )
    }

    /// Ids of reports without persisted tallies.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn report_ids_without_test_metrics(&self) -> Result<Vec<i64>> {
        self.report_ids(
            "SELECT r.report_id
             FROM reports r
             WHERE NOT EXISTS (
                 SELECT 1 FROM report_test_metrics m WHERE m.report_id = r.report_id
             )
             ORDER BY r.report_id",
        )
    }

    fn report_ids(&self, sql: &str) -> Result<Vec<i64>> {
        self.conn
            .prepare_cached(sql)?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .context("list report ids")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ParentKey, RecordStore};

    fn store_with_reports(n: usize) -> (SqliteStore, Vec<i64>) {
        let store = SqliteStore::open_in_memory().unwrap();
        let project = store.insert_if_absent(ParentKey::Root, "default").unwrap().id();
        let rg = store
            .insert_if_absent(ParentKey::Project(project), "Workflow Run 1")
            .unwrap()
            .id();
        let ids = (0..n)
            .map(|i| {
                store
                    .insert_if_absent(ParentKey::ReportGroup(rg), &format!("e2e-{i}"))
                    .unwrap()
                    .id()
            })
            .collect();
        (store, ids)
    }

    fn tm(label: &str, pass: u64, fail: u64) -> TestMetrics {
        TestMetrics {
            test_label: label.into(),
            pass_count: pass,
            fail_count: fail,
        }
    }

    #[test]
    fn empty_store_has_zero_counts() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.entity_counts().unwrap(), EntityCounts::default());
        assert_eq!(store.first_report_group().unwrap(), None);
    }

    #[test]
    fn counts_track_inserted_rows() {
        let (store, _) = store_with_reports(2);
        let counts = store.entity_counts().unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.report_groups, 1);
        assert_eq!(counts.reports, 2);
        assert_eq!(counts.hierarchy_rows(), 4);
    }

    #[test]
    fn report_metrics_are_written_once_per_label() {
        let (store, ids) = store_with_reports(1);
        let written = store
            .store_report_test_metrics(ids[0], &[tm("TestB", 1, 0), tm("TestA", 0, 1)])
            .unwrap();
        assert_eq!(written, 2);

        let again = store.store_report_test_metrics(ids[0], &[tm("TestA", 9, 9)]).unwrap();
        assert_eq!(again, 0);

        let stored = store.report_test_metrics(ids[0]).unwrap();
        assert_eq!(stored, vec![tm("TestA", 0, 1), tm("TestB", 1, 0)]);
    }

    #[test]
    fn reports_split_by_metrics_presence() {
        let (store, ids) = store_with_reports(3);
        store.store_report_test_metrics(ids[1], &[tm("t", 1, 0)]).unwrap();

        assert_eq!(store.report_ids_with_test_metrics().unwrap(), vec![ids[1]]);
        assert_eq!(store.report_ids_without_test_metrics().unwrap(), vec![ids[0], ids[2]]);
    }

    #[test]
    fn metrics_for_unknown_report_fail() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.store_report_test_metrics(77, &[tm("t", 1, 0)]).is_err());
    }

    #[test]
    fn find_report_group_by_label() {
        let (store, _) = store_with_reports(0);
        let found = store.find_report_group("Workflow Run 1").unwrap().unwrap();
        assert_eq!(found.label, "Workflow Run 1");
        assert_eq!(store.first_report_group().unwrap(), Some(found));
        assert_eq!(store.find_report_group("Workflow Run 2").unwrap(), None);
    }
}
