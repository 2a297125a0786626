//! Write built report trees into a [`RecordStore`].
//!
//! The [`Ingestor`] walks a [`Report`] top-down, inserting each level with
//! insert-if-absent semantics inside one store transaction. Writing the same
//! report twice leaves the store unchanged; the second run reports every
//! entity as existing.

use anyhow::Result;
use tracing::debug;

use super::{Insert, ParentKey, RecordStore};
use crate::report::Report;

// ---------------------------------------------------------------------------
// IngestStats
// ---------------------------------------------------------------------------

/// Entity counts from one [`Ingestor::store_report`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Entities (report, test groups, tests) newly written.
    pub created: usize,
    /// Entities that were already stored and left untouched.
    pub existing: usize,
}

impl IngestStats {
    fn record(&mut self, insert: Insert) -> i64 {
        if insert.is_created() {
            self.created += 1;
        } else {
            self.existing += 1;
        }
        insert.id()
    }
}

impl std::ops::AddAssign for IngestStats {
    fn add_assign(&mut self, rhs: Self) {
        self.created += rhs.created;
        self.existing += rhs.existing;
    }
}

// ---------------------------------------------------------------------------
// Ingestor
// ---------------------------------------------------------------------------

/// Writes report trees through a store handle.
pub struct Ingestor<'s, S> {
    store: &'s S,
}

impl<'s, S: RecordStore> Ingestor<'s, S> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Id of the project labelled `label`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn ensure_project(&self, label: &str) -> Result<i64> {
        Ok(self.store.insert_if_absent(ParentKey::Root, label)?.id())
    }

    /// Id of report group `label` under `project_id`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the project does not exist.
    pub fn ensure_report_group(&self, project_id: i64, label: &str) -> Result<i64> {
        Ok(self
            .store
            .insert_if_absent(ParentKey::Project(project_id), label)?
            .id())
    }

    /// Store `report` under report group `group_id`.
    ///
    /// The whole report is written in one transaction: either every new
    /// entity lands or none does.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; the transaction is rolled back.
    pub fn store_report(&self, group_id: i64, report: &Report) -> Result<IngestStats> {
        let stats = self.store.atomically(|store| {
            let mut stats = IngestStats::default();
            let report_id =
                stats.record(store.insert_if_absent(ParentKey::ReportGroup(group_id), &report.label)?);

            for group in &report.test_groups {
                let group_id =
                    stats.record(store.insert_if_absent(ParentKey::Report(report_id), &group.label)?);
                for test in &group.tests {
                    stats.record(store.insert_test_if_absent(group_id, test)?);
                }
            }
            Ok(stats)
        })?;

        debug!(
            report = %report.label,
            created = stats.created,
            existing = stats.existing,
            "stored report"
        );
        Ok(stats)
    }
}
