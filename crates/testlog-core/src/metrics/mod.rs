//! Derived pass/fail views over report hierarchies.
//!
//! Three independent computations:
//!
//! - [`test_metrics`]: per-test tallies within one report. Tests sharing a
//!   label across packages are merged into one entry.
//! - [`report_metrics`]: one flat tally per report of a report group.
//! - [`test_history`]: one [`TestHistory`] record per test occurrence.
//!
//! [`MetricsEngine`] runs the cross-report variants over every report group
//! in a store. Only `pass` and `fail` are counted; `skip` and `pending`
//! tests still get a (possibly `0/0`) entry but contribute to neither count.

pub mod analyze;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::RecordStore;
use crate::report::{Report, ReportGroup, Status};

// ---------------------------------------------------------------------------
// TestMetrics
// ---------------------------------------------------------------------------

/// Pass/fail tally for one test label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestMetrics {
    pub test_label: String,
    pub pass_count: u64,
    pub fail_count: u64,
}

impl TestMetrics {
    /// A zero tally for `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            test_label: label.into(),
            pass_count: 0,
            fail_count: 0,
        }
    }

    /// Count one test result. `skip` and `pending` are ignored.
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.pass_count += 1,
            Status::Fail => self.fail_count += 1,
            Status::Skip | Status::Pending => {}
        }
    }

    /// Number of terminal pass/fail results.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pass_count + self.fail_count
    }

    /// `pass / (pass + fail)`, or `None` when there are no results.
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        rate(self.pass_count, self.total())
    }

    /// `fail / (pass + fail)`, or `None` when there are no results.
    #[must_use]
    pub fn fail_rate(&self) -> Option<f64> {
        rate(self.fail_count, self.total())
    }
}

/// Sums counts and keeps the left-hand label.
///
/// Associative and commutative in the counts, so per-report tallies can be
/// merged in any order. Callers merge only tallies that share a label.
impl Add for TestMetrics {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl AddAssign for TestMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.pass_count += rhs.pass_count;
        self.fail_count += rhs.fail_count;
    }
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}

// ---------------------------------------------------------------------------
// ReportMetrics / TestHistory
// ---------------------------------------------------------------------------

/// Flat pass/fail tally for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetrics {
    /// Store id of the report; `None` for reports never persisted.
    pub report_id: Option<i64>,
    pub label: String,
    pub pass_count: u64,
    pub fail_count: u64,
}

impl ReportMetrics {
    /// `pass / (pass + fail)`, or `None` when there are no results.
    #[must_use]
    pub fn pass_rate(&self) -> Option<f64> {
        rate(self.pass_count, self.pass_count + self.fail_count)
    }
}

/// One test occurrence in one report.
///
/// `passed` is `status == pass`, so skipped and pending tests are reported
/// as not passed, indistinguishable from failures. Consumers that need the
/// skip/fail distinction must read the hierarchy instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestHistory {
    pub test_label: String,
    /// Report group label.
    pub group_label: String,
    /// Report label.
    pub subgroup_label: String,
    pub passed: bool,
}

// ---------------------------------------------------------------------------
// Computations
// ---------------------------------------------------------------------------

/// Per-test tallies within one report, sorted by label.
#[must_use]
pub fn test_metrics(report: &Report) -> Vec<TestMetrics> {
    let mut by_label: BTreeMap<&str, TestMetrics> = BTreeMap::new();
    for test in report.tests() {
        by_label
            .entry(test.label.as_str())
            .or_insert_with(|| TestMetrics::new(test.label.clone()))
            .record(test.status);
    }
    by_label.into_values().collect()
}

/// One tally per report of `group`, in report order.
#[must_use]
pub fn report_metrics(group: &ReportGroup) -> Vec<ReportMetrics> {
    group
        .reports
        .iter()
        .map(|report| {
            let mut tally = TestMetrics::new(report.label.clone());
            for test in report.tests() {
                tally.record(test.status);
            }
            ReportMetrics {
                report_id: report.id,
                label: tally.test_label,
                pass_count: tally.pass_count,
                fail_count: tally.fail_count,
            }
        })
        .collect()
}

/// One history record per test occurrence of `group`, in tree order.
#[must_use]
pub fn test_history(group: &ReportGroup) -> Vec<TestHistory> {
    group
        .reports
        .iter()
        .flat_map(|report| {
            report.tests().map(|test| TestHistory {
                test_label: test.label.clone(),
                group_label: group.label.clone(),
                subgroup_label: report.label.clone(),
                passed: test.status == Status::Pass,
            })
        })
        .collect()
}

/// Combine tallies by label with [`Add`]; output is sorted by label.
pub fn merge_test_metrics(metrics: impl IntoIterator<Item = TestMetrics>) -> Vec<TestMetrics> {
    let mut by_label: BTreeMap<String, TestMetrics> = BTreeMap::new();
    for m in metrics {
        match by_label.get_mut(&m.test_label) {
            Some(acc) => *acc += m,
            None => {
                by_label.insert(m.test_label.clone(), m);
            }
        }
    }
    by_label.into_values().collect()
}

/// Sort ascending by pass rate (worst first). Tallies without results sort
/// last; ties break on label.
pub fn sort_by_pass_rate(metrics: &mut [TestMetrics]) {
    metrics.sort_by(|a, b| {
        let by_rate = match (a.pass_rate(), b.pass_rate()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_rate.then_with(|| a.test_label.cmp(&b.test_label))
    });
}

fn sort_tree(group: &mut ReportGroup) {
    group.reports.sort_by(|a, b| a.label.cmp(&b.label));
    for report in &mut group.reports {
        report.test_groups.sort_by(|a, b| a.label.cmp(&b.label));
        for tg in &mut report.test_groups {
            tg.tests.sort_by(|a, b| a.label.cmp(&b.label));
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsEngine
// ---------------------------------------------------------------------------

/// Cross-report aggregation over every report group in a store.
pub struct MetricsEngine<'s, S> {
    store: &'s S,
}

impl<'s, S: RecordStore> MetricsEngine<'s, S> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Every stored report group, hydrated, in id order. Groups deleted
    /// between listing and loading are skipped.
    fn load_all(&self) -> Result<Vec<ReportGroup>> {
        let mut groups = Vec::new();
        for child in self.store.report_groups()? {
            if let Some(group) = self.store.load_report_group(child.id)? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Per-test tallies merged across every report, sorted by label.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn cross_report_metrics(&self) -> Result<Vec<TestMetrics>> {
        let groups = self.load_all()?;
        let merged = merge_test_metrics(
            groups
                .iter()
                .flat_map(|g| g.reports.iter())
                .flat_map(test_metrics),
        );
        info!(
            report_groups = groups.len(),
            tests = merged.len(),
            "computed cross-report metrics"
        );
        Ok(merged)
    }

    /// History records for every test occurrence, ordered by report group
    /// id, then report, test group and test label.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn cross_report_history(&self) -> Result<Vec<TestHistory>> {
        let mut groups = self.load_all()?;
        let mut history = Vec::new();
        for group in &mut groups {
            sort_tree(group);
            history.extend(test_history(group));
        }
        info!(
            report_groups = groups.len(),
            records = history.len(),
            "computed cross-report history"
        );
        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
