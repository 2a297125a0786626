//! Persist per-report test tallies for reports that do not have them yet.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use super::test_metrics;
use crate::db::{RecordStore, SqliteStore};

/// Summary of one [`analyze_pending`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzeReport {
    /// Reports whose tallies were computed.
    pub analyzed: usize,
    /// Tally rows written.
    pub metrics_written: usize,
    /// Reports that vanished before they could be loaded.
    pub missing: usize,
}

/// Compute and store [`test_metrics`] for every report lacking persisted
/// tallies. Reports with no tests produce no rows and are revisited on the
/// next run.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written.
pub fn analyze_pending(store: &SqliteStore) -> Result<AnalyzeReport> {
    let pending = store.report_ids_without_test_metrics()?;
    let mut summary = AnalyzeReport::default();

    store.atomically(|store| {
        for report_id in &pending {
            let Some(report) = store.load_report(*report_id)? else {
                summary.missing += 1;
                continue;
            };
            let metrics = test_metrics(&report);
            let written = store.store_report_test_metrics(*report_id, &metrics)?;
            debug!(report_id, label = %report.label, written, "analyzed report");
            summary.analyzed += 1;
            summary.metrics_written += written;
        }
        Ok(())
    })?;

    info!(
        pending = pending.len(),
        analyzed = summary.analyzed,
        metrics_written = summary.metrics_written,
        "analysis complete"
    );
    Ok(summary)
}
