//! `tlog analyze`: persist per-report test tallies for new reports.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use testlog_core::metrics::analyze::analyze_pending;

use super::Project;
use crate::output::{OutputMode, render};

/// Execute `tlog analyze` under the single-writer lock.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the lock is busy,
/// or the store cannot be read or written.
pub fn run_analyze(output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let _lock = project.write_lock(output)?;
    let store = project.open_store(output)?;

    let report = analyze_pending(&store)?;
    render(output, &report, |r, w| {
        writeln!(
            w,
            "analyzed {} reports, wrote {} test tallies",
            r.analyzed, r.metrics_written
        )?;
        if r.missing > 0 {
            writeln!(w, "{} reports disappeared during analysis", r.missing)?;
        }
        Ok(())
    })
}
