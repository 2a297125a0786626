//! `tlog show`: the full hierarchy of one report group.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::DateTime;
use clap::Args;
use testlog_core::db::RecordStore;
use testlog_core::error::ErrorCode;
use testlog_core::report::{ReportGroup, Status, TimeWindow};

use super::Project;
use super::reports::find_group;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ShowArgs {
    /// Report group label. The first stored group when omitted.
    pub group: Option<String>,

    /// Include captured test output.
    #[arg(long)]
    pub logs: bool,
}

/// Execute `tlog show`.
///
/// # Errors
///
/// Returns an error if the project is not initialized, no matching group
/// exists, or the store cannot be read.
pub fn run_show(args: &ShowArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let store = project.open_store(output)?;

    let child = match &args.group {
        Some(label) => find_group(&store, label, output)?,
        None => store.first_report_group()?.ok_or_else(|| {
            fail(output, ErrorCode::ReportGroupNotFound, "no report groups stored yet")
        })?,
    };
    let group = store.load_report_group(child.id)?.ok_or_else(|| {
        fail(
            output,
            ErrorCode::ReportGroupNotFound,
            format!("report group '{}' vanished while loading", child.label),
        )
    })?;

    let logs = args.logs;
    render_mode(
        output,
        &group,
        |g, w| render_text(g, w),
        |g, w| render_pretty(g, logs, w),
    )
}

fn render_text(group: &ReportGroup, w: &mut dyn Write) -> std::io::Result<()> {
    for report in &group.reports {
        for tg in &report.test_groups {
            for test in &tg.tests {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    group.label, report.label, tg.label, test.label, test.status
                )?;
            }
        }
    }
    Ok(())
}

fn render_pretty(group: &ReportGroup, logs: bool, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &group.label)?;
    pretty_kv(w, "reports", group.reports.len().to_string())?;
    pretty_kv(w, "window", format_window(group.time_window()))?;

    for report in &group.reports {
        writeln!(w)?;
        writeln!(w, "{}  [{}]", report.label, format_window(report.time_window()))?;
        for tg in &report.test_groups {
            writeln!(w, "  {}", tg.label)?;
            for test in &tg.tests {
                writeln!(w, "    {} {}", status_mark(test.status), test.label)?;
                if logs {
                    for log in &test.logs {
                        writeln!(w, "        | {}", log.text.trim_end_matches('\n'))?;
                    }
                }
            }
        }
    }
    Ok(())
}

const fn status_mark(status: Status) -> &'static str {
    match status {
        Status::Pass => "✓",
        Status::Fail => "✗",
        Status::Skip => "-",
        Status::Pending => "?",
    }
}

fn format_window(window: Option<TimeWindow>) -> String {
    let Some(window) = window else {
        return "untimed".to_string();
    };
    let fmt = |ms: i64| {
        DateTime::from_timestamp_millis(ms)
            .map_or_else(|| ms.to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    };
    let secs = (window.end - window.start) / 1000;
    format!("{} .. {} ({secs}s)", fmt(window.start), fmt(window.end))
}
