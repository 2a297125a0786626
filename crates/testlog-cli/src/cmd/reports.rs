//! `tlog reports`: per-report pass/fail tallies, grouped by report group.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use testlog_core::db::{Child, RecordStore, SqliteStore};
use testlog_core::error::ErrorCode;
use testlog_core::metrics::{ReportMetrics, report_metrics};

use super::Project;
use crate::output::{OutputMode, fail, format_rate, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct ReportsArgs {
    /// Report group label (e.g. "Workflow Run 42"). All groups when omitted.
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReportRow {
    #[serde(flatten)]
    metrics: ReportMetrics,
    pass_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct GroupReports {
    id: i64,
    label: String,
    reports: Vec<ReportRow>,
}

/// Execute `tlog reports`.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the named group does
/// not exist, or the store cannot be read.
pub fn run_reports(args: &ReportsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let store = project.open_store(output)?;

    let groups = match &args.group {
        Some(label) => vec![find_group(&store, label, output)?],
        None => store.report_groups()?,
    };
    let payload = collect(&store, &groups)?;

    render_mode(
        output,
        &payload,
        |groups, w| {
            for g in groups {
                for r in &g.reports {
                    writeln!(
                        w,
                        "{}\t{}\t{}\t{}\t{}",
                        g.label,
                        r.metrics.label,
                        r.metrics.pass_count,
                        r.metrics.fail_count,
                        format_rate(r.pass_rate)
                    )?;
                }
            }
            Ok(())
        },
        render_pretty,
    )
}

/// Look up a report group by label, rendering `ReportGroupNotFound` if absent.
pub(crate) fn find_group(store: &SqliteStore, label: &str, output: OutputMode) -> Result<Child> {
    store.find_report_group(label)?.ok_or_else(|| {
        fail(
            output,
            ErrorCode::ReportGroupNotFound,
            format!("no report group labelled '{label}'"),
        )
    })
}

fn collect<S: RecordStore>(store: &S, groups: &[Child]) -> Result<Vec<GroupReports>> {
    let mut out = Vec::with_capacity(groups.len());
    for child in groups {
        let Some(group) = store.load_report_group(child.id)? else {
            continue;
        };
        let reports = report_metrics(&group)
            .into_iter()
            .map(|m| ReportRow {
                pass_rate: m.pass_rate(),
                metrics: m,
            })
            .collect();
        out.push(GroupReports {
            id: child.id,
            label: child.label.clone(),
            reports,
        });
    }
    Ok(out)
}

#[allow(clippy::ptr_arg)]
fn render_pretty(groups: &Vec<GroupReports>, w: &mut dyn Write) -> std::io::Result<()> {
    if groups.is_empty() {
        return writeln!(w, "No report groups stored yet. Run `tlog ingest` first.");
    }
    for (i, g) in groups.iter().enumerate() {
        if i > 0 {
            writeln!(w)?;
        }
        pretty_section(w, &format!("{} ({} reports)", g.label, g.reports.len()))?;
        for r in &g.reports {
            writeln!(
                w,
                "  {:<32} pass {:>4}  fail {:>4}  {:>7}",
                r.metrics.label,
                r.metrics.pass_count,
                r.metrics.fail_count,
                format_rate(r.pass_rate)
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testlog_core::db::ingest::Ingestor;
    use testlog_core::event::parse_events;
    use testlog_core::report::build_report;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store);
        let project = ingestor.ensure_project("default").unwrap();
        let group = ingestor.ensure_report_group(project, "Workflow Run 1").unwrap();
        let stream = b"{\"action\":\"pass\",\"package\":\"p\",\"test\":\"a\"}\n\
                       {\"action\":\"fail\",\"package\":\"p\",\"test\":\"b\"}\n";
        let report = build_report("e2e", &parse_events(stream).events);
        ingestor.store_report(group, &report).unwrap();
        store
    }

    #[test]
    fn collect_tallies_each_report() {
        let store = seeded_store();
        let groups = store.report_groups().unwrap();
        let payload = collect(&store, &groups).unwrap();

        assert_eq!(payload.len(), 1);
        assert_eq!(payload[0].label, "Workflow Run 1");
        let row = &payload[0].reports[0];
        assert_eq!((row.metrics.pass_count, row.metrics.fail_count), (1, 1));
        assert_eq!(row.pass_rate, Some(0.5));
    }

    #[test]
    fn unknown_group_is_reported() {
        let store = seeded_store();
        let err = find_group(&store, "Workflow Run 9", OutputMode::Json).unwrap_err();
        assert!(err.to_string().contains("E2002"));
    }
}
