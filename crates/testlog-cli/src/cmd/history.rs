//! `tlog history`: one record per test occurrence across every report.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use testlog_core::cache::LoadSource;
use testlog_core::metrics::TestHistory;

use super::Project;
use crate::output::{OutputMode, pretty_rule, render_mode};

#[derive(Args, Debug, Default)]
pub struct HistoryArgs {
    /// Only show occurrences of this test.
    #[arg(long)]
    pub test: Option<String>,

    /// Only show occurrences that did not pass (failed, skipped or pending).
    #[arg(long)]
    pub not_passed: bool,
}

#[derive(Debug, Serialize)]
struct HistoryPayload {
    source: LoadSource,
    records: Vec<TestHistory>,
}

/// Execute `tlog history`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the cache is cold
/// and the store cannot be read.
pub fn run_history(args: &HistoryArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let _lock = project.read_lock(output)?;
    let store = project.open_store(output)?;
    let loaded = project.cache().history(&store)?;

    let payload = HistoryPayload {
        source: loaded.source,
        records: select(loaded.value, args),
    };
    render_mode(
        output,
        &payload,
        |p, w| {
            for h in &p.records {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    h.group_label,
                    h.subgroup_label,
                    h.test_label,
                    if h.passed { "pass" } else { "not-pass" }
                )?;
            }
            Ok(())
        },
        render_pretty,
    )
}

fn select(records: Vec<TestHistory>, args: &HistoryArgs) -> Vec<TestHistory> {
    records
        .into_iter()
        .filter(|h| args.test.as_deref().is_none_or(|t| h.test_label == t))
        .filter(|h| !args.not_passed || !h.passed)
        .collect()
}

fn render_pretty(p: &HistoryPayload, w: &mut dyn Write) -> std::io::Result<()> {
    if p.records.is_empty() {
        return writeln!(w, "No matching test history.");
    }
    let mut current_group: Option<&str> = None;
    for h in &p.records {
        if current_group != Some(h.group_label.as_str()) {
            if current_group.is_some() {
                writeln!(w)?;
            }
            writeln!(w, "{}", h.group_label)?;
            pretty_rule(w)?;
            current_group = Some(h.group_label.as_str());
        }
        let mark = if h.passed { "✓" } else { "✗" };
        writeln!(w, "  {mark} {:<32} {}", h.test_label, h.subgroup_label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(test: &str, report: &str, passed: bool) -> TestHistory {
        TestHistory {
            test_label: test.into(),
            group_label: "Workflow Run 1".into(),
            subgroup_label: report.into(),
            passed,
        }
    }

    #[test]
    fn selection_filters_by_test_and_outcome() {
        let records = vec![
            record("t", "A", true),
            record("t", "B", false),
            record("u", "A", false),
        ];

        let by_test = select(
            records.clone(),
            &HistoryArgs {
                test: Some("t".into()),
                not_passed: false,
            },
        );
        assert_eq!(by_test.len(), 2);

        let failing = select(
            records,
            &HistoryArgs {
                test: None,
                not_passed: true,
            },
        );
        let got: Vec<_> = failing.iter().map(|h| (h.test_label.as_str(), h.subgroup_label.as_str())).collect();
        assert_eq!(got, [("t", "B"), ("u", "A")]);
    }

    #[test]
    fn pretty_groups_by_report_group() {
        let payload = HistoryPayload {
            source: LoadSource::Rebuilt,
            records: vec![record("t", "A", true), record("t", "B", false)],
        };
        let mut buf = Vec::new();
        render_pretty(&payload, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("Workflow Run 1").count(), 1);
        assert!(text.contains("✓ t"));
        assert!(text.contains("✗ t"));
    }
}
