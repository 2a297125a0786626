//! `tlog metrics`: cross-report pass/fail tallies, worst first.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use testlog_core::cache::LoadSource;
use testlog_core::metrics::{TestMetrics, sort_by_pass_rate};

use super::Project;
use crate::output::{OutputMode, format_rate, pretty_rule, render_mode};

#[derive(Args, Debug, Default)]
pub struct MetricsArgs {
    /// Show at most this many tests.
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MetricsRow {
    #[serde(flatten)]
    metrics: TestMetrics,
    pass_rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MetricsPayload {
    source: LoadSource,
    total: usize,
    metrics: Vec<MetricsRow>,
}

/// Execute `tlog metrics`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or the cache is cold
/// and the store cannot be read.
pub fn run_metrics(args: &MetricsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let _lock = project.read_lock(output)?;
    let store = project.open_store(output)?;
    let loaded = project.cache().metrics(&store)?;

    let payload = build_payload(loaded.value, loaded.source, args.limit);
    render_mode(output, &payload, render_text, render_pretty)
}

fn build_payload(mut metrics: Vec<TestMetrics>, source: LoadSource, limit: Option<usize>) -> MetricsPayload {
    let total = metrics.len();
    sort_by_pass_rate(&mut metrics);
    if let Some(limit) = limit {
        metrics.truncate(limit);
    }
    MetricsPayload {
        source,
        total,
        metrics: metrics
            .into_iter()
            .map(|m| MetricsRow {
                pass_rate: m.pass_rate(),
                metrics: m,
            })
            .collect(),
    }
}

fn render_text(p: &MetricsPayload, w: &mut dyn Write) -> std::io::Result<()> {
    for row in &p.metrics {
        let m = &row.metrics;
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            m.test_label,
            m.pass_count,
            m.fail_count,
            format_rate(row.pass_rate)
        )?;
    }
    Ok(())
}

fn render_pretty(p: &MetricsPayload, w: &mut dyn Write) -> std::io::Result<()> {
    if p.metrics.is_empty() {
        return writeln!(w, "No test results stored yet. Run `tlog ingest` first.");
    }
    let width = p
        .metrics
        .iter()
        .map(|r| r.metrics.test_label.len())
        .max()
        .unwrap_or(0)
        .max(4);

    writeln!(w, "{:<width$}  {:>6}  {:>6}  {:>7}", "TEST", "PASS", "FAIL", "RATE")?;
    pretty_rule(w)?;
    for row in &p.metrics {
        let m = &row.metrics;
        writeln!(
            w,
            "{:<width$}  {:>6}  {:>6}  {:>7}",
            m.test_label,
            m.pass_count,
            m.fail_count,
            format_rate(row.pass_rate)
        )?;
    }
    if p.metrics.len() < p.total {
        writeln!(w, "... {} more", p.total - p.metrics.len())?;
    }
    if p.source == LoadSource::Cache {
        writeln!(w, "(cached)")?;
    }
    Ok(())
}
