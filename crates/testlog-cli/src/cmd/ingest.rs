//! `tlog ingest`: load every artifact into the report store.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use testlog_core::config::{ARTIFACT_DIR_ENV, resolve_artifact_dir};
use testlog_core::error::ErrorCode;
use testlog_core::ingest::{IngestOptions, IngestSummary, ingest_all};
use testlog_core::source::DirectorySource;

use super::Project;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug, Default)]
pub struct IngestArgs {
    /// Artifact directory (overrides `TESTLOG_ARTIFACT_DIR` and config).
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Only ingest artifacts whose name contains this substring.
    #[arg(long)]
    pub filter: Option<String>,

    /// Invalidate the aggregate cache after ingesting.
    #[arg(long)]
    pub clear_cache: bool,
}

#[derive(Debug, Serialize)]
struct IngestReport {
    artifact_dir: PathBuf,
    project: String,
    #[serde(flatten)]
    summary: IngestSummary,
    cache_cleared: bool,
}

/// Execute `tlog ingest` under the single-writer lock.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the lock is busy,
/// the artifact directory is missing, or the store rejects a write.
pub fn run_ingest(args: &IngestArgs, output: OutputMode, quiet: bool, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let artifact_dir = resolve_artifact_dir(
        args.artifact_dir.as_deref(),
        std::env::var(ARTIFACT_DIR_ENV).ok(),
        &project.config,
        &project.paths,
    );

    let source = DirectorySource::new(&artifact_dir);
    if !artifact_dir.is_dir() {
        return Err(fail(
            output,
            ErrorCode::ArtifactNotFound,
            format!("artifact directory {} does not exist", artifact_dir.display()),
        ));
    }

    let _lock = project.write_lock(output)?;
    let store = project.open_store(output)?;
    let options = IngestOptions {
        project: project.config.project.label.clone(),
        filter: args
            .filter
            .clone()
            .or_else(|| project.config.ingest.artifact_filter.clone()),
    };
    let summary = ingest_all(&source, &store, &options)?;

    let cache_cleared = if args.clear_cache {
        project
            .cache()
            .invalidate()
            .map_err(|e| fail(output, e.code(), e.to_string()))?;
        true
    } else {
        false
    };

    let report = IngestReport {
        artifact_dir,
        project: options.project,
        summary,
        cache_cleared,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            let s = &r.summary;
            writeln!(
                w,
                "ingested={} failed={} filtered={} events={} parse_errors={} created={} existing={}",
                s.ingested, s.failed, s.filtered, s.events, s.parse_errors, s.created, s.existing
            )
        },
        |r, w| render_pretty(r, quiet, w),
    )
}

fn render_pretty(r: &IngestReport, quiet: bool, w: &mut dyn Write) -> std::io::Result<()> {
    let s = &r.summary;
    pretty_section(w, &format!("Ingested {} of {} artifacts", s.ingested, s.listed))?;
    pretty_kv(w, "project", &r.project)?;
    pretty_kv(w, "source", r.artifact_dir.display().to_string())?;
    pretty_kv(w, "events", s.events.to_string())?;
    pretty_kv(w, "new rows", s.created.to_string())?;
    pretty_kv(w, "existing", s.existing.to_string())?;
    if s.parse_errors > 0 {
        pretty_kv(w, "malformed", format!("{} lines dropped", s.parse_errors))?;
    }
    if s.failed > 0 {
        pretty_kv(w, "failed", format!("{} artifacts unreadable", s.failed))?;
    }
    if s.filtered > 0 {
        pretty_kv(w, "filtered", s.filtered.to_string())?;
    }
    if r.cache_cleared {
        pretty_kv(w, "cache", "cleared")?;
    } else if s.created > 0 && !quiet {
        writeln!(w)?;
        writeln!(w, "note: cached metrics do not include new reports until `tlog cache clear`")?;
    }
    Ok(())
}
