//! `tlog cache`: inspect or invalidate the aggregate cache.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use testlog_core::cache::ArtifactState;

use super::Project;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render, render_mode};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    #[command(
        about = "Show whether cached aggregates are warm",
        after_help = "EXAMPLES:\n    tlog cache status\n    tlog cache status --json"
    )]
    Status,

    #[command(
        about = "Delete cached aggregates so the next read rebuilds them",
        after_help = "EXAMPLES:\n    # Refresh metrics after ingesting new runs\n    tlog cache clear && tlog metrics"
    )]
    Clear,
}

#[derive(Debug, Serialize)]
struct ClearReport {
    dir: PathBuf,
    removed: usize,
}

/// Execute `tlog cache <command>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or a cache file
/// cannot be removed.
pub fn run_cache(command: &CacheCommand, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::load(project_root, output)?;
    let cache = project.cache();

    match command {
        CacheCommand::Status => {
            let status = cache.status();
            render_mode(
                output,
                &status,
                |s, w| {
                    writeln!(w, "metrics\t{}", state_label(s.metrics))?;
                    writeln!(w, "history\t{}", state_label(s.history))
                },
                |s, w| {
                    pretty_section(w, "Aggregate cache")?;
                    pretty_kv(w, "dir", s.dir.display().to_string())?;
                    pretty_kv(w, "metrics", state_label(s.metrics))?;
                    pretty_kv(w, "history", state_label(s.history))
                },
            )
        }
        CacheCommand::Clear => {
            let removed = cache
                .invalidate()
                .map_err(|e| fail(output, e.code(), e.to_string()))?;
            let report = ClearReport {
                dir: cache.dir().to_path_buf(),
                removed,
            };
            render(output, &report, |r, w| {
                writeln!(w, "✓ Cleared {} cached aggregate file(s)", r.removed)
            })
        }
    }
}

fn state_label(state: ArtifactState) -> String {
    match state {
        ArtifactState::Warm { entries } => format!("warm ({entries} entries)"),
        ArtifactState::Missing => "cold (missing)".to_string(),
        ArtifactState::Invalid => "cold (invalid)".to_string(),
    }
}
