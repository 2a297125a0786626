//! `tlog import`: copy a `go test -json` stream into the artifact directory.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use testlog_core::config::{ARTIFACT_DIR_ENV, ProjectPaths, load_project_config, resolve_artifact_dir};
use testlog_core::event::parse_events;
use testlog_core::source::{ArtifactRef, DirectorySource};

use crate::output::{OutputMode, fail, pretty_kv, render_mode};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Event stream to import (`-` reads stdin).
    pub file: PathBuf,

    /// Run the stream belongs to; artifacts of one run form one report group.
    #[arg(long)]
    pub run_id: u64,

    /// Artifact name, used as the report label. Defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,

    /// Artifact id. Defaults to one past the largest id present.
    #[arg(long)]
    pub id: Option<u64>,

    /// Artifact directory (overrides `TESTLOG_ARTIFACT_DIR` and config).
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ImportReport {
    artifact: ArtifactRef,
    artifact_dir: PathBuf,
    bytes: usize,
    events: usize,
    parse_errors: usize,
    replaced: bool,
}

/// Execute `tlog import`.
///
/// # Errors
///
/// Returns an error if the input cannot be read, the name is invalid, or
/// the artifact cannot be written.
pub fn run_import(args: &ImportArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project_config(project_root)?;
    let paths = ProjectPaths::new(project_root);
    let artifact_dir = resolve_artifact_dir(
        args.artifact_dir.as_deref(),
        std::env::var(ARTIFACT_DIR_ENV).ok(),
        &config,
        &paths,
    );

    let bytes = read_input(&args.file)?;
    let name = match &args.name {
        Some(name) => name.clone(),
        None => default_name(&args.file)?,
    };

    let source = DirectorySource::new(&artifact_dir);
    let id = match args.id {
        Some(id) => id,
        None => source.next_id().map_err(|e| fail(output, e.code(), e.to_string()))?,
    };
    let artifact = ArtifactRef {
        id,
        name,
        run_id: args.run_id,
    };
    let replaced = source.exists(&artifact);
    source
        .store(&artifact, &bytes)
        .map_err(|e| fail(output, e.code(), e.to_string()))?;

    let outcome = parse_events(&bytes);
    if outcome.error_count > 0 {
        tracing::warn!(
            name = %artifact.name,
            parse_errors = outcome.error_count,
            "imported stream contains malformed lines"
        );
    }

    let report = ImportReport {
        artifact,
        artifact_dir,
        bytes: bytes.len(),
        events: outcome.events.len(),
        parse_errors: outcome.error_count,
        replaced,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}",
                r.artifact.id, r.artifact.run_id, r.artifact.name, r.events, r.parse_errors
            )
        },
        |r, w| {
            let verb = if r.replaced { "Replaced" } else { "Imported" };
            writeln!(w, "✓ {verb} '{}' for run {}", r.artifact.name, r.artifact.run_id)?;
            pretty_kv(w, "id", r.artifact.id.to_string())?;
            pretty_kv(w, "events", r.events.to_string())?;
            if r.parse_errors > 0 {
                pretty_kv(w, "malformed", r.parse_errors.to_string())?;
            }
            pretty_kv(w, "directory", r.artifact_dir.display().to_string())
        },
    )
}

fn read_input(file: &Path) -> Result<Vec<u8>> {
    if file == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read event stream from stdin")?;
        return Ok(bytes);
    }
    std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn default_name(file: &Path) -> Result<String> {
    file.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && *s != "-")
        .map(str::to_string)
        .context("cannot derive an artifact name from the input; pass --name")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_defaults_to_file_stem() {
        assert_eq!(default_name(Path::new("/ci/e2e-linux.jsonl")).unwrap(), "e2e-linux");
        assert_eq!(default_name(Path::new("plain")).unwrap(), "plain");
    }

    #[test]
    fn stdin_needs_explicit_name() {
        assert!(default_name(Path::new("-")).is_err());
    }
}
