use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use testlog_core::config::{ProjectPaths, default_config_toml};
use testlog_core::db::SqliteStore;
use testlog_core::db::migrations::LATEST_SCHEMA_VERSION;

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config even if `.testlog/` already exists. The store is
    /// kept.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "testlog.sqlite3*\ncache/\nartifacts/\ningest.lock\n";

#[derive(Debug, Serialize)]
struct InitReport {
    root: PathBuf,
    config: PathBuf,
    store: PathBuf,
    schema_version: u32,
    reinitialized: bool,
}

/// Execute `tlog init`. Creates the project skeleton:
///
/// ```text
/// .testlog/
///   config.toml       (defaults)
///   .gitignore        (store, cache, lock)
///   testlog.sqlite3   (migrated, empty)
/// ```
///
/// # Errors
///
/// Returns an error if `.testlog/` already exists and `--force` is not set,
/// or if any filesystem or store operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let report = init_project(args, project_root)?;
    render(output, &report, |r, w| {
        if r.reinitialized {
            writeln!(w, "✓ Reinitialized .testlog/")?;
        } else {
            writeln!(w, "✓ Initialized .testlog/")?;
        }
        writeln!(w)?;
        pretty_kv(w, "config", r.config.display().to_string())?;
        pretty_kv(w, "store", r.store.display().to_string())?;
        pretty_kv(w, "schema", format!("v{}", r.schema_version))?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  tlog import run.jsonl --run-id 1    # add an event stream")?;
        writeln!(w, "  tlog ingest                         # load it into the store")?;
        writeln!(w, "  tlog metrics                        # pass/fail by test")
    })
}

fn init_project(args: &InitArgs, project_root: &Path) -> Result<InitReport> {
    let paths = ProjectPaths::new(project_root);
    let reinitialized = paths.is_initialized();

    if reinitialized && !args.force {
        anyhow::bail!(".testlog/ already exists. Use `tlog init --force` to reinitialize.");
    }

    let dir = paths.dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = paths.config();
    std::fs::write(&config_path, default_config_toml()?)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let store_path = paths.store();
    SqliteStore::open(&store_path)
        .with_context(|| format!("Failed to create store: {}", store_path.display()))?;

    Ok(InitReport {
        root: project_root.to_path_buf(),
        config: config_path,
        store: store_path,
        schema_version: LATEST_SCHEMA_VERSION,
        reinitialized,
    })
}
