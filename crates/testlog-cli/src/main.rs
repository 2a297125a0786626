#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "tlog",
    author,
    version,
    about = "tlog: test-run history from go test -json streams",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (ignored when TESTLOG_LOG is set).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Suppress non-essential output and warnings.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a testlog project",
        long_about = "Create .testlog/ with a default config and an empty report store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    tlog init\n\n    # Rewrite the config, keeping stored reports\n    tlog init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Ingest",
        about = "Add an event stream to the artifact directory",
        long_about = "Copy a go test -json stream into the artifact directory as one artifact of a run.",
        after_help = "EXAMPLES:\n    # Import a CI log for run 42\n    tlog import e2e-linux.jsonl --run-id 42\n\n    # Pipe straight from go test\n    go test -json ./... | tlog import - --run-id 43 --name unit"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Ingest",
        about = "Load artifacts into the report store",
        long_about = "Parse every artifact and store its report under the report group of its run. Re-ingesting is a no-op.",
        after_help = "EXAMPLES:\n    # Ingest everything\n    tlog ingest\n\n    # Only e2e artifacts, then refresh cached metrics\n    tlog ingest --filter e2e --clear-cache"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        next_help_heading = "Ingest",
        about = "Persist per-report test tallies",
        long_about = "Compute and store pass/fail tallies for every report that does not have them yet.",
        after_help = "EXAMPLES:\n    tlog analyze\n    tlog analyze --json"
    )]
    Analyze,

    #[command(
        next_help_heading = "Read",
        about = "Pass/fail tallies per test across all reports",
        long_about = "Cross-report pass/fail counts per test, worst pass rate first. Served from the aggregate cache when warm.",
        after_help = "EXAMPLES:\n    # Ten flakiest tests\n    tlog metrics --limit 10\n\n    # Emit machine-readable output\n    tlog metrics --json"
    )]
    Metrics(cmd::metrics::MetricsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Per-occurrence test outcomes",
        long_about = "One record per test per report, in report-group order. Served from the aggregate cache when warm.",
        after_help = "EXAMPLES:\n    # Every occurrence of one test\n    tlog history --test TestLogin\n\n    # Only non-passing occurrences\n    tlog history --not-passed"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Pass/fail tallies per report",
        after_help = "EXAMPLES:\n    tlog reports\n    tlog reports \"Workflow Run 42\""
    )]
    Reports(cmd::reports::ReportsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a report group's full hierarchy",
        after_help = "EXAMPLES:\n    # First stored group\n    tlog show\n\n    # One group, with captured output\n    tlog show \"Workflow Run 42\" --logs"
    )]
    Show(cmd::show::ShowArgs),

    #[command(next_help_heading = "Maintenance", about = "Inspect or clear the aggregate cache")]
    Cache {
        #[command(subcommand)]
        command: cmd::cache::CacheCommand,
    },

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    tlog completions bash > /etc/bash_completion.d/tlog\n    tlog completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("TESTLOG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "testlog=debug,tlog=debug,info"
        } else if quiet {
            "error"
        } else {
            "testlog=info,tlog=info,warn"
        })
    });

    let format = env::var("TESTLOG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    debug!(root = %project_root.display(), ?output, "starting");

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &project_root),
        Commands::Import(args) => cmd::import::run_import(args, output, &project_root),
        Commands::Ingest(args) => {
            cmd::ingest::run_ingest(args, output, cli.quiet, &project_root)
        }
        Commands::Analyze => cmd::analyze::run_analyze(output, &project_root),
        Commands::Metrics(args) => cmd::metrics::run_metrics(args, output, &project_root),
        Commands::History(args) => cmd::history::run_history(args, output, &project_root),
        Commands::Reports(args) => cmd::reports::run_reports(args, output, &project_root),
        Commands::Show(args) => cmd::show::run_show(args, output, &project_root),
        Commands::Cache { command } => cmd::cache::run_cache(command, output, &project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["tlog", "--json", "metrics"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["tlog", "metrics", "--json"]);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_wins_over_json() {
        let cli = Cli::parse_from(["tlog", "--json", "--format", "text", "history"]);
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["tlog", "-q", "-v", "metrics"]).is_err());
    }

    #[test]
    fn import_requires_run_id() {
        assert!(Cli::try_parse_from(["tlog", "import", "x.jsonl"]).is_err());
        let cli = Cli::parse_from(["tlog", "import", "x.jsonl", "--run-id", "7", "--name", "e2e"]);
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.run_id, 7);
                assert_eq!(args.name.as_deref(), Some("e2e"));
                assert_eq!(args.id, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ingest_flags_parse() {
        let cli = Cli::parse_from(["tlog", "ingest", "--filter", "e2e", "--clear-cache"]);
        match cli.command {
            Commands::Ingest(args) => {
                assert_eq!(args.filter.as_deref(), Some("e2e"));
                assert!(args.clear_cache);
                assert!(args.artifact_dir.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cache_subcommands_parse() {
        let cli = Cli::parse_from(["tlog", "cache", "clear"]);
        assert!(matches!(
            cli.command,
            Commands::Cache {
                command: cmd::cache::CacheCommand::Clear
            }
        ));
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["tlog", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["tlog", "init"],
            vec!["tlog", "import", "f", "--run-id", "1"],
            vec!["tlog", "ingest"],
            vec!["tlog", "analyze"],
            vec!["tlog", "metrics", "-n", "5"],
            vec!["tlog", "history", "--test", "t"],
            vec!["tlog", "reports"],
            vec!["tlog", "reports", "Workflow Run 1"],
            vec!["tlog", "show", "--logs"],
            vec!["tlog", "cache", "status"],
            vec!["tlog", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
