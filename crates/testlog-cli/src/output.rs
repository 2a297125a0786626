//! How commands print: human tables, tab-separated text, or JSON.
//!
//! The mode comes from `--format`, then `--json`, then the `FORMAT`
//! environment variable (`pretty`/`human`, `text`/`table`, `json`). With
//! none of those set, a terminal gets [`OutputMode::Pretty`] and a pipe gets
//! [`OutputMode::Text`].
//!
//! Errors go to stderr in the same mode so scripts can match on
//! `error.error_code`.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use testlog_core::error::ErrorCode;

const RULE_WIDTH: usize = 72;

type Painter<'a, T> = Box<dyn FnOnce(&T, &mut dyn Write) -> io::Result<()> + 'a>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Aligned sections for a person at a terminal.
    Pretty,
    /// One tab-separated record per line.
    Text,
    /// Pretty-printed JSON documents.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    fn from_env_value(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "table" => Some(Self::Text),
            "pretty" | "human" => Some(Self::Pretty),
            _ => None,
        }
    }

    fn pick(flag: Option<Self>, json: bool, env: Option<&str>, tty: bool) -> Self {
        flag.or(json.then_some(Self::Json))
            .or_else(|| env.and_then(Self::from_env_value))
            .unwrap_or(if tty { Self::Pretty } else { Self::Text })
    }
}

/// Mode for this process from flags, `FORMAT` and whether stdout is a TTY.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env = std::env::var("FORMAT").ok();
    OutputMode::pick(format_flag, json_flag, env.as_deref(), io::stdout().is_terminal())
}

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{}", "-".repeat(RULE_WIDTH))
}

/// Heading line underlined by a rule.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// `key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let label = format!("{key}:");
    writeln!(w, "{label:<12} {}", value.as_ref())
}

/// `0.5` becomes `50.0%`; no rate becomes `-`.
pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "-".to_owned(),
    }
}

fn emit<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text: Painter<'_, T>,
    pretty: Painter<'_, T>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text(value, out)?,
        OutputMode::Pretty => pretty(value, out)?,
    }
    Ok(())
}

/// Print `value` to stdout, with separate painters for text and pretty mode.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    emit(mode, value, Box::new(text_fn), Box::new(pretty_fn), &mut out)
}

/// Print `value` to stdout; text and pretty mode share `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    let human: Painter<'_, T> = Box::new(human_fn);
    let unused: Painter<'_, T> = Box::new(|_: &T, _: &mut dyn Write| Ok(()));
    match mode {
        OutputMode::Pretty => emit(mode, value, unused, human, &mut out),
        OutputMode::Text | OutputMode::Json => emit(mode, value, human, unused, &mut out),
    }
}

/// Error body printed on stderr; nested under `"error"` in JSON mode.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_owned),
            error_code: Some(code.code().to_owned()),
        }
    }

    fn write_to(&self, mode: OutputMode, out: &mut dyn Write) -> anyhow::Result<()> {
        if mode.is_json() {
            serde_json::to_writer_pretty(&mut *out, &serde_json::json!({ "error": self }))?;
            writeln!(out)?;
            return Ok(());
        }
        let tag = self
            .error_code
            .as_ref()
            .map_or_else(|| "error".to_owned(), |c| format!("error[{c}]"));
        writeln!(out, "{tag}: {}", self.message)?;
        if let Some(hint) = &self.suggestion {
            writeln!(out, "  suggestion: {hint}")?;
        }
        Ok(())
    }
}

/// Print `error` on stderr.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    error.write_to(mode, &mut io::stderr().lock())
}

/// Report a coded failure on stderr and hand back the matching
/// [`anyhow::Error`] for the command to return.
pub fn fail(mode: OutputMode, code: ErrorCode, message: impl Into<String>) -> anyhow::Error {
    let message = message.into();
    let body = CliError::from_code(code, message.as_str());
    if let Err(e) = render_error(mode, &body) {
        tracing::debug!(error = %e, "could not print error");
    }
    anyhow::anyhow!("{code}: {message}")
}
