//! Test-runner event model.
//!
//! One [`Event`] corresponds to one line of `go test -json` output:
//!
//! ```text
//! {"Time":"2024-03-01T10:00:00Z","Action":"output","Package":"p","Test":"t","Output":"log1\n"}
//! ```
//!
//! Field names are accepted in both the lowercase form and test2json's
//! capitalized form. Every field is optional; an omitted field decodes as
//! empty. Events are transient: they are folded into a
//! [`Report`](crate::report::Report) and then dropped.

pub mod parser;
pub mod types;

pub use parser::{EventStream, ParseOutcome, parse_events};
pub use types::{Action, UnknownAction};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Sentinel returned by [`Event::timestamp`] when `time` is missing or not
/// RFC 3339.
pub const UNKNOWN_TIMESTAMP: i64 = -1;

/// A single test-runner event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// RFC 3339 timestamp string as emitted by the runner.
    #[serde(default, alias = "Time", skip_serializing_if = "String::is_empty")]
    pub time: String,

    /// Lifecycle action; `None` when the line omits it.
    #[serde(default, alias = "Action", skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,

    /// Package (test group) the event belongs to.
    #[serde(default, alias = "Package", skip_serializing_if = "String::is_empty")]
    pub package: String,

    /// Test name; empty for package-level events.
    #[serde(default, alias = "Test", skip_serializing_if = "String::is_empty")]
    pub test: String,

    /// Output text for `output` actions.
    #[serde(default, alias = "Output", skip_serializing_if = "String::is_empty")]
    pub output: String,

    /// Elapsed seconds reported on terminal actions.
    #[serde(default, alias = "Elapsed", skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
}

impl Event {
    /// Epoch milliseconds of `time`, or [`UNKNOWN_TIMESTAMP`] (`-1`) when the
    /// value cannot be parsed.
    ///
    /// The sentinel is not an instant. Code that folds timestamps into
    /// windows should use [`Event::timestamp_millis`] instead.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp_millis().unwrap_or(UNKNOWN_TIMESTAMP)
    }

    /// Epoch milliseconds of `time`, or `None` when it is missing or invalid.
    #[must_use]
    pub fn timestamp_millis(&self) -> Option<i64> {
        DateTime::parse_from_rfc3339(&self.time)
            .ok()
            .map(|ts| ts.timestamp_millis())
    }

    /// Returns `true` when the event sets a test's final status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.action.is_some_and(Action::is_terminal)
    }

    /// Returns `true` when the event names both a package and a test.
    #[must_use]
    pub fn is_test_scoped(&self) -> bool {
        !self.package.is_empty() && !self.test.is_empty()
    }
}
