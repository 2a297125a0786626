//! Test-runner action vocabulary.
//!
//! Mirrors the `Action` field emitted by `go test -json` (test2json). Only
//! `pass`, `fail` and `skip` are terminal; everything else describes progress
//! and never changes a test's status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle action carried by an [`Event`](super::Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The test started running.
    Run,
    /// The test passed.
    Pass,
    /// The test failed.
    Fail,
    /// The test was skipped.
    Skip,
    /// The test printed a line of output.
    Output,
    /// Any other test2json action (`start`, `pause`, `cont`, `bench`, ...).
    #[serde(other)]
    Other,
}

/// Error returned when parsing an unknown action string with [`FromStr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown action '{}': expected one of run, pass, fail, skip, output",
            self.raw
        )
    }
}

impl std::error::Error for UnknownAction {}

impl Action {
    /// Actions that set a test's final status.
    pub const TERMINAL: [Self; 3] = [Self::Pass, Self::Fail, Self::Skip];

    /// Return the wire string for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Output => "output",
            Self::Other => "other",
        }
    }

    /// Returns `true` for `pass`, `fail` and `skip`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Pass | Self::Fail | Self::Skip)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "run" => Ok(Self::Run),
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            "output" => Ok(Self::Output),
            _ => Err(UnknownAction { raw: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pass_fail_skip_are_terminal() {
        for action in Action::TERMINAL {
            assert!(action.is_terminal(), "{action} should be terminal");
        }
        assert!(!Action::Run.is_terminal());
        assert!(!Action::Output.is_terminal());
        assert!(!Action::Other.is_terminal());
    }

    #[test]
    fn from_str_roundtrips_known_actions() {
        for action in [
            Action::Run,
            Action::Pass,
            Action::Fail,
            Action::Skip,
            Action::Output,
        ] {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "pause".parse::<Action>().unwrap_err();
        assert_eq!(err.raw, "pause");
        assert!(err.to_string().contains("pause"));
    }

    #[test]
    fn serde_maps_unknown_actions_to_other() {
        let action: Action = serde_json::from_str("\"cont\"").unwrap();
        assert_eq!(action, Action::Other);
        let action: Action = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(action, Action::Fail);
    }
}
