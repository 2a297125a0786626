//! Report hierarchy: report group → report → test group → test → log line.
//!
//! Each level exclusively owns its children. Labels are unique within a
//! parent and form the natural key used for deduplicated storage. The `id`
//! fields are `None` for trees produced by [`builder::ReportBuilder`] and
//! carry row ids once a tree is hydrated from the store.

pub mod builder;

pub use builder::{ReportBuilder, build_report};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::event::{Action, Event};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Final status of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No terminal event seen yet.
    #[default]
    Pending,
    /// Terminal `pass` event.
    Pass,
    /// Terminal `fail` event.
    Fail,
    /// Terminal `skip` event.
    Skip,
}

impl Status {
    /// Storage/wire string for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
        }
    }

    /// Status set by a terminal action; `None` for non-terminal actions.
    #[must_use]
    pub const fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::Pass => Some(Self::Pass),
            Action::Fail => Some(Self::Fail),
            Action::Skip => Some(Self::Skip),
            Action::Run | Action::Output | Action::Other => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" | "" => Ok(Self::Pending),
            "pass" => Ok(Self::Pass),
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown test status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// TimeWindow
// ---------------------------------------------------------------------------

/// Closed interval of epoch milliseconds.
///
/// Windows are always derived. An entity with no timed descendants has no
/// window at all (`None`), which is distinct from a zero-length window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    /// Smallest window covering both `self` and `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length of the window in milliseconds.
    #[must_use]
    pub const fn duration_ms(self) -> i64 {
        self.end - self.start
    }
}

/// Fold child windows: min of starts, max of ends, `None` when no child has
/// a window.
pub fn fold_windows(windows: impl IntoIterator<Item = Option<TimeWindow>>) -> Option<TimeWindow> {
    windows
        .into_iter()
        .flatten()
        .reduce(TimeWindow::merge)
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLog {
    /// Epoch millis of the producing event; `None` if its time was unknown.
    pub timestamp: Option<i64>,
    pub text: String,
}

/// A single test and everything observed about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    pub status: Status,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub logs: Vec<TestLog>,
}

impl Test {
    /// A pending test with no observations.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
            status: Status::Pending,
            start: None,
            end: None,
            logs: Vec::new(),
        }
    }

    /// Fold one event into this test.
    ///
    /// - known timestamps widen `start`/`end`; the `-1` sentinel is ignored
    /// - terminal actions overwrite `status` (last one wins)
    /// - `output` appends a log line
    pub fn apply(&mut self, event: &Event) {
        let ts = event.timestamp_millis();
        if let Some(ts) = ts {
            self.start = Some(self.start.map_or(ts, |s| s.min(ts)));
            self.end = Some(self.end.map_or(ts, |e| e.max(ts)));
        }

        match event.action {
            Some(Action::Output) => self.logs.push(TestLog {
                timestamp: ts,
                text: event.output.clone(),
            }),
            Some(action) => {
                if let Some(status) = Status::from_action(action) {
                    self.status = status;
                }
            }
            None => {}
        }
    }

    /// Window spanned by this test's timed events.
    #[must_use]
    pub fn time_window(&self) -> Option<TimeWindow> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TimeWindow { start, end }),
            _ => None,
        }
    }
}

/// Tests from one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    pub tests: Vec<Test>,
}

impl TestGroup {
    #[must_use]
    pub fn time_window(&self) -> Option<TimeWindow> {
        fold_windows(self.tests.iter().map(Test::time_window))
    }

    /// Look up a test by label.
    #[must_use]
    pub fn test(&self, label: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.label == label)
    }
}

/// All test groups produced by one test run (one artifact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    pub test_groups: Vec<TestGroup>,
}

impl Report {
    #[must_use]
    pub fn time_window(&self) -> Option<TimeWindow> {
        fold_windows(self.test_groups.iter().map(TestGroup::time_window))
    }

    /// Look up a test group by label.
    #[must_use]
    pub fn group(&self, label: &str) -> Option<&TestGroup> {
        self.test_groups.iter().find(|g| g.label == label)
    }

    /// Iterate every test across all groups.
    pub fn tests(&self) -> impl Iterator<Item = &Test> {
        self.test_groups.iter().flat_map(|g| g.tests.iter())
    }
}

/// Reports produced by one external execution (e.g. one CI workflow run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    pub reports: Vec<Report>,
}

impl ReportGroup {
    #[must_use]
    pub fn time_window(&self) -> Option<TimeWindow> {
        fold_windows(self.reports.iter().map(Report::time_window))
    }

    /// Look up a report by label.
    #[must_use]
    pub fn report(&self, label: &str) -> Option<&Report> {
        self.reports.iter().find(|r| r.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(label: &str, start: i64, end: i64) -> Test {
        Test {
            start: Some(start),
            end: Some(end),
            ..Test::new(label)
        }
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [Status::Pending, Status::Pass, Status::Fail, Status::Skip] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
        assert!("exploded".parse::<Status>().is_err());
    }

    #[test]
    fn group_window_folds_children() {
        let group = TestGroup {
            id: None,
            label: "p".into(),
            tests: vec![timed("a", 10, 20), timed("b", 5, 15), Test::new("c")],
        };
        assert_eq!(group.time_window(), Some(TimeWindow { start: 5, end: 20 }));
    }

    #[test]
    fn empty_hierarchy_has_no_window() {
        let group = TestGroup {
            id: None,
            label: "p".into(),
            tests: vec![Test::new("untimed")],
        };
        assert_eq!(group.time_window(), None);

        let report = Report {
            id: None,
            label: "r".into(),
            test_groups: vec![],
        };
        assert_eq!(report.time_window(), None);
    }

    #[test]
    fn report_group_window_spans_reports() {
        let mk_report = |label: &str, test: Test| Report {
            id: None,
            label: label.into(),
            test_groups: vec![TestGroup {
                id: None,
                label: "p".into(),
                tests: vec![test],
            }],
        };
        let rg = ReportGroup {
            id: None,
            label: "Workflow Run 1".into(),
            reports: vec![mk_report("a", timed("t", 100, 200)), mk_report("b", timed("t", 50, 120))],
        };
        let window = rg.time_window().unwrap();
        assert_eq!(window, TimeWindow { start: 50, end: 200 });
        assert_eq!(window.duration_ms(), 150);
    }

    #[test]
    fn non_terminal_actions_keep_status() {
        let mut test = Test::new("t");
        test.apply(&Event {
            action: Some(Action::Pass),
            ..Event::default()
        });
        for action in [Some(Action::Run), Some(Action::Output), Some(Action::Other), None] {
            test.apply(&Event {
                action,
                ..Event::default()
            });
        }
        assert_eq!(test.status, Status::Pass);
    }

    #[test]
    fn unknown_timestamp_does_not_widen_window() {
        let mut test = Test::new("t");
        test.apply(&Event {
            time: "2024-03-01T10:00:00Z".into(),
            action: Some(Action::Run),
            ..Event::default()
        });
        test.apply(&Event {
            time: "garbage".into(),
            action: Some(Action::Pass),
            ..Event::default()
        });
        assert_eq!(test.start, Some(1_709_287_200_000));
        assert_eq!(test.end, Some(1_709_287_200_000));
        assert_eq!(test.status, Status::Pass);
    }
}
