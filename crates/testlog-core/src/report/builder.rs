//! Fold an event sequence into a [`Report`].
//!
//! Only events naming both a package and a test contribute. Package-level
//! events (empty `test`) describe package outcomes and are ignored, so a
//! package that only ever produced package-level events does not appear in
//! the report at all.
//!
//! Events are applied strictly in the order given; the builder never
//! re-sorts by timestamp, so the last terminal event in sequence order
//! decides a test's status.

use std::collections::BTreeMap;

use crate::event::Event;
use crate::report::{Report, Test, TestGroup};

/// Incremental report builder.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    label: String,
    groups: BTreeMap<String, BTreeMap<String, Test>>,
    applied: usize,
    ignored: usize,
}

impl ReportBuilder {
    /// Start an empty report with the given label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            groups: BTreeMap::new(),
            applied: 0,
            ignored: 0,
        }
    }

    /// Fold one event.
    pub fn apply(&mut self, event: &Event) {
        if !event.is_test_scoped() {
            self.ignored += 1;
            return;
        }

        self.groups
            .entry(event.package.clone())
            .or_default()
            .entry(event.test.clone())
            .or_insert_with(|| Test::new(event.test.clone()))
            .apply(event);
        self.applied += 1;
    }

    /// Fold every event of an iterator, in order.
    pub fn extend<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Number of events that updated a test.
    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied
    }

    /// Number of events skipped for lacking a package or test.
    #[must_use]
    pub const fn ignored(&self) -> usize {
        self.ignored
    }

    /// Materialize the report. Groups and tests come out sorted by label.
    #[must_use]
    pub fn finish(self) -> Report {
        let test_groups = self
            .groups
            .into_iter()
            .map(|(label, tests)| TestGroup {
                id: None,
                label,
                tests: tests.into_values().collect(),
            })
            .collect();

        Report {
            id: None,
            label: self.label,
            test_groups,
        }
    }
}

/// Build a report from a complete event sequence.
pub fn build_report<'a>(label: impl Into<String>, events: impl IntoIterator<Item = &'a Event>) -> Report {
    let mut builder = ReportBuilder::new(label);
    builder.extend(events);
    builder.finish()
}
