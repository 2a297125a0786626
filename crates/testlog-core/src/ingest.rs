//! Artifact ingestion pipeline.
//!
//! For every artifact offered by an [`ArtifactSource`]:
//!
//! 1. fetch the raw event stream
//! 2. decode it with [`parse_events`] (bad lines are counted, not fatal)
//! 3. fold it into a [`Report`](crate::report::Report) labelled with the
//!    artifact name
//! 4. store the report under the report group `Workflow Run <run_id>`
//!
//! A fetch failure skips that one artifact. Store failures abort the run.
//! Re-running over the same artifacts leaves the store unchanged.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::RecordStore;
use crate::db::ingest::{IngestStats, Ingestor};
use crate::event::parse_events;
use crate::report::build_report;
use crate::source::{ArtifactRef, ArtifactSource};

/// Project label used when none is configured.
pub const DEFAULT_PROJECT: &str = "default";

/// Label of the report group that collects every artifact of one run.
#[must_use]
pub fn report_group_label(run_id: u64) -> String {
    format!("Workflow Run {run_id}")
}

/// Knobs for [`ingest_all`].
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Project that owns every report group written.
    pub project: String,
    /// Only artifacts whose name contains this substring are ingested.
    pub filter: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            filter: None,
        }
    }
}

impl IngestOptions {
    fn accepts(&self, artifact: &ArtifactRef) -> bool {
        self.filter
            .as_deref()
            .is_none_or(|needle| artifact.name.contains(needle))
    }
}

/// Outcome of one [`ingest_all`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Artifacts listed by the source.
    pub listed: usize,
    /// Artifacts excluded by the name filter.
    pub filtered: usize,
    /// Artifacts whose fetch failed.
    pub failed: usize,
    /// Artifacts parsed and stored.
    pub ingested: usize,
    /// Events decoded across all ingested artifacts.
    pub events: usize,
    /// Malformed lines dropped across all ingested artifacts.
    pub parse_errors: usize,
    /// Hierarchy entities newly written.
    pub created: usize,
    /// Hierarchy entities already present.
    pub existing: usize,
}

impl IngestSummary {
    fn absorb(&mut self, stats: IngestStats) {
        self.created += stats.created;
        self.existing += stats.existing;
    }
}

/// Ingest every artifact of `source` into `store`.
///
/// # Errors
///
/// Returns an error if the source cannot be listed or the store rejects a
/// write. Individual fetch failures are counted in
/// [`IngestSummary::failed`] and logged.
pub fn ingest_all<A, S>(source: &A, store: &S, options: &IngestOptions) -> Result<IngestSummary>
where
    A: ArtifactSource + ?Sized,
    S: RecordStore,
{
    let artifacts = source.list().context("list artifacts")?;
    let ingestor = Ingestor::new(store);
    let project_id = ingestor
        .ensure_project(&options.project)
        .with_context(|| format!("create project '{}'", options.project))?;

    let mut summary = IngestSummary {
        listed: artifacts.len(),
        ..IngestSummary::default()
    };
    info!(artifacts = artifacts.len(), project = %options.project, "ingesting artifacts");

    for artifact in &artifacts {
        if !options.accepts(artifact) {
            debug!(name = %artifact.name, "artifact excluded by filter");
            summary.filtered += 1;
            continue;
        }

        let bytes = match source.fetch(artifact) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(name = %artifact.name, run_id = artifact.run_id, error = %e, "skipping artifact");
                summary.failed += 1;
                continue;
            }
        };

        let outcome = parse_events(&bytes);
        let report = build_report(artifact.name.clone(), &outcome.events);
        let group_label = report_group_label(artifact.run_id);
        let group_id = ingestor
            .ensure_report_group(project_id, &group_label)
            .with_context(|| format!("create report group '{group_label}'"))?;
        let stats = ingestor
            .store_report(group_id, &report)
            .with_context(|| format!("store report '{}' of {group_label}", artifact.name))?;

        info!(
            name = %artifact.name,
            run_id = artifact.run_id,
            bytes = bytes.len(),
            events = outcome.events.len(),
            parse_errors = outcome.error_count,
            created = stats.created,
            "ingested artifact"
        );

        summary.ingested += 1;
        summary.events += outcome.events.len();
        summary.parse_errors += outcome.error_count;
        summary.absorb(stats);
    }

    info!(
        ingested = summary.ingested,
        failed = summary.failed,
        filtered = summary.filtered,
        created = summary.created,
        "ingestion complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::metrics::MetricsEngine;
    use crate::source::SourceError;
    use std::collections::BTreeMap;

    /// In-memory source; artifacts without bytes fail to fetch.
    #[derive(Default)]
    struct FakeSource {
        artifacts: BTreeMap<ArtifactRef, Option<Vec<u8>>>,
    }

    impl FakeSource {
        fn with(mut self, id: u64, name: &str, run_id: u64, bytes: Option<&[u8]>) -> Self {
            let artifact = ArtifactRef {
                id,
                name: name.into(),
                run_id,
            };
            self.artifacts.insert(artifact, bytes.map(<[u8]>::to_vec));
            self
        }
    }

    impl ArtifactSource for FakeSource {
        fn list(&self) -> Result<Vec<ArtifactRef>, SourceError> {
            Ok(self.artifacts.keys().cloned().collect())
        }

        fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, SourceError> {
            self.artifacts
                .get(artifact)
                .cloned()
                .flatten()
                .ok_or_else(|| SourceError::NotFound {
                    name: artifact.name.clone(),
                    run_id: artifact.run_id,
                })
        }
    }

    const PASS: &[u8] = br#"{"action":"pass","package":"p","test":"t"}"#;
    const FAIL: &[u8] = b"{\"action\":\"fail\",\"package\":\"p\",\"test\":\"t\"}\nnot json\n";

    #[test]
    fn groups_reports_by_run() {
        let source = FakeSource::default()
            .with(1, "e2e-a", 10, Some(PASS))
            .with(2, "e2e-b", 10, Some(FAIL))
            .with(3, "e2e-a", 11, Some(PASS));
        let store = SqliteStore::open_in_memory().unwrap();

        let summary = ingest_all(&source, &store, &IngestOptions::default()).unwrap();
        assert_eq!(summary.ingested, 3);
        assert_eq!(summary.events, 3);
        assert_eq!(summary.parse_errors, 1);

        let groups = store.report_groups().unwrap();
        let labels: Vec<_> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["Workflow Run 10", "Workflow Run 11"]);

        let run10 = store.load_report_group(groups[0].id).unwrap().unwrap();
        assert_eq!(run10.reports.len(), 2);
    }

    #[test]
    fn reingestion_is_idempotent() {
        let source = FakeSource::default()
            .with(1, "e2e-a", 10, Some(PASS))
            .with(2, "e2e-b", 10, Some(FAIL));
        let store = SqliteStore::open_in_memory().unwrap();

        let first = ingest_all(&source, &store, &IngestOptions::default()).unwrap();
        let counts = store.entity_counts().unwrap();
        let second = ingest_all(&source, &store, &IngestOptions::default()).unwrap();

        assert_eq!(store.entity_counts().unwrap(), counts);
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, first.created);
    }

    #[test]
    fn fetch_failure_skips_one_artifact() {
        let source = FakeSource::default()
            .with(1, "e2e-broken", 10, None)
            .with(2, "e2e-ok", 10, Some(PASS));
        let store = SqliteStore::open_in_memory().unwrap();

        let summary = ingest_all(&source, &store, &IngestOptions::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.ingested, 1);
        assert_eq!(store.entity_counts().unwrap().reports, 1);
    }

    #[test]
    fn filter_selects_by_name_substring() {
        let source = FakeSource::default()
            .with(1, "e2e-linux", 10, Some(PASS))
            .with(2, "unit-linux", 10, Some(PASS));
        let store = SqliteStore::open_in_memory().unwrap();
        let options = IngestOptions {
            filter: Some("e2e".into()),
            ..IngestOptions::default()
        };

        let summary = ingest_all(&source, &store, &options).unwrap();
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.ingested, 1);
    }

    #[test]
    fn pass_in_one_report_fail_in_another() {
        let source = FakeSource::default()
            .with(1, "A", 10, Some(PASS))
            .with(2, "B", 10, Some(FAIL));
        let store = SqliteStore::open_in_memory().unwrap();
        ingest_all(&source, &store, &IngestOptions::default()).unwrap();

        let engine = MetricsEngine::new(&store);
        let metrics = engine.cross_report_metrics().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!((metrics[0].pass_count, metrics[0].fail_count), (1, 1));

        let history = engine.cross_report_history().unwrap();
        let passed: Vec<_> = history.iter().map(|h| h.passed).collect();
        assert_eq!(passed, [true, false]);
    }

    #[test]
    fn report_group_label_format() {
        assert_eq!(report_group_label(42), "Workflow Run 42");
    }
}
