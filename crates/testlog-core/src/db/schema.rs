//! SQLite schema for the report store.
//!
//! One table per hierarchy level, each child keyed to its parent with
//! `ON DELETE CASCADE` so deleting a level removes its whole subtree:
//!
//! - `projects` → `report_groups` → `reports` → `test_groups` → `tests`
//!   → `test_logs`
//! - `report_test_metrics` holds per-report test tallies written by the
//!   analysis step
//! - `store_meta` tracks the schema version
//!
//! Natural keys (parent id, label) are UNIQUE indexes; inserts rely on them
//! for insert-if-absent semantics.

/// Migration v1: hierarchy tables and store metadata.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL CHECK (length(label) > 0)
);

CREATE TABLE IF NOT EXISTS report_groups (
    report_group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
    label TEXT NOT NULL CHECK (length(label) > 0)
);

CREATE TABLE IF NOT EXISTS reports (
    report_id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_group_id INTEGER NOT NULL REFERENCES report_groups(report_group_id) ON DELETE CASCADE,
    label TEXT NOT NULL CHECK (length(label) > 0)
);

CREATE TABLE IF NOT EXISTS test_groups (
    test_group_id INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id INTEGER NOT NULL REFERENCES reports(report_id) ON DELETE CASCADE,
    label TEXT NOT NULL CHECK (length(label) > 0)
);

CREATE TABLE IF NOT EXISTS tests (
    test_id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_group_id INTEGER NOT NULL REFERENCES test_groups(test_group_id) ON DELETE CASCADE,
    label TEXT NOT NULL CHECK (length(label) > 0),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'pass', 'fail', 'skip')),
    start_ms INTEGER,
    end_ms INTEGER,
    CHECK (start_ms IS NULL OR end_ms IS NULL OR start_ms <= end_ms)
);

CREATE TABLE IF NOT EXISTS test_logs (
    test_id INTEGER NOT NULL REFERENCES tests(test_id) ON DELETE CASCADE,
    seq INTEGER NOT NULL CHECK (seq >= 0),
    timestamp_ms INTEGER,
    text TEXT NOT NULL,
    PRIMARY KEY (test_id, seq)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_label
    ON projects(label);
CREATE UNIQUE INDEX IF NOT EXISTS idx_report_groups_natural
    ON report_groups(project_id, label);
CREATE UNIQUE INDEX IF NOT EXISTS idx_reports_natural
    ON reports(report_group_id, label);
CREATE UNIQUE INDEX IF NOT EXISTS idx_test_groups_natural
    ON test_groups(report_id, label);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tests_natural
    ON tests(test_group_id, label);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
"#;

/// Migration v2: persisted per-report test metrics.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS report_test_metrics (
    report_id INTEGER NOT NULL REFERENCES reports(report_id) ON DELETE CASCADE,
    test_label TEXT NOT NULL,
    pass_count INTEGER NOT NULL DEFAULT 0 CHECK (pass_count >= 0),
    fail_count INTEGER NOT NULL DEFAULT 0 CHECK (fail_count >= 0),
    PRIMARY KEY (report_id, test_label)
);

CREATE INDEX IF NOT EXISTS idx_report_test_metrics_label
    ON report_test_metrics(test_label);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
"#;

/// Tables every migrated store must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "projects",
    "report_groups",
    "reports",
    "test_groups",
    "tests",
    "test_logs",
    "report_test_metrics",
    "store_meta",
];

/// Natural-key and read-path indexes.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_projects_label",
    "idx_report_groups_natural",
    "idx_reports_natural",
    "idx_test_groups_natural",
    "idx_tests_natural",
    "idx_report_test_metrics_label",
];
