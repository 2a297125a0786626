#![no_main]

use libfuzzer_sys::fuzz_target;
use testlog_core::db::ingest::Ingestor;
use testlog_core::db::{RecordStore, SqliteStore};
use testlog_core::event::parse_events;
use testlog_core::report::build_report;

// Storing any report twice must leave the store unchanged, and the stored
// tree must load back with the same tests.
fuzz_target!(|data: &[u8]| {
    let report = build_report("fuzz", &parse_events(data).events);
    let Ok(store) = SqliteStore::open_in_memory() else {
        return;
    };
    let ingestor = Ingestor::new(&store);
    let Ok(project) = ingestor.ensure_project("fuzz") else {
        return;
    };
    let Ok(group) = ingestor.ensure_report_group(project, "Workflow Run 0") else {
        return;
    };

    let first = ingestor.store_report(group, &report).expect("first store");
    let counts = store.entity_counts().expect("counts");
    let second = ingestor.store_report(group, &report).expect("second store");

    assert_eq!(second.created, 0);
    assert_eq!(second.existing, first.created + first.existing);
    assert_eq!(store.entity_counts().expect("counts"), counts);

    let loaded = store
        .load_report_group(group)
        .expect("load")
        .expect("group exists");
    let stored_tests: usize = loaded.reports.iter().map(|r| r.tests().count()).sum();
    assert_eq!(stored_tests, report.tests().count());
});
