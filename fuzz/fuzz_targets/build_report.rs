#![no_main]

use libfuzzer_sys::fuzz_target;
use testlog_core::event::parse_events;
use testlog_core::metrics::test_metrics;
use testlog_core::report::{Status, build_report};

fuzz_target!(|data: &[u8]| {
    let events = parse_events(data).events;
    let report = build_report("fuzz", &events);

    for test in report.tests() {
        match (test.start, test.end) {
            (Some(start), Some(end)) => assert!(start <= end),
            (None, None) => {}
            _ => panic!("half-open window on {}", test.label),
        }
    }

    let pass = report.tests().filter(|t| t.status == Status::Pass).count() as u64;
    let fail = report.tests().filter(|t| t.status == Status::Fail).count() as u64;
    let metrics = test_metrics(&report);
    assert_eq!(metrics.iter().map(|m| m.pass_count).sum::<u64>(), pass);
    assert_eq!(metrics.iter().map(|m| m.fail_count).sum::<u64>(), fail);
});
