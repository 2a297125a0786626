use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use testlog_core::db::SqliteStore;
use testlog_core::db::ingest::Ingestor;
use testlog_core::event::parse_events;
use testlog_core::metrics::test_metrics;
use testlog_core::report::build_report;

/// (name, packages, tests per package, output lines per test)
const TIERS: [(&str, usize, usize, usize); 3] = [
    ("small", 4, 10, 2),
    ("medium", 20, 50, 5),
    ("large", 50, 200, 10),
];

/// A `go test -json` stream with run, output and terminal lines per test.
fn synthetic_stream(packages: usize, tests: usize, outputs: usize) -> Vec<u8> {
    let mut out = String::new();
    for p in 0..packages {
        for t in 0..tests {
            let second = (p * tests + t) % 60;
            out.push_str(&format!(
                "{{\"Time\":\"2024-03-01T10:00:{second:02}Z\",\"Action\":\"run\",\"Package\":\"pkg/{p}\",\"Test\":\"Test{t}\"}}\n"
            ));
            for o in 0..outputs {
                out.push_str(&format!(
                    "{{\"Time\":\"2024-03-01T10:00:{second:02}Z\",\"Action\":\"output\",\"Package\":\"pkg/{p}\",\"Test\":\"Test{t}\",\"Output\":\"line {o}\\n\"}}\n"
                ));
            }
            let action = if t % 7 == 0 { "fail" } else { "pass" };
            out.push_str(&format!(
                "{{\"Time\":\"2024-03-01T10:00:{second:02}Z\",\"Action\":\"{action}\",\"Package\":\"pkg/{p}\",\"Test\":\"Test{t}\",\"Elapsed\":0.01}}\n"
            ));
        }
    }
    out.into_bytes()
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");

    for (name, packages, tests, outputs) in TIERS {
        let stream = synthetic_stream(packages, tests, outputs);
        let events = parse_events(&stream).events;
        group.throughput(Throughput::Elements(events.len() as u64));

        group.bench_with_input(BenchmarkId::new("parse", name), &stream, |b, stream| {
            b.iter(|| black_box(parse_events(stream)));
        });

        group.bench_with_input(BenchmarkId::new("build", name), &events, |b, events| {
            b.iter(|| black_box(build_report("bench", events)));
        });

        let report = build_report("bench", &events);
        group.bench_with_input(BenchmarkId::new("tally", name), &report, |b, report| {
            b.iter(|| black_box(test_metrics(report)));
        });
    }

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    group.sample_size(10);

    let (name, packages, tests, outputs) = TIERS[1];
    let stream = synthetic_stream(packages, tests, outputs);
    let report = build_report("bench", &parse_events(&stream).events);
    group.throughput(Throughput::Elements(report.tests().count() as u64));

    group.bench_function(BenchmarkId::new("store_report", name), |b| {
        b.iter_with_setup(
            || {
                let store = SqliteStore::open_in_memory().expect("open store");
                let ingestor = Ingestor::new(&store);
                let project = ingestor.ensure_project("bench").expect("project");
                let group_id = ingestor
                    .ensure_report_group(project, "Workflow Run 1")
                    .expect("group");
                (store, group_id)
            },
            |(store, group_id)| {
                let stats = Ingestor::new(&store)
                    .store_report(group_id, &report)
                    .expect("store report");
                black_box(stats)
            },
        );
    });

    group.finish();
}

criterion_group!(benches, bench_fold, bench_store);
criterion_main!(benches);
