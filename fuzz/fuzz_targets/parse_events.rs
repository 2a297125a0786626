#![no_main]

use libfuzzer_sys::fuzz_target;
use testlog_core::event::{EventStream, parse_events};

fuzz_target!(|data: &[u8]| {
    let outcome = parse_events(data);

    let non_blank = data
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .count();
    assert_eq!(outcome.line_count(), non_blank);

    let mut stream = EventStream::new(data);
    let streamed = stream.by_ref().count();
    assert_eq!(streamed, outcome.events.len());
    assert_eq!(stream.error_count(), outcome.error_count);
});
