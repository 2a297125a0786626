//! Tolerant JSON-lines event decoder.
//!
//! Each non-empty line of the input is decoded independently. A line that
//! is not a well-formed event object is counted and dropped; decoding never
//! stops on a bad line.
//!
//! # Counting guarantee
//!
//! For any input, `events yielded + error_count == non-empty lines read`.
//! Lines consisting only of ASCII whitespace are empty and are not counted.

use std::io::BufRead;

use tracing::{debug, warn};

use crate::event::Event;

// ---------------------------------------------------------------------------
// ParseOutcome
// ---------------------------------------------------------------------------

/// Fully drained result of decoding a byte stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    /// Successfully decoded events, in input order.
    pub events: Vec<Event>,
    /// Number of non-empty lines that failed to decode.
    pub error_count: usize,
}

impl ParseOutcome {
    /// Total non-empty lines that were examined.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.events.len() + self.error_count
    }
}

/// Decode every line of `bytes` into events.
///
/// Blank and whitespace-only lines are skipped. Every other line either
/// yields an event or adds one to `error_count`.
#[must_use]
pub fn parse_events(bytes: &[u8]) -> ParseOutcome {
    let mut stream = EventStream::new(bytes);
    let events: Vec<Event> = stream.by_ref().collect();
    ParseOutcome {
        events,
        error_count: stream.error_count(),
    }
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

/// Lazy iterator over the events of a JSON-lines reader.
///
/// The stream is single-pass: once exhausted it keeps returning `None`.
/// Counters are updated as lines are consumed, so they are only final after
/// the iterator returns `None`.
#[derive(Debug)]
pub struct EventStream<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
    non_empty: usize,
    errors: usize,
    done: bool,
}

impl<R: BufRead> EventStream<R> {
    /// Wrap a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
            non_empty: 0,
            errors: 0,
            done: false,
        }
    }

    /// Number of non-empty lines that failed to decode so far.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors
    }

    /// Number of non-empty lines consumed so far.
    #[must_use]
    pub const fn lines_read(&self) -> usize {
        self.non_empty
    }
}

impl<R: BufRead> Iterator for EventStream<R> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    if self.buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    self.non_empty += 1;
                    match serde_json::from_slice::<Event>(&self.buf) {
                        Ok(event) => return Some(event),
                        Err(e) => {
                            self.errors += 1;
                            debug!(line = self.line_no, error = %e, "dropping malformed event line");
                        }
                    }
                }
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "event stream read failed, stopping");
                    self.done = true;
                }
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
