// Copyright 2019 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! ### Note: not a stable API
//! The items in this module exist for the `afl` harness under `fuzz/` to drive and may change
//! in any semver-compatible release.
use crate::parser::{Event, PushParserConfig};

const BOUNDARY: &str = "boundary";

/// Feed `data` to a [`crate::PushParser`] over the fixed boundary `"boundary"`, split into
/// chunks whose sizes are themselves taken from `data`. Never panics; parse errors are the
/// expected outcome for most fuzz inputs and are silently discarded.
pub fn fuzz_push_parser(data: &[u8]) {
    let mut parser = PushParserConfig::new(BOUNDARY).build();
    let mut pos = 0;
    while pos < data.len() {
        // Vary chunk length using the byte at `pos` itself so the harness explores a spread of
        // split points without needing its own RNG.
        let len = (data[pos] as usize % 32).max(1).min(data.len() - pos);
        let chunk = &data[pos..pos + len];
        pos += len;
        match parser.parse(chunk) {
            Ok(events) => drain(events),
            Err(_) => return,
        }
    }
    let _ = parser.parse(&[]);
}

/// Feed `data` as the raw header lines of a single segment (split on `\r\n`) directly through
/// [`crate::Segment::add_header_line`] by way of a minimal one-segment stream, exercising the
/// header grammar and option parser without needing a full multipart envelope.
pub fn fuzz_header_lines(data: &[u8]) {
    let mut body = Vec::with_capacity(data.len() + 32);
    body.extend_from_slice(b"--");
    body.extend_from_slice(BOUNDARY.as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(data);
    if !data.ends_with(b"\r\n") {
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"\r\nx\r\n--");
    body.extend_from_slice(BOUNDARY.as_bytes());
    body.extend_from_slice(b"--");

    let mut parser = PushParserConfig::new(BOUNDARY).build();
    if let Ok(events) = parser.parse(&body) {
        drain(events);
    }
    let _ = parser.parse(&[]);
}

fn drain(events: Vec<Event<'_>>) {
    for event in events {
        match event {
            Event::SegmentStart(segment) => {
                let _ = segment.name();
            }
            Event::Data(data) => {
                let _ = data.len();
            }
            Event::SegmentEnd => {}
        }
    }
}
