// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! A pull-style, buffering wrapper around [`crate::PushParser`] for callers who'd rather iterate
//! fully-headered segments than drain event vectors by hand.
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;

use crate::error::{MultipartError, Result};
use crate::parser::{Event, PushParser, PushParserConfig};

const READ_CHUNK: usize = 8 * 1024;

/// Per-segment memory ceiling before a body spills to disk. Matches the original's
/// `MAXMEMFILE` default of 100 KiB.
const DEFAULT_MEMORY_LIMIT: usize = 100 * 1024;

/// One fully-headered segment, with its body available as a buffered [`Read`].
///
/// The body lives in a [`tempfile::SpooledTempFile`]: entirely in memory while it stays under
/// the reader's `memory_limit`, spilled to a real temporary file the moment it crosses that
/// threshold. Either way, by the time this value is returned the body is already rewound to its
/// start and ready to read.
pub struct ReadSegment {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    charset: Option<String>,
    headers: Vec<(String, String)>,
    body: SpooledTempFile,
}

impl ReadSegment {
    /// The `Content-Disposition` `name` option.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `Content-Disposition` `filename` option, if present.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The `Content-Type` primary token, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `Content-Type` `charset` option, if present.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// All headers observed for this segment, in wire order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Take ownership of the body store, for callers (like [`crate::read_form_request`]) that
    /// want to hand it off rather than read it in place.
    pub(crate) fn into_body(self) -> SpooledTempFile {
        self.body
    }
}

impl Read for ReadSegment {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// A segment whose headers are final but whose body is still being accumulated from the
/// underlying source, across however many [`PushParser::parse`] calls it takes to reach its
/// `SegmentEnd`.
struct Building {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    charset: Option<String>,
    headers: Vec<(String, String)>,
    body: SpooledTempFile,
}

/// Drives a [`PushParser`] over a [`Read`] source, one segment at a time.
///
/// A single `read` can hand back more than one segment's worth of events (a contiguous in-memory
/// source, or any read past the header, routinely does), so completed segments queue up in
/// `pending` rather than being discarded once the first one is found.
pub struct MultipartReader<R> {
    parser: PushParser,
    source: R,
    memory_limit: usize,
    eof: bool,
    building: Option<Building>,
    pending: VecDeque<ReadSegment>,
}

impl<R: Read> MultipartReader<R> {
    /// Wrap `source`, parsing it per `config`.
    pub fn new(source: R, config: PushParserConfig) -> Self {
        MultipartReader {
            parser: config.build(),
            source,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            eof: false,
            building: None,
            pending: VecDeque::new(),
        }
    }

    /// Set the per-segment in-memory ceiling before a body spills to a temporary file.
    pub fn memory_limit(mut self, memory_limit: usize) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if self.eof {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; READ_CHUNK];
        let n = (self.source)
            .read(&mut buf)
            .map_err(|e| MultipartError::format(format!("failed reading source: {e}")))?;
        if n == 0 {
            self.eof = true;
            return Ok(Vec::new());
        }
        buf.truncate(n);
        Ok(buf)
    }

    /// Advance to the next segment, reading further from the source as needed.
    ///
    /// Returns `None` once the stream is exhausted. The returned [`ReadSegment`]'s body must be
    /// fully read (or dropped) before calling this again.
    pub fn next_segment(&mut self) -> Result<Option<ReadSegment>> {
        loop {
            if let Some(segment) = self.pending.pop_front() {
                return Ok(Some(segment));
            }
            if self.parser.is_complete() {
                return Ok(None);
            }
            let chunk = self.read_chunk()?;
            let events = self.parser.parse(&chunk)?;
            consume_events(events, self.memory_limit, &mut self.building, &mut self.pending)?;
        }
    }
}

/// Fold one `parse()` call's worth of events into `building`/`pending`. A single vector may carry
/// a `SegmentStart`/`Data*`/`SegmentEnd` run for more than one segment (any read larger than a
/// header's worth of bytes), so every event is processed rather than stopping at the first match.
///
/// A free function, not a method: its events borrow `MultipartReader::parser`, so it can't take
/// `&mut self` without conflicting with that borrow. Taking the individual fields it needs keeps
/// the borrows disjoint.
fn consume_events(
    events: Vec<Event<'_>>,
    memory_limit: usize,
    building: &mut Option<Building>,
    pending: &mut VecDeque<ReadSegment>,
) -> Result<()> {
    for event in events {
        match event {
            Event::SegmentStart(segment) => {
                *building = Some(Building {
                    name: segment.name().to_string(),
                    filename: segment.filename().map(str::to_string),
                    content_type: segment.content_type().map(str::to_string),
                    charset: segment.charset().map(str::to_string),
                    headers: segment.headers().to_vec(),
                    body: SpooledTempFile::new(memory_limit),
                });
            }
            Event::Data(data) => {
                let current = building.as_mut().expect("Data event always follows a SegmentStart");
                current
                    .body
                    .write_all(data)
                    .map_err(|e| MultipartError::format(format!("failed buffering segment body: {e}")))?;
            }
            Event::SegmentEnd => {
                let mut finished = building.take().expect("SegmentEnd event always follows a SegmentStart");
                finished
                    .body
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| MultipartError::format(format!("failed rewinding segment body: {e}")))?;
                pending.push_back(ReadSegment {
                    name: finished.name,
                    filename: finished.filename,
                    content_type: finished.content_type,
                    charset: finished.charset,
                    headers: finished.headers,
                    body: finished.body,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn reads_segments_one_byte_reads_match_one_shot() {
        let input: &[u8] = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--foo\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nworld\r\n--foo--";

        let whole = {
            let mut reader = MultipartReader::new(input, PushParserConfig::new("foo"));
            let mut out = Vec::new();
            while let Some(mut seg) = reader.next_segment().unwrap() {
                let mut body = String::new();
                seg.read_to_string(&mut body).unwrap();
                out.push((seg.name().to_string(), body));
            }
            out
        };

        struct OneByteAtATime<'a>(&'a [u8]);
        impl<'a> Read for OneByteAtATime<'a> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[0];
                self.0 = &self.0[1..];
                Ok(1)
            }
        }

        let chunked = {
            let mut reader = MultipartReader::new(OneByteAtATime(input), PushParserConfig::new("foo"));
            let mut out = Vec::new();
            while let Some(mut seg) = reader.next_segment().unwrap() {
                let mut body = String::new();
                seg.read_to_string(&mut body).unwrap();
                out.push((seg.name().to_string(), body));
            }
            out
        };

        assert_eq!(whole, chunked);
        assert_eq!(whole, vec![
            ("a".to_string(), "hello".to_string()),
            ("b".to_string(), "world".to_string()),
        ]);
    }

    #[test]
    fn spools_past_memory_limit() {
        let body = "x".repeat(64);
        let input = format!(
            "--foo\r\nContent-Disposition: form-data; name=\"a\"; filename=\"big.bin\"\r\n\r\n{body}\r\n--foo--"
        );
        let mut reader = MultipartReader::new(input.as_bytes(), PushParserConfig::new("foo")).memory_limit(8);
        let mut seg = reader.next_segment().unwrap().expect("one segment");
        let mut out = String::new();
        seg.read_to_string(&mut out).unwrap();
        assert_eq!(out, body);
    }
}
