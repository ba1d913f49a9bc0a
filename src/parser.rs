// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The push-based `multipart/form-data` state machine.
//!
//! [`PushParser`] owns no I/O source. The caller pushes chunks with [`PushParser::parse`] and
//! drains the returned events before pushing again; the parser never blocks and retains only a
//! small trailing window of the input between calls.
use log::{debug, trace, warn};

use crate::boundary::Delimiter;
use crate::error::{MultipartError, Result};
use crate::segment::Segment;

/// Bytes of unmatched preamble tolerated before giving up on finding a first boundary (in
/// strict mode) or before warning (non-strict, logged once per parser via `log::warn!`).
const PREAMBLE_SCAN_LIMIT: usize = 8 * 1024;

const DEFAULT_MAX_HEADER_SIZE: usize = 4096;
const DEFAULT_MAX_HEADER_COUNT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Header,
    Body,
    Complete,
}

enum BoundaryTail {
    NextSegment,
    Terminator,
}

/// One item of the event sequence [`PushParser::parse`] returns.
///
/// Borrowed from the parser: a [`Vec<Event<'p>>`] keeps `&'p mut PushParser` borrowed for as
/// long as it's alive, so the borrow checker requires the caller to drop it (having read
/// whatever it needs out of it) before the next `parse` call — there is no other way to express
/// "drain before you push again" without a runtime check.
#[derive(Debug)]
pub enum Event<'p> {
    /// Headers for a new segment are final; `name`/`filename`/`content_type` are available.
    SegmentStart(&'p Segment),
    /// A chunk of body bytes for the current segment. Never empty.
    Data(&'p [u8]),
    /// The current segment's body has ended (its terminating boundary was found).
    SegmentEnd,
}

/// Events recorded during the scan of one `parse` call, referencing `self` only by index/range
/// so the scan loop never has to hold a borrow across further mutation of `self`. Converted into
/// real [`Event`]s after the loop, once no further mutation will occur this call.
enum RawEvent {
    SegmentStart(usize),
    Data { start: usize, end: usize },
    SegmentEnd,
}

/// Builder for [`PushParser`]. See the field-level docs for defaults.
#[derive(Debug, Clone)]
pub struct PushParserConfig {
    boundary: Vec<u8>,
    content_length: Option<u64>,
    max_header_size: usize,
    max_header_count: usize,
    max_segment_size: u64,
    max_segment_count: u64,
    strict: bool,
}

impl PushParserConfig {
    /// Start a config with the given boundary token (without the leading `--`) and every other
    /// option at its default.
    pub fn new(boundary: impl AsRef<[u8]>) -> Self {
        PushParserConfig {
            boundary: boundary.as_ref().to_vec(),
            content_length: None,
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_header_count: DEFAULT_MAX_HEADER_COUNT,
            max_segment_size: u64::MAX,
            max_segment_count: u64::MAX,
            strict: false,
        }
    }

    /// The total body size declared by the surrounding transport (e.g. an HTTP `Content-Length`).
    /// When set, `parse` fails as soon as more bytes than this have been pushed.
    pub fn content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    /// Cap on a single header line's length. Default 4 KiB.
    pub fn max_header_size(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    /// Cap on the number of headers a single segment may carry. Default 8.
    pub fn max_header_count(mut self, max_header_count: usize) -> Self {
        self.max_header_count = max_header_count;
        self
    }

    /// Cap on one segment's body size. Unlimited by default.
    pub fn max_segment_size(mut self, max_segment_size: u64) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Cap on the total number of segments in the stream. Unlimited by default.
    pub fn max_segment_count(mut self, max_segment_count: u64) -> Self {
        self.max_segment_count = max_segment_count;
        self
    }

    /// Promote tolerable-but-unusual input (preamble garbage, folded headers, a missing `name`
    /// option, data after the terminator) into hard errors. Off by default.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Build the parser. Performs no I/O.
    pub fn build(self) -> PushParser {
        let delimiter = Delimiter::new(&self.boundary);
        PushParser {
            delimiter,
            buffer: Vec::new(),
            offset: 0,
            parsed: 0,
            content_length: self.content_length,
            state: State::Preamble,
            current: None,
            segments: Vec::new(),
            segment_count: 0,
            max_header_size: self.max_header_size,
            max_header_count: self.max_header_count,
            max_segment_size: self.max_segment_size,
            max_segment_count: self.max_segment_count,
            strict: self.strict,
            closed: false,
        }
    }
}

/// A push-based, single-threaded `multipart/form-data` parser.
///
/// Construct via [`PushParserConfig`]. Feed it with [`PushParser::parse`] and drain the returned
/// events before the next call.
pub struct PushParser {
    delimiter: Delimiter,
    buffer: Vec<u8>,
    /// Bytes at the front of `buffer` already consumed; dropped at the start of the next call.
    offset: usize,
    /// Cumulative bytes consumed across the parser's lifetime (for `content_length` accounting).
    parsed: u64,
    content_length: Option<u64>,
    state: State,
    /// Index into `segments` of the in-flight segment, if any.
    current: Option<usize>,
    /// Holds at most one carried-over in-flight segment between calls, plus whatever new
    /// segments this call's scan creates. Trimmed back down to that one element at the start of
    /// every call, so this never grows without bound.
    segments: Vec<Segment>,
    segment_count: u64,
    max_header_size: usize,
    max_header_count: usize,
    max_segment_size: u64,
    max_segment_count: u64,
    strict: bool,
    closed: bool,
}

impl PushParser {
    /// Whether the parser has reached (or errored into) a terminal state and will reject further
    /// non-empty input.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the terminating boundary has been seen.
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Number of segments started so far.
    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    fn start_segment(&mut self) -> Result<usize> {
        if self.segment_count >= self.max_segment_count {
            self.closed = true;
            return Err(MultipartError::limit("max segment count exceeded"));
        }
        self.segment_count += 1;
        let idx = self.segments.len();
        self.segments.push(Segment::new(
            self.max_header_size,
            self.max_header_count,
            self.max_segment_size,
            self.strict,
        ));
        Ok(idx)
    }

    /// Feed the next chunk of the body and drain the events it produces.
    ///
    /// An empty chunk signals end of input: if the stream isn't in the COMPLETE state by then,
    /// this fails with a format error. Calling `parse` again after a non-empty result (or after
    /// any error) is a caller error; a closed parser rejects every further non-empty chunk.
    pub fn parse(&mut self, chunk: &[u8]) -> Result<Vec<Event<'_>>> {
        if self.closed {
            return Err(MultipartError::closed("parser closed"));
        }

        if self.offset > 0 {
            self.buffer.drain(0..self.offset);
            self.parsed += self.offset as u64;
            self.offset = 0;
        }

        // Bound memory across calls: only the in-flight segment (if any) survives into this
        // call's scan. Everything else was already handed to the caller in a prior call's event
        // vector, which the borrow checker has required them to have dropped by now.
        let carried = self.current.take().map(|idx| self.segments.remove(idx));
        self.segments.clear();
        if let Some(segment) = carried {
            self.segments.push(segment);
            self.current = Some(0);
        }

        if let Some(content_length) = self.content_length {
            let total = self.parsed + self.buffer.len() as u64 + chunk.len() as u64;
            if total > content_length {
                self.closed = true;
                return Err(MultipartError::format("content-length exceeded"));
            }
        }

        if self.state == State::Complete && !chunk.is_empty() {
            if self.strict {
                self.closed = true;
                return Err(MultipartError::strict("data after end"));
            }
            trace!("ignoring {} trailing byte(s) after terminator", chunk.len());
            return Ok(Vec::new());
        }

        self.buffer.extend_from_slice(chunk);

        let mut pos = 0usize;
        let mut raw_events: Vec<RawEvent> = Vec::new();

        loop {
            match self.state {
                State::Preamble => {
                    let buf = &self.buffer[pos..];
                    match self.delimiter.find_first(buf) {
                        Some(rel) => {
                            let abs = pos + rel;
                            let preceded_by_crlf = abs >= 2 && &self.buffer[abs - 2..abs] == b"\r\n";
                            if abs != 0 && !preceded_by_crlf {
                                if self.strict {
                                    self.closed = true;
                                    return Err(MultipartError::strict("unexpected data before first boundary"));
                                }
                                warn!("ignoring {abs} byte(s) of preamble garbage before first boundary");
                            }

                            let after = abs + self.delimiter.first_len();
                            if self.buffer.len() - after < 2 {
                                pos = abs;
                                break;
                            }

                            match (self.buffer[after], self.buffer[after + 1]) {
                                (b'\r', b'\n') => {
                                    let idx = self.start_segment()?;
                                    self.current = Some(idx);
                                    self.state = State::Header;
                                    pos = after + 2;
                                    trace!("first boundary found, entering first segment's headers");
                                }
                                (b'-', b'-') => {
                                    self.state = State::Complete;
                                    pos = after + 2;
                                    debug!("empty multipart stream (terminator immediately after preamble)");
                                }
                                (b'\n', _) => {
                                    self.closed = true;
                                    return Err(MultipartError::format("invalid line break after first boundary"));
                                }
                                _ => {
                                    self.closed = true;
                                    return Err(MultipartError::format("unexpected byte after first boundary"));
                                }
                            }
                        }
                        None => {
                            let unread = self.buffer.len() - pos;
                            if unread > PREAMBLE_SCAN_LIMIT {
                                if self.strict {
                                    self.closed = true;
                                    return Err(MultipartError::strict("boundary not found in first chunk"));
                                }
                                warn!("no boundary found in {unread} byte(s) of preamble");
                            }
                            let keep = self.delimiter.len() + 2;
                            let new_pos = self.buffer.len().saturating_sub(keep);
                            if new_pos > pos {
                                pos = new_pos;
                            }
                            break;
                        }
                    }
                }
                State::Header => {
                    let buf = &self.buffer[pos..];
                    match twoway::find_bytes(buf, b"\r\n") {
                        Some(rel) => {
                            let line = &buf[..rel];
                            let idx = self.current.expect("HEADER state always has a current segment");
                            if line.is_empty() {
                                if let Err(e) = self.segments[idx].close_headers() {
                                    self.closed = true;
                                    return Err(e);
                                }
                                raw_events.push(RawEvent::SegmentStart(idx));
                                self.state = State::Body;
                                trace!("segment \"{}\" headers complete", self.segments[idx].name());
                            } else if let Err(e) = self.segments[idx].add_header_line(line) {
                                self.closed = true;
                                return Err(e);
                            }
                            pos += rel + 2;
                        }
                        None => {
                            let buf = &self.buffer[pos..];
                            if buf.contains(&b'\n') {
                                self.closed = true;
                                return Err(MultipartError::format("invalid line break in header"));
                            }
                            if buf.len() > self.max_header_size {
                                self.closed = true;
                                return Err(MultipartError::limit("max header length exceeded"));
                            }
                            break;
                        }
                    }
                }
                // A `CRLF--boundary` match whose following two bytes are neither CRLF nor `--`
                // is a false positive (the body happens to contain boundary-like bytes). That
                // can't end the segment, but it also can't be un-seen: re-scan from just past it
                // for a real delimiter, rather than treating "found a match with a bad tail" the
                // same as "found nothing at all".
                State::Body => 'body: loop {
                    let buf = &self.buffer[pos..];
                    if buf.len() < self.delimiter.len() + 2 {
                        break 'body;
                    }

                    let scan = match self.delimiter.find(buf) {
                        Some(rel) => {
                            let match_start = pos + rel;
                            let tail_start = match_start + self.delimiter.len();
                            if self.buffer.len() - tail_start < 2 {
                                None
                            } else {
                                match (self.buffer[tail_start], self.buffer[tail_start + 1]) {
                                    (b'\r', b'\n') => Some(Ok((match_start, BoundaryTail::NextSegment, tail_start))),
                                    (b'-', b'-') => Some(Ok((match_start, BoundaryTail::Terminator, tail_start))),
                                    _ => Some(Err(tail_start)),
                                }
                            }
                        }
                        None => None,
                    };

                    match scan {
                        Some(Ok((match_start, kind, tail_start))) => {
                            let body_end = match_start;
                            let idx = self.current.expect("BODY state always has a current segment");
                            if body_end > pos {
                                if let Err(e) = self.segments[idx].update_size((body_end - pos) as u64) {
                                    self.closed = true;
                                    return Err(e);
                                }
                                raw_events.push(RawEvent::Data { start: pos, end: body_end });
                            }
                            if let Err(e) = self.segments[idx].mark_complete() {
                                self.closed = true;
                                return Err(e);
                            }
                            raw_events.push(RawEvent::SegmentEnd);

                            match kind {
                                BoundaryTail::NextSegment => {
                                    let new_idx = self.start_segment()?;
                                    self.current = Some(new_idx);
                                    self.state = State::Header;
                                }
                                BoundaryTail::Terminator => {
                                    self.state = State::Complete;
                                    debug!("terminator found after {} segment(s)", self.segment_count);
                                }
                            }
                            pos = tail_start + 2;
                            break 'body;
                        }
                        // Confirmed false match: the bytes through the end of the false
                        // delimiter belong to the body. Emit them and keep scanning from there.
                        Some(Err(false_match_end)) => {
                            let idx = self.current.expect("BODY state always has a current segment");
                            if false_match_end > pos {
                                if let Err(e) = self.segments[idx].update_size((false_match_end - pos) as u64) {
                                    self.closed = true;
                                    return Err(e);
                                }
                                raw_events.push(RawEvent::Data { start: pos, end: false_match_end });
                            }
                            pos = false_match_end;
                            trace!("false boundary match in body, resuming scan past it");
                        }
                        // No match, or a match whose tail isn't in the buffer yet: emit
                        // everything but enough of a tail to recognize a straddling delimiter
                        // next time, and wait for more data.
                        None => {
                            let keep = self.delimiter.len() + 1;
                            let emit_end = self.buffer.len().saturating_sub(keep).max(pos);
                            if emit_end > pos {
                                let idx = self.current.expect("BODY state always has a current segment");
                                if let Err(e) = self.segments[idx].update_size((emit_end - pos) as u64) {
                                    self.closed = true;
                                    return Err(e);
                                }
                                raw_events.push(RawEvent::Data { start: pos, end: emit_end });
                            }
                            pos = emit_end;
                            break 'body;
                        }
                    }
                }
                State::Complete => {
                    pos = self.buffer.len();
                    break;
                }
            }
        }

        self.offset = pos;

        if chunk.is_empty() && self.state != State::Complete {
            self.closed = true;
            return Err(MultipartError::format("unexpected end of multipart stream"));
        }
        if chunk.is_empty() {
            self.closed = true;
        }

        Ok(raw_events
            .into_iter()
            .map(|e| match e {
                RawEvent::SegmentStart(idx) => Event::SegmentStart(&self.segments[idx]),
                RawEvent::Data { start, end } => Event::Data(&self.buffer[start..end]),
                RawEvent::SegmentEnd => Event::SegmentEnd,
            })
            .collect())
    }

    /// Close the parser. If `check_complete` is set and the stream never reached the COMPLETE
    /// state, this fails; either way the parser is closed and its buffer released.
    pub fn close(&mut self, check_complete: bool) -> Result<()> {
        let incomplete = check_complete && self.state != State::Complete;
        self.closed = true;
        self.buffer.clear();
        self.segments.clear();
        self.current = None;
        if incomplete {
            return Err(MultipartError::format("unexpected end of multipart stream"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn collect_bodies(parser: &mut PushParser, input: &[u8], chunk_size: usize) -> Vec<(String, Vec<u8>)> {
        let mut fields: Vec<(String, Vec<u8>)> = Vec::new();
        for chunk in input.chunks(chunk_size.max(1)) {
            for event in parser.parse(chunk).unwrap() {
                match event {
                    Event::SegmentStart(seg) => fields.push((seg.name().to_string(), Vec::new())),
                    Event::Data(data) => fields.last_mut().unwrap().1.extend_from_slice(data),
                    Event::SegmentEnd => {}
                }
            }
        }
        for event in parser.parse(&[]).unwrap() {
            match event {
                Event::SegmentStart(seg) => fields.push((seg.name().to_string(), Vec::new())),
                Event::Data(data) => fields.last_mut().unwrap().1.extend_from_slice(data),
                Event::SegmentEnd => {}
            }
        }
        fields
    }

    #[test]
    fn simple_text_field() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let fields = collect_bodies(&mut parser, input, input.len());
        assert_eq!(fields, vec![("a".to_string(), b"hello".to_vec())]);
        assert!(parser.is_complete());
    }

    #[test]
    fn file_upload_headers() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.png\"\r\nContent-Type: image/png\r\n\r\n\x89PNG\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let mut seen_filename = None;
        let mut seen_content_type = None;
        for event in parser.parse(input).unwrap() {
            if let Event::SegmentStart(seg) = event {
                seen_filename = seg.filename().map(str::to_string);
                seen_content_type = seg.content_type().map(str::to_string);
            }
        }
        parser.parse(&[]).unwrap();
        assert_eq!(seen_filename.as_deref(), Some("x.png"));
        assert_eq!(seen_content_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn two_fields_byte_by_byte() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--foo\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let fields = collect_bodies(&mut parser, input, 1);
        assert_eq!(fields, vec![
            ("a".to_string(), b"1".to_vec()),
            ("b".to_string(), b"2".to_vec()),
        ]);
    }

    #[test]
    fn boundary_like_content_returned_verbatim() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx--foobar\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let fields = collect_bodies(&mut parser, input, input.len());
        assert_eq!(fields, vec![("a".to_string(), b"x--foobar".to_vec())]);
    }

    #[test]
    fn unexpected_eof_is_format_error() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello";
        let mut parser = PushParserConfig::new("foo").build();
        parser.parse(input).unwrap();
        let err = parser.parse(&[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }

    #[test]
    fn segment_size_limit_breach() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").max_segment_size(4).build();
        let err = parser.parse(input).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LimitReached);
    }

    #[test]
    fn chunk_independence_across_every_split_point() {
        let input: &[u8] = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello world\r\n--foo--";
        let whole = {
            let mut parser = PushParserConfig::new("foo").build();
            collect_bodies(&mut parser, input, input.len())
        };
        for split in 1..input.len() {
            let mut parser = PushParserConfig::new("foo").build();
            let mut fields: Vec<(String, Vec<u8>)> = Vec::new();
            for chunk in [&input[..split], &input[split..]] {
                for event in parser.parse(chunk).unwrap() {
                    match event {
                        Event::SegmentStart(seg) => fields.push((seg.name().to_string(), Vec::new())),
                        Event::Data(data) => fields.last_mut().unwrap().1.extend_from_slice(data),
                        Event::SegmentEnd => {}
                    }
                }
            }
            parser.parse(&[]).unwrap();
            assert_eq!(fields, whole, "mismatch splitting at byte {split}");
        }
    }

    #[test]
    fn false_boundary_match_followed_by_real_terminator() {
        // "\r\n--fooX" matches the delimiter prefix but the byte after it is neither CRLF nor
        // "--", so it's body content, not a real boundary; the real terminator follows later in
        // the same buffer.
        let input: &[u8] = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nAAAA\r\n--fooXBBBB\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let fields = collect_bodies(&mut parser, input, input.len());
        assert_eq!(fields, vec![("a".to_string(), b"AAAA\r\n--fooXBBBB".to_vec())]);
        assert!(parser.is_complete());
    }

    #[test]
    fn false_boundary_match_survives_chunk_split_at_every_point() {
        let input: &[u8] = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nAAAA\r\n--fooXBBBB\r\n--foo--";
        let whole = {
            let mut parser = PushParserConfig::new("foo").build();
            collect_bodies(&mut parser, input, input.len())
        };
        for split in 1..input.len() {
            let mut parser = PushParserConfig::new("foo").build();
            let mut fields: Vec<(String, Vec<u8>)> = Vec::new();
            for chunk in [&input[..split], &input[split..]] {
                for event in parser.parse(chunk).unwrap() {
                    match event {
                        Event::SegmentStart(seg) => fields.push((seg.name().to_string(), Vec::new())),
                        Event::Data(data) => fields.last_mut().unwrap().1.extend_from_slice(data),
                        Event::SegmentEnd => {}
                    }
                }
            }
            parser.parse(&[]).unwrap();
            assert_eq!(fields, whole, "mismatch splitting at byte {split}");
        }
    }

    #[test]
    fn missing_content_disposition_is_format_error() {
        let input = b"--foo\r\nContent-Type: text/plain\r\n\r\nhello\r\n--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let err = parser.parse(input).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }

    #[test]
    fn empty_multipart_stream() {
        let input = b"--foo--";
        let mut parser = PushParserConfig::new("foo").build();
        let events = parser.parse(input).unwrap();
        assert!(events.is_empty());
        parser.parse(&[]).unwrap();
        assert!(parser.is_complete());
    }
}
