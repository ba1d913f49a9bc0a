// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! One `Content-Disposition: form-data` part: its headers, its parsed identity
//! (`name`/`filename`/`content_type`/`charset`), and the running size accounting that enforces
//! `Content-Length` and the configured per-segment size cap.
use crate::error::{MultipartError, Result};
use crate::headers::{content_disposition_unquote, header_unquote, parse_options, title_case};

/// A single part of a `multipart/form-data` body.
///
/// Built incrementally by [`crate::PushParser`] during the HEADER state and handed to the
/// caller, fully headered, the moment the blank line after the headers is seen. Its body size is
/// then tracked as BODY bytes are scanned.
#[derive(Debug, Clone)]
pub struct Segment {
    headers: Vec<(String, String)>,
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    charset: Option<String>,
    declared_length: Option<u64>,
    size: u64,
    complete: bool,
    has_content_disposition: bool,

    max_header_size: usize,
    max_header_count: usize,
    size_limit: u64,
    strict: bool,
}

impl Segment {
    pub(crate) fn new(max_header_size: usize, max_header_count: usize, size_limit: u64, strict: bool) -> Self {
        Segment {
            headers: Vec::new(),
            name: String::new(),
            filename: None,
            content_type: None,
            charset: None,
            declared_length: None,
            size: 0,
            complete: false,
            has_content_disposition: false,
            max_header_size,
            max_header_count,
            size_limit,
            strict,
        }
    }

    /// The headers observed for this segment, in wire order, with Title-Case names.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The `Content-Disposition` `name` option. Empty when the header omitted it (non-strict
    /// mode only; strict mode raises instead).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `Content-Disposition` `filename` option, if present.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The `Content-Type` primary token, lowercased, without its options.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `Content-Type` `charset` option, if present.
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// The `Content-Length` header's value, if present and parseable as a non-negative integer.
    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    /// Bytes of body observed so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the terminating boundary for this segment has been seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Append one CRLF-stripped header line. Handles RFC 2822 obsolete folding (a continuation
    /// line beginning with a space or tab).
    pub(crate) fn add_header_line(&mut self, line: &[u8]) -> Result<()> {
        if let Some(&first) = line.first() {
            if first == b' ' || first == b'\t' {
                if self.strict || self.headers.is_empty() {
                    return Err(MultipartError::strict("unexpected header continuation"));
                }
                let continuation = std::str::from_utf8(line)
                    .map_err(|_| MultipartError::format("header failed to decode"))?
                    .trim();
                let last = self.headers.last_mut().expect("checked non-empty above");
                let combined_len = last.1.len() + 1 + continuation.len();
                if combined_len > self.max_header_size {
                    return Err(MultipartError::limit("max header length exceeded"));
                }
                last.1.push(' ');
                last.1.push_str(continuation);
                return Ok(());
            }
        }

        if line.len() > self.max_header_size {
            return Err(MultipartError::limit("max header length exceeded"));
        }
        if self.headers.len() >= self.max_header_count {
            return Err(MultipartError::limit("max header count exceeded"));
        }

        let line = std::str::from_utf8(line).map_err(|_| MultipartError::format("header failed to decode"))?;
        let colon = line
            .find(':')
            .ok_or_else(|| MultipartError::format("header line missing ':'"))?;
        let name = line[..colon].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_graphic()) {
            return Err(MultipartError::format("invalid header name"));
        }
        let value = line[colon + 1..].trim().to_string();
        self.headers.push((title_case(name), value));
        Ok(())
    }

    /// Finalize headers: parse `Content-Disposition`, `Content-Type` and `Content-Length` out of
    /// the accumulated header list. Called when the blank line ending HEADER state is observed.
    pub(crate) fn close_headers(&mut self) -> Result<()> {
        for (name, value) in self.headers.clone() {
            match name.as_str() {
                "Content-Disposition" => {
                    let (primary, options) = parse_options(&value);
                    if primary != "form-data" {
                        return Err(MultipartError::format("wrong Content-Disposition type"));
                    }
                    let mut has_name = false;
                    for (key, val) in &options {
                        match key.as_str() {
                            "name" => {
                                self.name = content_disposition_unquote(val, false);
                                has_name = true;
                            }
                            "filename" => {
                                self.filename = Some(content_disposition_unquote(val, true));
                            }
                            _ => {}
                        }
                    }
                    if !has_name {
                        if self.strict {
                            return Err(MultipartError::strict("missing name"));
                        }
                        self.name = String::new();
                    }
                    self.has_content_disposition = true;
                }
                "Content-Type" => {
                    let (primary, options) = parse_options(&value);
                    self.content_type = Some(primary);
                    for (key, val) in &options {
                        if key == "charset" {
                            self.charset = Some(header_unquote(val, false));
                        }
                    }
                }
                "Content-Length" => {
                    if let Ok(n) = value.parse::<u64>() {
                        self.declared_length = Some(n);
                    }
                }
                _ => {}
            }
        }

        if !self.has_content_disposition {
            return Err(MultipartError::format("missing Content-Disposition"));
        }
        Ok(())
    }

    /// Record `n` more body bytes, enforcing `Content-Length` and the per-segment size cap.
    pub(crate) fn update_size(&mut self, n: u64) -> Result<()> {
        self.size += n;
        if let Some(declared) = self.declared_length {
            if self.size > declared {
                return Err(MultipartError::format("Content-Length exceeded"));
            }
        }
        if self.size > self.size_limit {
            return Err(MultipartError::limit("max segment size exceeded"));
        }
        Ok(())
    }

    /// Mark this segment complete, verifying its observed size against any declared
    /// `Content-Length`.
    pub(crate) fn mark_complete(&mut self) -> Result<()> {
        if let Some(declared) = self.declared_length {
            if self.size != declared {
                return Err(MultipartError::format("size mismatch"));
            }
        }
        self.complete = true;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn segment() -> Segment {
        Segment::new(4096, 8, u64::MAX, false)
    }

    #[test]
    fn parses_name_and_filename_and_content_type() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Disposition: form-data; name=\"f\"; filename=\"x.png\"").unwrap();
        seg.add_header_line(b"Content-Type: image/png").unwrap();
        seg.close_headers().unwrap();
        assert_eq!(seg.name(), "f");
        assert_eq!(seg.filename(), Some("x.png"));
        assert_eq!(seg.content_type(), Some("image/png"));
    }

    #[test]
    fn missing_content_disposition_is_format_error() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Type: text/plain").unwrap();
        assert!(seg.close_headers().is_err());
    }

    #[test]
    fn missing_name_defaults_empty_non_strict() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Disposition: form-data").unwrap();
        seg.close_headers().unwrap();
        assert_eq!(seg.name(), "");
    }

    #[test]
    fn missing_name_strict_is_error() {
        let mut seg = Segment::new(4096, 8, u64::MAX, true);
        seg.add_header_line(b"Content-Disposition: form-data").unwrap();
        assert!(seg.close_headers().is_err());
    }

    #[test]
    fn folded_continuation_accepted_non_strict() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Disposition: form-data; name=\"a\"").unwrap();
        seg.add_header_line(b" more").unwrap();
        assert_eq!(seg.headers()[0].1, "form-data; name=\"a\" more");
    }

    #[test]
    fn folded_continuation_rejected_strict() {
        let mut seg = Segment::new(4096, 8, u64::MAX, true);
        seg.add_header_line(b"Content-Disposition: form-data; name=\"a\"").unwrap();
        assert!(seg.add_header_line(b" more").is_err());
    }

    #[test]
    fn size_tracking_enforces_content_length() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Disposition: form-data; name=\"a\"").unwrap();
        seg.add_header_line(b"Content-Length: 3").unwrap();
        seg.close_headers().unwrap();
        seg.update_size(3).unwrap();
        assert!(seg.update_size(1).is_err());
    }

    #[test]
    fn size_tracking_enforces_segment_size_limit() {
        let mut seg = Segment::new(4096, 8, 4, false);
        seg.add_header_line(b"Content-Disposition: form-data; name=\"a\"").unwrap();
        seg.close_headers().unwrap();
        seg.update_size(4).unwrap();
        assert!(seg.update_size(1).is_err());
    }

    #[test]
    fn mark_complete_checks_declared_length() {
        let mut seg = segment();
        seg.add_header_line(b"Content-Disposition: form-data; name=\"a\"").unwrap();
        seg.add_header_line(b"Content-Length: 5").unwrap();
        seg.close_headers().unwrap();
        seg.update_size(3).unwrap();
        assert!(seg.mark_complete().is_err());
    }
}
