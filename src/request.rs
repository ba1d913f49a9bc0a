// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Routing a whole request body into form fields and file uploads, without depending on any
//! particular HTTP server's request type.
use std::io::{self, Read, Seek, SeekFrom};

use tempfile::SpooledTempFile;

use crate::error::{MultipartError, Result};
use crate::headers::{header_unquote, parse_options};
use crate::multimap::MultiMap;
use crate::parser::PushParserConfig;
use crate::reader::MultipartReader;
use crate::urlencoded::parse_urlencoded_body;

/// A file (or binary form field) collected by [`read_form_request`]: the client-supplied
/// filename and content type, and the body, buffered in memory or spooled to disk exactly like
/// [`crate::ReadSegment`]'s body.
pub struct SavedField {
    filename: Option<String>,
    content_type: Option<String>,
    body: SpooledTempFile,
}

impl SavedField {
    /// The client-supplied filename, if any.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The part's `Content-Type`, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Read for SavedField {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// The result of routing a request body: plain text fields and file uploads, keyed by their
/// `name` option, each preserving arrival order for repeated names.
#[derive(Default)]
pub struct FormData {
    /// Text fields (segments without a `filename` option, or a decoded urlencoded body).
    pub fields: MultiMap<String, String>,
    /// File uploads (segments with a `filename` option).
    pub files: MultiMap<String, SavedField>,
}

/// Read and route a whole request body given its `Content-Type` header value.
///
/// Accepts `multipart/form-data` (extracting `boundary` from the header's options and driving a
/// [`MultipartReader`] over `body`) and `application/x-www-form-urlencoded` (decoded directly
/// into `fields`). Any other content type is rejected in strict mode and otherwise tolerated,
/// returning an empty [`FormData`].
pub fn read_form_request(
    content_type: &str,
    content_length: Option<u64>,
    body: impl Read,
    strict: bool,
) -> Result<FormData> {
    let (primary, options) = parse_options(content_type);

    match primary.as_str() {
        "multipart/form-data" => {
            let boundary = options
                .iter()
                .find(|(key, _)| key == "boundary")
                .map(|(_, value)| header_unquote(value, false))
                .ok_or_else(|| MultipartError::format("Content-Type is missing a boundary"))?;

            let mut config = PushParserConfig::new(boundary).strict(strict);
            if let Some(content_length) = content_length {
                config = config.content_length(content_length);
            }

            let mut reader = MultipartReader::new(body, config);
            let mut fields = MultiMap::new();
            let mut files = MultiMap::new();

            while let Some(mut segment) = reader.next_segment()? {
                if segment.filename().is_some() {
                    let name = segment.name().to_string();
                    let filename = segment.filename().map(str::to_string);
                    let segment_content_type = segment.content_type().map(str::to_string);
                    let mut saved_body = SpooledTempFile::new(0);
                    io::copy(&mut segment, &mut saved_body)
                        .map_err(|e| MultipartError::format(format!("failed buffering upload: {e}")))?;
                    saved_body
                        .seek(SeekFrom::Start(0))
                        .map_err(|e| MultipartError::format(format!("failed rewinding upload: {e}")))?;
                    files.insert(name, SavedField {
                        filename,
                        content_type: segment_content_type,
                        body: saved_body,
                    });
                } else {
                    let name = segment.name().to_string();
                    let mut text = String::new();
                    segment
                        .read_to_string(&mut text)
                        .map_err(|e| MultipartError::format(format!("field body is not valid UTF-8: {e}")))?;
                    fields.insert(name, text);
                }
            }

            Ok(FormData { fields, files })
        }
        "application/x-www-form-urlencoded" => {
            const DEFAULT_MAX_URLENCODED_SIZE: u64 = 16 * 1024 * 1024;
            let max_size = content_length.unwrap_or(DEFAULT_MAX_URLENCODED_SIZE);
            let fields = parse_urlencoded_body(body, max_size)?;
            Ok(FormData { fields, files: MultiMap::new() })
        }
        _ if strict => Err(MultipartError::strict(format!("unsupported content type: {content_type}"))),
        _ => Ok(FormData::default()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn routes_fields_and_files_by_filename_presence() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n\
--foo\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\nContent-Type: text/plain\r\n\r\nbody\r\n\
--foo--";

        let form = read_form_request("multipart/form-data; boundary=foo", None, &input[..], false).unwrap();
        assert_eq!(form.fields.get("a").map(String::as_str), Some("hello"));
        assert!(form.files.get("f").is_some());
        let file = form.files.get("f").unwrap();
        assert_eq!(file.filename(), Some("x.txt"));
        assert_eq!(file.content_type(), Some("text/plain"));
    }

    #[test]
    fn repeated_field_names_accumulate_in_order() {
        let input = b"--foo\r\nContent-Disposition: form-data; name=\"tag\"\r\n\r\none\r\n\
--foo\r\nContent-Disposition: form-data; name=\"tag\"\r\n\r\ntwo\r\n\
--foo--";
        let form = read_form_request("multipart/form-data; boundary=foo", None, &input[..], false).unwrap();
        assert_eq!(
            form.fields.get_all("tag").map(String::as_str).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
    }

    #[test]
    fn urlencoded_body_goes_to_fields() {
        let form = read_form_request(
            "application/x-www-form-urlencoded",
            Some(11),
            "a=1&b=hello".as_bytes(),
            false,
        )
        .unwrap();
        assert_eq!(form.fields.get("a").map(String::as_str), Some("1"));
        assert_eq!(form.fields.get("b").map(String::as_str), Some("hello"));
    }

    #[test]
    fn unsupported_content_type_is_tolerated_non_strict() {
        let form = read_form_request("text/plain", None, &b""[..], false).unwrap();
        assert!(form.fields.is_empty());
        assert!(form.files.is_empty());
    }

    #[test]
    fn unsupported_content_type_rejected_strict() {
        let err = read_form_request("text/plain", None, &b""[..], true).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StrictWarning);
    }
}
