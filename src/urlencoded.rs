// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Reading `application/x-www-form-urlencoded` bodies, for the non-multipart branch of
//! [`crate::read_form_request`].
use std::io::Read;

use crate::error::{MultipartError, Result};
use crate::multimap::MultiMap;

/// Read up to `max_size` bytes from `body` and decode them as
/// `application/x-www-form-urlencoded`, preserving blank values (`a=&b=1` yields `a == ""`).
///
/// Fails with a [`crate::ErrorKind::LimitReached`] error if the body is larger than `max_size`;
/// never reads more than `max_size + 1` bytes to discover that.
pub fn parse_urlencoded_body(mut body: impl Read, max_size: u64) -> Result<MultiMap<String, String>> {
    let mut buf = Vec::new();
    (&mut body)
        .take(max_size + 1)
        .read_to_end(&mut buf)
        .map_err(|e| MultipartError::format(format!("failed reading urlencoded body: {e}")))?;

    if buf.len() as u64 > max_size {
        return Err(MultipartError::limit("max body size exceeded"));
    }

    let mut fields = MultiMap::new();
    for (key, value) in form_urlencoded::parse(&buf) {
        fields.insert(key.into_owned(), value.into_owned());
    }
    Ok(fields)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_and_keeps_blank_values() {
        let fields = parse_urlencoded_body("a=&b=1".as_bytes(), 1024).unwrap();
        assert_eq!(fields.get("a").map(String::as_str), Some(""));
        assert_eq!(fields.get("b").map(String::as_str), Some("1"));
    }

    #[test]
    fn rejects_body_over_max_size() {
        let err = parse_urlencoded_body("a=123456789".as_bytes(), 4).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::LimitReached);
    }
}
