// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Structured parsing of `primary; key=value; key="value"` header values, and the two
//! quoting conventions a `Content-Disposition: form-data` header may use for its options.
//!
//! There is deliberately no compiled regex here (and therefore no lazily-initialized global
//! state): the grammar is small enough that a hand-written scanner is both clearer and avoids
//! the startup-order questions a `static` regex would raise.

/// Split a header value into its primary token (lowercased, trimmed) and its `key=value`
/// options, in order of appearance. Quoted option values keep their surrounding quotes; use
/// [`header_unquote`] or [`content_disposition_unquote`] to dequote them.
pub(crate) fn parse_options(value: &str) -> (String, Vec<(String, String)>) {
    let mut sections = value.splitn(2, ';');
    let primary = sections.next().unwrap_or("").trim().to_lowercase();
    let mut rest = sections.next().unwrap_or("");
    let mut options = Vec::new();

    loop {
        rest = rest.trim_start_matches([' ', '\t', ';']);
        if rest.is_empty() {
            break;
        }

        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_lowercase();
        rest = rest[eq + 1..].trim_start();

        if let Some(stripped) = rest.strip_prefix('"') {
            let bytes = stripped.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    i += 2;
                    continue;
                }
                if bytes[i] == b'"' {
                    break;
                }
                i += 1;
            }
            let end = i.min(stripped.len());
            // Keep the surrounding quotes; the value is dequoted by the caller.
            let value = &rest[..(end + 2).min(rest.len())];
            options.push((key, value.to_string()));
            rest = &rest[(end + 2).min(rest.len())..];
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            options.push((key, value));
            rest = &rest[end..];
        }
    }

    (primary, options)
}

fn strip_quotes(val: &str) -> Option<&str> {
    if val.len() >= 2 && val.starts_with('"') && val.ends_with('"') {
        Some(&val[1..val.len() - 1])
    } else {
        None
    }
}

/// `filename="C:\path\to\report.txt"` → `report.txt`: old IE versions sent the full client-side
/// path as the `filename` option. Detect a drive (`X:\`) or UNC (`\\`) prefix and keep only the
/// trailing path component.
fn ie6_basename(s: &str) -> &str {
    let bytes = s.as_bytes();
    let drive = bytes.len() >= 3 && bytes[1] == b':' && bytes[2] == b'\\';
    let unc = bytes.len() >= 2 && bytes[0] == b'\\' && bytes[1] == b'\\';
    if drive || unc {
        s.rsplit('\\').next().unwrap_or(s)
    } else {
        s
    }
}

fn unescape_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn decode_whatwg_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = match (bytes[i + 1].to_ascii_uppercase(), bytes[i + 2].to_ascii_uppercase()) {
                (b'0', b'D') => Some(b'\r'),
                (b'0', b'A') => Some(b'\n'),
                (b'2', b'2') => Some(b'"'),
                _ => None,
            };
            if let Some(d) = decoded {
                out.push(d);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).expect("byte-for-byte passthrough preserves UTF-8 validity")
}

/// Dequote a legacy RFC 2045-style option value: strip surrounding quotes (if any) and unescape
/// `\\` and `\"`. Apply the IE6 full-path fix when `is_filename` is set.
pub fn header_unquote(val: &str, is_filename: bool) -> String {
    match strip_quotes(val) {
        Some(inner) => {
            let inner = if is_filename { ie6_basename(inner) } else { inner };
            unescape_backslashes(inner)
        }
        None => val.to_string(),
    }
}

/// Quote a value for use as a legacy RFC 2045-style option, escaping `\` and `"`. Values that
/// need no quoting (no special characters) are returned bare.
pub fn header_quote(val: &str) -> String {
    const SPECIALS: &[char] = &[
        '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}', ' ', '\t',
    ];
    if val.is_empty() || val.contains(SPECIALS) {
        let escaped = val.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        val.to_string()
    }
}

/// Dequote a WHATWG-style (`multipart/form-data` `Content-Disposition`) option value: strip
/// surrounding quotes, decode `%0D`/`%0A`/`%22` escapes, then fall back to legacy backslash
/// unescaping for values that used the older convention. Apply the IE6 full-path fix when
/// `is_filename` is set.
pub fn content_disposition_unquote(val: &str, is_filename: bool) -> String {
    let inner = strip_quotes(val).unwrap_or(val);
    let inner = if is_filename { ie6_basename(inner) } else { inner };
    let decoded = decode_whatwg_escapes(inner);
    unescape_backslashes(&decoded)
}

/// Quote a value as a WHATWG-style `Content-Disposition` option: always wrap in quotes,
/// percent-encoding `"`, CR and LF.
pub fn content_disposition_quote(val: &str) -> String {
    let escaped = val.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A");
    format!("\"{escaped}\"")
}

/// Normalize a header name to Title-Case (`content-type` → `Content-Type`).
pub(crate) fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    let mut s = first.to_ascii_uppercase().to_string();
                    s.push_str(&chars.as_str().to_ascii_lowercase());
                    s
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
