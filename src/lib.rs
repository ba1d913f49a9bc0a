// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! A strict, bounded-memory parser for HTTP `multipart/form-data` bodies (RFC 7578).
//!
//! The core of this crate is [`PushParser`]: a synchronous state machine that owns no I/O
//! source. Callers feed it arbitrary byte chunks with [`PushParser::parse`] and drain the
//! returned [`Event`]s before pushing again; the parser never blocks and between calls retains
//! only the small trailing window of input needed to recognize a boundary straddling a chunk
//! edge.
//!
//! Three collaborators sit on top of that core for callers who don't want to drive the event
//! loop by hand:
//!
//! * [`MultipartReader`] pulls fully-headered [`ReadSegment`]s off an [`std::io::Read`] source,
//!   buffering each body in memory up to a configurable limit and spilling to a temporary file
//!   past that point.
//! * [`read_form_request`] reads a whole request body (multipart or urlencoded) and routes it
//!   into a [`FormData`] of text fields and file uploads.
//! * [`parse_urlencoded_body`] decodes a plain `application/x-www-form-urlencoded` body.
//!
//! None of the above owns an HTTP server or client abstraction; callers wire them up to whatever
//! transport they're using.
#![deny(missing_docs)]

mod boundary;
mod error;
#[cfg(feature = "fuzzing")]
pub mod fuzzing;
mod headers;
mod multimap;
mod parser;
mod reader;
mod request;
mod segment;
mod urlencoded;

pub use error::{ErrorKind, MultipartError, Result};
pub use headers::{content_disposition_quote, content_disposition_unquote, header_quote, header_unquote};
pub use multimap::MultiMap;
pub use parser::{Event, PushParser, PushParserConfig};
pub use reader::{MultipartReader, ReadSegment};
pub use request::{read_form_request, FormData, SavedField};
pub use segment::Segment;
pub use urlencoded::parse_urlencoded_body;
