// Copyright 2016 `multipart` Crate Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use std::fmt;

/// The kinds of failure a [`PushParser`](crate::PushParser) or one of its collaborators can
/// raise.
///
/// This is the dispatch tag; the human-readable detail lives on [`MultipartError`] itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The input violates the `multipart/form-data` grammar, or is internally inconsistent
    /// (a declared `Content-Length` that doesn't match the bytes actually seen, a boundary
    /// that never arrives, and the like).
    Format,
    /// Input that is unusual but technically tolerable; only raised when the parser was
    /// constructed with `strict: true`.
    StrictWarning,
    /// A configured limit (header size, header count, segment size, segment count) was
    /// exceeded.
    LimitReached,
    /// The parser was used after it had already closed, or `close` observed an incomplete
    /// stream.
    Closed,
}

/// The error type for this crate.
///
/// Carries an [`ErrorKind`] for programmatic dispatch and a message describing which rule was
/// violated. Construct with `Display`-friendly messages; callers that need to branch on the
/// failure category should match on [`MultipartError::kind`] rather than parsing the message.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct MultipartError {
    kind: ErrorKind,
    message: String,
}

impl MultipartError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        MultipartError {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    pub(crate) fn strict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StrictWarning, message)
    }

    pub(crate) fn limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LimitReached, message)
    }

    pub(crate) fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Closed, message)
    }

    /// The category of failure, for callers that want to map errors to e.g. HTTP status codes
    /// without string matching.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Format => "format error",
            ErrorKind::StrictWarning => "strict warning",
            ErrorKind::LimitReached => "limit reached",
            ErrorKind::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, MultipartError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_is_queryable_without_string_matching() {
        let err = MultipartError::limit("Maximum segment size exceeded");
        assert_eq!(err.kind(), ErrorKind::LimitReached);
        assert_eq!(err.to_string(), "Maximum segment size exceeded");
    }
}
