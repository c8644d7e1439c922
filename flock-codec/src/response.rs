use crate::{Error, ERR_PREFIX, OK_PREFIX};
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Error codes carried on the wire in `-ERR:<code>` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    WrongState,
    TermIsLower,
    Unknown,
}

impl ErrorCode {
    fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::WrongState => "WRONG_STATE",
            ErrorCode::TermIsLower => "TERM_IS_LOWER",
            ErrorCode::Unknown => "UNKNOWN_ERROR",
        }
    }

    fn from_str(code: &str) -> ErrorCode {
        match code {
            "WRONG_STATE" => ErrorCode::WrongState,
            "TERM_IS_LOWER" => ErrorCode::TermIsLower,
            _ => ErrorCode::Unknown,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A reply to a single request, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `+OK:<payload>` — the payload is the responder's node name.
    Ok(String),
    /// `-ERR:<code>`
    Err(ErrorCode),
}

impl Response {
    pub fn parse(line: &str) -> Result<Response, Error> {
        if let Some(payload) = strip_prefix(line, OK_PREFIX) {
            return Ok(Response::Ok(payload.trim_end().to_string()));
        }
        if let Some(code) = strip_prefix(line, ERR_PREFIX) {
            return Ok(Response::Err(ErrorCode::from_str(code.trim_end())));
        }
        Err(Error::MalformedResponse(line.to_string()))
    }

    pub fn to_buf(&self, buf: &mut BytesMut) {
        let line = match self {
            Response::Ok(payload) => format!("{}{}\r\n", OK_PREFIX, payload),
            Response::Err(code) => format!("{}{}\r\n", ERR_PREFIX, code),
        };
        buf.put_slice(line.as_bytes());
    }

    /// Whether this reply counts as a granted vote.
    pub fn is_positive(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

fn strip_prefix<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.starts_with(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
