//! Hand-rolled error types, in the teacher's style: one enum per concern, manual
//! `Display`/`std::error::Error` impls, `From` conversions at the X11/io boundary.
//! No `thiserror`/`anyhow` — matches 1Password-arboard's own `Error` type.

use std::fmt;

/// Daemon-level error. Only [`Error::ConnectionFailed`], atom-interning failure (folded into
/// `ConnectionFailed`) and single-instance loss propagate out of the Event Pump; everything
/// else is handled locally by the state machines per the error taxonomy.
#[derive(Debug)]
pub enum Error {
    ConnectionFailed(String),
    Protocol(String),
    Io(std::io::Error),
    AnotherInstanceRunning,
    Timeout,
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConnectionFailed(msg) => write!(f, "X11 connection failed: {msg}"),
            Error::Protocol(msg) => write!(f, "protocol invariant violated: {msg}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::AnotherInstanceRunning => write!(f, "another instance is already running"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<x11rb::errors::ConnectionError> for Error {
    fn from(e: x11rb::errors::ConnectionError) -> Self {
        Error::ConnectionFailed(e.to_string())
    }
}

impl From<x11rb::errors::ConnectError> for Error {
    fn from(e: x11rb::errors::ConnectError) -> Self {
        Error::ConnectionFailed(e.to_string())
    }
}

impl From<x11rb::errors::ReplyError> for Error {
    fn from(e: x11rb::errors::ReplyError) -> Self {
        Error::ConnectionFailed(e.to_string())
    }
}

impl From<x11rb::errors::ReplyOrIdError> for Error {
    fn from(e: x11rb::errors::ReplyOrIdError) -> Self {
        Error::ConnectionFailed(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Narrower error surface for the History Store: it never panics, and callers may ignore
/// the outcome if they so choose (§7 of the design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    NotFound,
    Overflow,
    Io,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::NotFound => write!(f, "no item at that index"),
            HistoryError::Overflow => write!(f, "file exceeds the requested maximum size"),
            HistoryError::Io => write!(f, "filesystem operation failed"),
        }
    }
}

impl std::error::Error for HistoryError {}

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;
