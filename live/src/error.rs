//! Error types for live-update delivery.
//!
//! None of these escape `Manager::send` or `Manager::broadcast`; they exist so
//! the delivery path can log precisely why a session was pruned.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// The session's writer has gone away (socket closed, broken pipe, or
    /// the session was already closed by the registry).
    Closed,

    /// The session's outbound queue is full. The client is not reading fast
    /// enough and is disconnected instead of buffered without bound.
    Backpressure { capacity: usize },

    /// The payload could not be turned into a JSON text frame.
    Serialization(serde_json::Error),
}

impl Error {
    /// Whether the failure is attributable to the session rather than the payload.
    pub fn is_session_fault(&self) -> bool {
        !matches!(self, Error::Serialization(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Closed => write!(f, "session closed"),
            Error::Backpressure { capacity } => {
                write!(f, "outbound queue full ({capacity} frames)")
            }
            Error::Serialization(err) => write!(f, "serialization error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err)
    }
}
