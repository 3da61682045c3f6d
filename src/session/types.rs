//! Shared session types and the relay error taxonomy

use std::fmt;

use crate::transport::TransportError;

/// Lifecycle state of one game session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Ready,
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Errors raised by the registry, lifecycle, focus and dispatcher
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("A session named {0} already exists")]
    DuplicateSession(String),
    #[error("Bring-up is already in progress")]
    AlreadyStarting,
    #[error("Sessions have already started")]
    AlreadyStarted,
    #[error("No session named {requested}")]
    NotFound {
        requested: String,
        retained: Option<String>,
    },
    #[error("No active session to control")]
    NoActiveSession { focused: Option<String> },
    #[error("Sender {0} is not on the allow-list")]
    Unauthorized(String),
    #[error("Malformed account {name:?}: {reason}")]
    MalformedAccount { name: String, reason: String },
    #[error("Session {name} is not connected yet")]
    NotConnected { name: String },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
