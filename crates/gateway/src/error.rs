//! Error types for the gateway crate

use std::time::Duration;

use fixgate_core::RejectReason;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::session::SessionState;

/// Wire codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty message")]
    Empty,

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Checksum mismatch: declared {declared:03}, computed {computed:03}")]
    ChecksumMismatch { declared: u32, computed: u32 },

    #[error("Body length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    Closed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timeout waiting for data")]
    Timeout,
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Logon rejected: {0}")]
    Rejected(String),

    #[error("Logon timed out")]
    LogonTimeout,

    #[error("Session not active (state {0:?})")]
    NotActive(SessionState),

    #[error("Peer stopped responding")]
    PeerUnresponsive,
}

/// Errors returned by `Connect`
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session rejected: {reason}")]
    SessionRejected { reason: String },

    #[error("Connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<SessionError> for ConnectError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Transport(t) => ConnectError::Transport(t),
            SessionError::Rejected(reason) => ConnectError::SessionRejected { reason },
            SessionError::LogonTimeout => ConnectError::Timeout(Duration::ZERO),
            other => ConnectError::WorkerUnavailable(other.to_string()),
        }
    }
}

/// Classification of a failed `Submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestErrorKind {
    Timeout,
    SessionNotActive,
    Rejected,
    TransportFailure,
}

/// Per-request failure returned to the caller that issued the request
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind:?}: {message}")]
pub struct RequestError {
    pub kind: RequestErrorKind,
    pub message: String,
    /// Venue reject code, mapped, when the venue gave one
    pub reason: Option<RejectReason>,
}

impl RequestError {
    pub fn new(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            reason: None,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            RequestErrorKind::Timeout,
            format!("No response within {:.1}s", after.as_secs_f64()),
        )
    }

    pub fn session_not_active(message: impl Into<String>) -> Self {
        Self::new(RequestErrorKind::SessionNotActive, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RequestErrorKind::TransportFailure, message)
    }

    pub fn rejected(message: impl Into<String>, reason: Option<RejectReason>) -> Self {
        Self {
            kind: RequestErrorKind::Rejected,
            message: message.into(),
            reason,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == RequestErrorKind::Timeout
    }
}

/// Errors returned by `Subscribe`
#[derive(Error, Debug)]
pub enum SubscribeError {
    #[error("Subscription request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid subscription: {0}")]
    Invalid(String),
}

/// Gateway-level errors (facade operations)
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}
