//! Error types for the relay connection core
//!
//! None of these errors escape [`SocketConnector::setup_connection`]; the
//! connector converts every failure into a transition to
//! [`ConnectionState::Idle`] plus a log line. Inside an attempt the login and
//! socket-open failures are carried as [`TetherError`] and classified before
//! they are logged. They also surface from construction and configuration,
//! and from the [`HandshakeClient`] seam.
//!
//! # Error Categories
//!
//! - **Transient**: may succeed on a later `setup_connection` (backend
//!   unreachable, socket refused, timeouts)
//! - **Permanent**: will not succeed without intervention (invalid
//!   configuration, rejected credentials, malformed relay endpoint)
//!
//! [`SocketConnector::setup_connection`]: crate::SocketConnector::setup_connection
//! [`ConnectionState::Idle`]: crate::ConnectionState::Idle
//! [`HandshakeClient`]: crate::HandshakeClient

use std::borrow::Cow;
use tether_transport::TransportError;
use thiserror::Error;

/// Errors raised by the relay-assignment backend client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Backend could not be reached or the request failed at the HTTP level
    #[error("Relay backend unreachable: {0}")]
    Transport(Cow<'static, str>),

    /// Backend answered with a body that does not match the expected shape
    #[error("Invalid relay backend response: {0}")]
    InvalidResponse(Cow<'static, str>),

    /// Backend answered with a structured error
    #[error("Relay backend rejected the request: {code} ({message})")]
    Rejected {
        /// Machine-readable error code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl HandshakeError {
    /// Machine code embedded in the idle reason when a login fails
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            HandshakeError::Transport(_) => "TRANSPORT",
            HandshakeError::InvalidResponse(_) => "INVALID_RESPONSE",
            HandshakeError::Rejected { code, .. } => code,
        }
    }

    /// Create a transport error with static context (zero allocation)
    #[must_use]
    pub const fn transport(context: &'static str) -> Self {
        HandshakeError::Transport(Cow::Borrowed(context))
    }

    /// Create an invalid response error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_response(context: &'static str) -> Self {
        HandshakeError::InvalidResponse(Cow::Borrowed(context))
    }
}

impl From<reqwest::Error> for HandshakeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HandshakeError::InvalidResponse(Cow::Owned(err.to_string()))
        } else {
            HandshakeError::Transport(Cow::Owned(err.to_string()))
        }
    }
}

/// Errors that can occur in connector operations
#[derive(Debug, Error)]
pub enum TetherError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Handshake with the relay backend failed
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Socket transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Packet could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),
}

impl TetherError {
    /// Returns true if a later connection attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            TetherError::Timeout(_) => true,
            TetherError::Handshake(HandshakeError::Transport(_)) => true,
            TetherError::Transport(TransportError::ConnectionFailed(_) | TransportError::Closed) => {
                true
            }
            _ => false,
        }
    }

    /// Returns true if retrying without intervention cannot succeed
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            TetherError::InvalidConfig(_) | TetherError::Serialization(_) => true,
            TetherError::Handshake(HandshakeError::Rejected { .. }) => true,
            TetherError::Transport(
                TransportError::InvalidUrl(_) | TransportError::InvalidConfig(_),
            ) => true,
            _ => false,
        }
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        TetherError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create a timeout error with static context (zero allocation)
    #[must_use]
    pub const fn timeout(context: &'static str) -> Self {
        TetherError::Timeout(Cow::Borrowed(context))
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Serialization(Cow::Owned(err.to_string()))
    }
}

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, TetherError>;
