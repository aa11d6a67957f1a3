//! Socket trait abstraction for named-event transports.
//!
//! The relay connector never talks to a concrete socket type. It asks a
//! [`SocketFactory`] for an [`EventSocket`] bound to the relay endpoint, lets
//! its drivers register handlers, then connects. This keeps the connector
//! testable without a network and lets the WebSocket implementation be swapped.

use crate::TransportOptions;
use crate::registry::EventHandler;
use serde_json::Value;
use std::sync::Arc;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint URL could not be parsed or uses an unsupported scheme
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    /// Socket is not open
    #[error("Socket is closed")]
    Closed,

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// A bidirectional socket carrying named events with JSON payloads.
///
/// Implementations must be safe to use from several threads at once:
/// handlers run on the socket's own I/O task while `emit` is called from
/// whichever task is sending.
pub trait EventSocket: Send + Sync {
    /// Register a handler for an inbound event.
    ///
    /// Handlers for the same event run in registration order.
    fn on(&self, event: &str, handler: EventHandler);

    /// Emit an event to the remote end.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] if the socket was never connected
    /// or has been closed, and [`TransportError::Encoding`] if the frame
    /// cannot be serialized.
    fn emit(&self, event: &str, payload: Value) -> TransportResult<()>;

    /// Start connecting. Returns immediately; the outcome is reported
    /// through the `connect` or `connect_error` events.
    fn connect(&self);

    /// Close the socket. A `disconnect` event follows once the socket is down.
    fn disconnect(&self);

    /// Whether the socket is currently open
    fn is_open(&self) -> bool;

    /// The resolved endpoint URL, including the query string
    fn url(&self) -> &str;
}

/// Creates sockets bound to an endpoint.
pub trait SocketFactory: Send + Sync {
    /// Create a socket for `endpoint` without connecting it.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidUrl`] if the endpoint is malformed and
    /// [`TransportError::InvalidConfig`] if the options are not supported.
    fn open(
        &self,
        endpoint: &str,
        options: &TransportOptions,
    ) -> TransportResult<Arc<dyn EventSocket>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Closed;
        assert_eq!(err.to_string(), "Socket is closed");

        let err = TransportError::InvalidUrl("::".to_string());
        assert!(err.to_string().contains("Invalid endpoint URL"));

        let err = TransportError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let err = TransportError::InvalidConfig("test".to_string());
        assert!(err.to_string().contains("Invalid configuration"));
    }
}
