//! # Tether Transport
//!
//! Named-event socket layer used by the Tether relay connector.
//!
//! This crate provides:
//! - The [`EventSocket`] / [`SocketFactory`] abstraction over a bidirectional
//!   socket that carries named events with JSON payloads
//! - [`EventRegistry`], the event-name to handler table every socket dispatches through
//! - [`TransportOptions`], the connection-time options (reconnection policy and
//!   authentication query parameters)
//! - A WebSocket implementation built on `tokio-tungstenite`
//! - An in-memory implementation for tests and local wiring
//!
//! ## Wire format
//!
//! Every WebSocket text frame is a JSON object:
//!
//! ```text
//! {"event": "<name>", "data": <any JSON value>}
//! ```
//!
//! Lifecycle events (`connect`, `disconnect`, `connect_error`) are never sent
//! over the wire; they are synthesized locally by the socket implementation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod registry;
pub mod transport;
pub mod websocket;

pub use memory::{ConnectBehavior, MemorySocket, MemorySocketFactory};
pub use registry::{EventHandler, EventRegistry};
pub use transport::{EventSocket, SocketFactory, TransportError, TransportResult};
pub use websocket::{WsSocket, WsSocketFactory};

use url::Url;

/// Well-known event names
pub mod events {
    /// Socket opened and the remote end accepted the connection
    pub const CONNECT: &str = "connect";

    /// Socket closed, by either side
    pub const DISCONNECT: &str = "disconnect";

    /// Socket could not be opened
    pub const CONNECT_ERROR: &str = "connect_error";

    /// Outbound packet channel
    pub const DATA: &str = "data";
}

/// Connection-time transport options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Let the socket reconnect on its own after a drop.
    ///
    /// The relay connector owns retry semantics, so this is always `false`
    /// in practice; the socket implementations reject `true`.
    pub reconnection: bool,

    /// Query parameters appended to the endpoint URL, in order
    pub query: Vec<(String, String)>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            reconnection: false,
            query: Vec::new(),
        }
    }
}

impl TransportOptions {
    /// Create options with reconnection disabled and no query parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query parameter
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Render the query parameters as `k=v&k=v`, without percent-encoding
    #[must_use]
    pub fn query_string(&self) -> String {
        self.query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Resolve the socket URL for an endpoint
    ///
    /// HTTP schemes are mapped onto their WebSocket counterparts and the
    /// query parameters are appended after any query already present.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the endpoint does not parse or
    /// uses a scheme other than `ws`, `wss`, `http` or `https`, and
    /// [`TransportError::InvalidConfig`] if reconnection is requested.
    pub fn endpoint_url(&self, endpoint: &str) -> TransportResult<Url> {
        if self.reconnection {
            return Err(TransportError::InvalidConfig(
                "automatic reconnection is not supported".to_string(),
            ));
        }

        let mut url =
            Url::parse(endpoint).map_err(|e| TransportError::InvalidUrl(format!("{endpoint}: {e}")))?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "{endpoint}: unsupported scheme '{other}'"
                )));
            }
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(TransportError::InvalidUrl(format!(
                "{endpoint}: cannot switch to {scheme}"
            )));
        }

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_options() -> TransportOptions {
        TransportOptions::new()
            .with_query("type", "server")
            .with_query("private", "priv-key")
            .with_query("public", "pub-key")
    }

    #[test]
    fn test_default_options_disable_reconnection() {
        let opts = TransportOptions::default();
        assert!(!opts.reconnection);
        assert!(opts.query.is_empty());
    }

    #[test]
    fn test_query_string_order() {
        assert_eq!(
            server_options().query_string(),
            "type=server&private=priv-key&public=pub-key"
        );
    }

    #[test]
    fn test_endpoint_url_appends_query() {
        let url = server_options()
            .endpoint_url("wss://relay.example/ep")
            .unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ep");
        assert_eq!(
            url.query(),
            Some("type=server&private=priv-key&public=pub-key")
        );
    }

    #[test]
    fn test_endpoint_url_maps_http_schemes() {
        let opts = TransportOptions::new();
        assert_eq!(opts.endpoint_url("http://relay.example").unwrap().scheme(), "ws");
        assert_eq!(opts.endpoint_url("https://relay.example").unwrap().scheme(), "wss");
    }

    #[test]
    fn test_endpoint_url_rejects_garbage() {
        let opts = TransportOptions::new();
        assert!(matches!(
            opts.endpoint_url("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            opts.endpoint_url("ftp://relay.example"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_url_rejects_reconnection() {
        let opts = TransportOptions {
            reconnection: true,
            ..TransportOptions::default()
        };
        assert!(matches!(
            opts.endpoint_url("wss://relay.example"),
            Err(TransportError::InvalidConfig(_))
        ));
    }
}
