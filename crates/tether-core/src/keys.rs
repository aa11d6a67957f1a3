//! Server credential key pair

use crate::error::{Result, TetherError};
use std::fmt;
use tether_transport::TransportOptions;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Private/public key pair issued to this server by the authentication service.
///
/// The keys are opaque strings; the connector only forwards them to the relay
/// backend and the socket query string. The private key is wiped on drop and
/// never appears in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    private_key: String,
    public_key: String,
}

impl KeySet {
    /// Create a key pair
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::InvalidConfig`] if either key is empty.
    pub fn new(private_key: impl Into<String>, public_key: impl Into<String>) -> Result<Self> {
        let keys = Self {
            private_key: private_key.into(),
            public_key: public_key.into(),
        };
        if keys.private_key.trim().is_empty() {
            return Err(TetherError::invalid_config("private key is empty"));
        }
        if keys.public_key.trim().is_empty() {
            return Err(TetherError::invalid_config("public key is empty"));
        }
        Ok(keys)
    }

    /// The private key
    #[must_use]
    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// The public key
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Authentication parameters, in wire order:
    /// `type=server`, `private=<key>`, `public=<key>`
    #[must_use]
    pub fn query_pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("type", "server"),
            ("private", &self.private_key),
            ("public", &self.public_key),
        ]
    }

    /// Socket options for a relay connection: reconnection disabled,
    /// credentials attached as query parameters.
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        self.query_pairs()
            .into_iter()
            .fold(TransportOptions::new(), |opts, (k, v)| opts.with_query(k, v))
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_keys() {
        assert!(KeySet::new("", "pub").is_err());
        assert!(KeySet::new("priv", "  ").is_err());
        assert!(KeySet::new("priv", "pub").is_ok());
    }

    #[test]
    fn test_transport_options_query() {
        let keys = KeySet::new("priv-key", "pub-key").unwrap();
        let opts = keys.transport_options();
        assert!(!opts.reconnection);
        assert_eq!(
            opts.query_string(),
            "type=server&private=priv-key&public=pub-key"
        );
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = KeySet::new("super-secret", "pub-key").unwrap();
        let rendered = format!("{keys:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("pub-key"));
    }
}
