//! Configuration system for the Tether CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_core::handshake::{DEFAULT_LOGIN_URL, DEFAULT_LOGOUT_URL};
use tether_core::{ConnectorConfig, HandshakeEndpoints, KeySet};

/// Longest accepted timeout, in seconds
const MAX_TIMEOUT_SECS: u64 = 600;

/// Tether configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay backend configuration
    #[serde(default)]
    pub relay: RelayConfig,
    /// Server key pair
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Login endpoint
    #[serde(default = "default_login_url")]
    pub login_url: String,
    /// Logout endpoint
    #[serde(default = "default_logout_url")]
    pub logout_url: String,
    /// Relay login watchdog
    #[serde(default = "default_connect_timeout")]
    pub handshake_timeout_secs: u64,
    /// Socket connect watchdog
    #[serde(default = "default_connect_timeout")]
    pub socket_timeout_secs: u64,
    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Server key pair
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Private key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,
    /// Public key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

fn default_logout_url() -> String {
    DEFAULT_LOGOUT_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    tether_core::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_request_timeout() -> u64 {
    HandshakeEndpoints::default().request_timeout.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            logout_url: default_logout_url(),
            handshake_timeout_secs: default_connect_timeout(),
            socket_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("tether/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Replace configured keys with the ones given on the command line or
    /// in the environment
    pub fn override_credentials(&mut self, private_key: Option<String>, public_key: Option<String>) {
        if let Some(key) = private_key {
            self.credentials.private_key = key;
        }
        if let Some(key) = public_key {
            self.credentials.public_key = key;
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, endpoint) in [
            ("Login URL", &self.relay.login_url),
            ("Logout URL", &self.relay.logout_url),
        ] {
            let url = url::Url::parse(endpoint)
                .map_err(|e| anyhow::anyhow!("{} '{}' is invalid: {}", name, endpoint, e))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("{} '{}' must use http or https", name, endpoint);
            }
        }

        for (name, secs) in [
            ("Handshake timeout", self.relay.handshake_timeout_secs),
            ("Socket timeout", self.relay.socket_timeout_secs),
            ("Request timeout", self.relay.request_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                anyhow::bail!("{} must be between 1 and {} seconds", name, MAX_TIMEOUT_SECS);
            }
        }

        if self.credentials.private_key.is_empty() || self.credentials.public_key.is_empty() {
            anyhow::bail!(
                "Server key pair missing: set [credentials] or TETHER_PRIVATE_KEY / TETHER_PUBLIC_KEY"
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Server key pair
    ///
    /// # Errors
    ///
    /// Returns an error if either key is missing.
    pub fn key_set(&self) -> anyhow::Result<KeySet> {
        Ok(KeySet::new(
            self.credentials.private_key.clone(),
            self.credentials.public_key.clone(),
        )?)
    }

    /// Watchdog configuration for the connector
    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            handshake_timeout: Duration::from_secs(self.relay.handshake_timeout_secs),
            socket_timeout: Duration::from_secs(self.relay.socket_timeout_secs),
        }
    }

    /// Relay backend endpoints
    #[must_use]
    pub fn endpoints(&self) -> HandshakeEndpoints {
        HandshakeEndpoints {
            login_url: self.relay.login_url.clone(),
            logout_url: self.relay.logout_url.clone(),
            request_timeout: Duration::from_secs(self.relay.request_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_keys() -> Config {
        let mut config = Config::default();
        config.override_credentials(Some("priv".to_string()), Some("pub".to_string()));
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.relay.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.relay.handshake_timeout_secs, 35);
        assert_eq!(config.relay.socket_timeout_secs, 35);
        assert_eq!(config.logging.level, "info");
        assert!(config.credentials.private_key.is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config = with_keys();
        assert!(config.validate().is_ok());

        config.relay.login_url = "ftp://backend".to_string();
        assert!(config.validate().is_err());

        config.relay.login_url = DEFAULT_LOGIN_URL.to_string();
        config.relay.socket_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.relay.socket_timeout_secs = 35;
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_override_credentials_keeps_unset_key() {
        let mut config = with_keys();
        config.override_credentials(None, Some("other".to_string()));
        assert_eq!(config.credentials.private_key, "priv");
        assert_eq!(config.credentials.public_key, "other");
    }

    #[test]
    fn test_toml_serialization() {
        let config = with_keys();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.relay.logout_url, deserialized.relay.logout_url);
        assert_eq!(deserialized.credentials.public_key, "pub");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [relay]
            socket_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.relay.socket_timeout_secs, 10);
        assert_eq!(config.relay.handshake_timeout_secs, 35);
        assert_eq!(config.connector_config().socket_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        with_keys().save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.credentials.private_key, "priv");
        assert!(loaded.key_set().is_ok());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", with_keys());
        assert!(!rendered.contains("\"priv\""));
        assert!(rendered.contains("<redacted>"));
    }
}
