//! Connector configuration

use crate::error::{Result, TetherError};
use std::time::Duration;

/// Scheduler ticks per second on the host the timeouts were tuned against
pub const TICKS_PER_SECOND: u64 = 20;

/// Watchdog budget for each connection phase, in host ticks (35 s)
pub const CONNECT_TIMEOUT_TICKS: u64 = 35 * TICKS_PER_SECOND;

/// Watchdog budget for each connection phase as wall-clock time
pub const DEFAULT_CONNECT_TIMEOUT: Duration =
    Duration::from_millis(CONNECT_TIMEOUT_TICKS * 1000 / TICKS_PER_SECOND);

/// Longest accepted watchdog budget
pub const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(600);

/// Connector configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// How long the REST login may stay in flight before the attempt is
    /// abandoned with a timeout reason
    pub handshake_timeout: Duration,

    /// How long the socket may stay in the connecting phase
    pub socket_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_CONNECT_TIMEOUT,
            socket_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectorConfig {
    /// Validate configuration
    ///
    /// # Errors
    /// Returns [`TetherError::InvalidConfig`] if a timeout is zero or longer
    /// than [`MAX_CONNECT_TIMEOUT`].
    pub fn validate(&self) -> Result<()> {
        for (name, timeout) in [
            ("handshake", self.handshake_timeout),
            ("socket", self.socket_timeout),
        ] {
            if timeout.is_zero() || timeout > MAX_CONNECT_TIMEOUT {
                return Err(TetherError::InvalidConfig(
                    format!(
                        "{name} timeout must be between 1ms and {}s",
                        MAX_CONNECT_TIMEOUT.as_secs()
                    )
                    .into(),
                ));
            }
        }
        Ok(())
    }
}
