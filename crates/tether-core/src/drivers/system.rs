//! Socket lifecycle and relay control driver

use super::MessageDriver;
use crate::state::{ConnectionState, StateService};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tether_transport::{EventSocket, events};
use tracing::{info, warn};

/// Relay-wide announcement
pub const NOTIFICATION: &str = "notification";

/// Relay asks the host to reload
pub const SYSTEM_RELOAD: &str = "system-reload";

/// Idle reason after the socket closes
pub const DISCONNECTED_REASON: &str = "Disconnected from the relay";

/// Idle reason after the socket fails to open
pub const CONNECT_ERROR_REASON: &str = "Could not connect to the relay";

/// Host hooks for relay control events
pub trait SystemControl: Send + Sync {
    /// The relay requested a forced reload
    fn reload(&self);
}

/// [`SystemControl`] that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopControl;

impl SystemControl for NoopControl {
    fn reload(&self) {
        info!("Relay requested a reload; no reload hook installed");
    }
}

/// Drives the connection state from socket lifecycle events.
///
/// ```text
///   Connecting ──connect──────────▶ Connected
///   Connecting ──connect_error────▶ Idle("Could not connect to the relay")
///   Connecting ┐
///   Connected  ┴─disconnect───────▶ Idle("Disconnected from the relay")
/// ```
///
/// Every transition is bound to the attempt that was current when the driver
/// booted, so events from a superseded socket are ignored.
pub struct SystemDriver {
    state: Arc<StateService>,
    control: Arc<dyn SystemControl>,
}

impl SystemDriver {
    /// Create a driver updating `state`
    #[must_use]
    pub fn new(state: Arc<StateService>, control: Arc<dyn SystemControl>) -> Self {
        Self { state, control }
    }
}

impl MessageDriver for SystemDriver {
    fn name(&self) -> &'static str {
        "system"
    }

    fn boot(&self, socket: &Arc<dyn EventSocket>) {
        let attempt = self.state.current_attempt();

        let state = Arc::clone(&self.state);
        let weak: Weak<dyn EventSocket> = Arc::downgrade(socket);
        socket.on(
            events::CONNECT,
            Arc::new(move |_: &Value| {
                if state.transition_for(
                    attempt,
                    ConnectionState::is_connecting,
                    ConnectionState::Connected,
                ) {
                    return;
                }
                warn!(attempt, "Socket opened for an abandoned attempt, closing it");
                if let Some(socket) = weak.upgrade() {
                    socket.disconnect();
                }
            }),
        );

        let state = Arc::clone(&self.state);
        socket.on(
            events::DISCONNECT,
            Arc::new(move |payload: &Value| {
                let moved = state.transition_for(
                    attempt,
                    |current| current.is_connecting() || current.is_connected(),
                    ConnectionState::idle(DISCONNECTED_REASON),
                );
                if moved {
                    info!(reason = %reason_of(payload), "Relay socket closed");
                }
            }),
        );

        let state = Arc::clone(&self.state);
        socket.on(
            events::CONNECT_ERROR,
            Arc::new(move |payload: &Value| {
                warn!(error = %reason_of(payload), "Relay socket failed to open");
                state.transition_for(
                    attempt,
                    ConnectionState::is_connecting,
                    ConnectionState::idle(CONNECT_ERROR_REASON),
                );
            }),
        );

        socket.on(
            NOTIFICATION,
            Arc::new(|payload: &Value| {
                info!(notification = %payload, "Relay notification");
            }),
        );

        let control = Arc::clone(&self.control);
        socket.on(
            SYSTEM_RELOAD,
            Arc::new(move |_: &Value| {
                info!("Relay requested a reload");
                control.reload();
            }),
        );
    }
}

fn reason_of(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .get("reason")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        _ => "unknown".to_string(),
    }
}
