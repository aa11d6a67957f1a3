//! # Relay Connector
//!
//! [`SocketConnector`] drives one server's connection to the relay network:
//!
//! ```text
//!  Idle ──setup_connection──▶ AssigningRelay ──login ok──▶ Connecting ──connect──▶ Connected
//!   ▲                               │                          │                      │
//!   │    error list / 35 s watchdog │     35 s socket watchdog │ connect_error        │ disconnect
//!   └───────────────────────────────┴──────────────────────────┴──────────────────────┘
//! ```
//!
//! Phase one is a REST login through the [`HandshakeClient`] that returns a
//! relay assignment; phase two opens an [`EventSocket`] to the assigned
//! endpoint and boots every [`MessageDriver`] against it. From then on the
//! socket's own lifecycle events drive the state.
//!
//! Each phase is guarded by a watchdog that forces the connector back to
//! idle if the phase is still in progress when it fires. Watchdogs and
//! socket events are bound to their attempt number, so a stale timer or a
//! superseded socket never touches a newer attempt.
//!
//! There is no retry and no backoff: every failure ends in
//! [`ConnectionState::Idle`] with a reason, and the host decides whether to
//! call [`SocketConnector::setup_connection`] again.

use crate::config::ConnectorConfig;
use crate::drivers::{
    ClientDriver, ClientSessions, MessageDriver, NoopControl, SystemControl, SystemDriver,
    UnmanagedSessions,
};
use crate::error::{HandshakeError, Result, TetherError};
use crate::handshake::{ApiResponse, HandshakeClient, RelayAssignment};
use crate::keys::KeySet;
use crate::packet::{Authenticatable, Packet};
use crate::state::{ConnectionState, StateService};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tether_transport::{EventSocket, SocketFactory, events};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Idle reason when the relay login outlives its watchdog
pub const HANDSHAKE_TIMEOUT_REASON: &str = "Connecting to the relay timed out";

/// Idle reason when the socket outlives its watchdog
pub const SOCKET_TIMEOUT_REASON: &str = "Connecting to the relay timed out (socket)";

/// Idle reason when the assigned endpoint cannot be opened
pub const INVALID_ENDPOINT_REASON: &str = "Relay assigned an invalid endpoint";

/// Idle reason for a failed relay login carrying `code`
#[must_use]
pub fn handshake_failure_reason(code: &str) -> String {
    format!("Failed to do the initial handshake. Error: {code}")
}

/// Idle reason for a failed attempt, or `None` when the phase watchdog
/// decides instead
fn idle_reason(err: &TetherError) -> Option<String> {
    match err {
        TetherError::Handshake(e) => Some(handshake_failure_reason(e.code())),
        TetherError::Transport(_) => Some(INVALID_ENDPOINT_REASON.to_string()),
        _ => None,
    }
}

/// Connects a server to its assigned relay and gates outbound packets on the
/// connection state.
pub struct SocketConnector {
    config: ConnectorConfig,
    keys: Arc<KeySet>,
    state: Arc<StateService>,
    handshake: Arc<dyn HandshakeClient>,
    sockets: Arc<dyn SocketFactory>,
    drivers: Vec<Arc<dyn MessageDriver>>,
    socket: Mutex<Option<Arc<dyn EventSocket>>>,
    logout_registered: AtomicBool,
}

impl SocketConnector {
    /// Start building a connector
    #[must_use]
    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::new()
    }

    /// Run one connection attempt.
    ///
    /// Returns once the socket-level connect has been initiated or the
    /// attempt has ended in idle. A call while an attempt is in flight or a
    /// session is live does nothing. Failures never surface as errors; they
    /// are logged and reflected in the state.
    pub async fn setup_connection(&self) {
        let Some(attempt) = self.state.begin_attempt() else {
            debug!(
                state = self.state.current_state().label(),
                "Connection attempt ignored"
            );
            return;
        };

        self.register_logout_listener();
        let options = self.keys.transport_options();

        self.arm_watchdog(
            attempt,
            self.config.handshake_timeout,
            ConnectionState::is_assigning_relay,
            HANDSHAKE_TIMEOUT_REASON,
        );

        let assignment = match self.request_assignment().await {
            Ok(assignment) => assignment,
            Err(e) => return self.abandon(attempt, &e),
        };

        let socket = match self.sockets.open(&assignment.insecure_endpoint, &options) {
            Ok(socket) => socket,
            Err(e) => {
                debug!(endpoint = %assignment.insecure_endpoint, "Relay endpoint rejected");
                return self.abandon(attempt, &TetherError::from(e));
            }
        };

        if !self.state.transition_for(
            attempt,
            ConnectionState::is_assigning_relay,
            ConnectionState::Connecting,
        ) {
            info!(attempt, "Connection attempt abandoned before the socket opened");
            return;
        }

        self.arm_watchdog(
            attempt,
            self.config.socket_timeout,
            ConnectionState::is_connecting,
            SOCKET_TIMEOUT_REASON,
        );

        for driver in &self.drivers {
            debug!(driver = driver.name(), "Booting driver");
            driver.boot(&socket);
        }

        let previous = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Arc::clone(&socket));
        if let Some(previous) = previous {
            previous.disconnect();
        }

        socket.connect();
    }

    /// Run [`setup_connection`](Self::setup_connection) on a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_setup(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.setup_connection().await })
    }

    /// Close the active socket, if any.
    ///
    /// The state is not changed here; the socket's `disconnect` event moves
    /// it to idle.
    pub fn disconnect(&self) {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match socket {
            Some(socket) => socket.disconnect(),
            None => debug!("No relay socket to close"),
        }
    }

    /// Send `packet` to `client` through the relay.
    ///
    /// Only emits when both the client's session and the relay connection
    /// are live; otherwise the packet is dropped silently. The packet is
    /// stamped with the client's identity and sent as JSON text under the
    /// `data` event.
    pub fn send(&self, client: &dyn Authenticatable, mut packet: Packet) {
        if !client.is_connected() || !self.state.is_connected() {
            return;
        }

        let owner = client.owner_uuid();
        packet.stamp(owner);
        let json = match packet.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(client = %owner, "Packet dropped: {}", e);
                return;
            }
        };

        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(socket) = socket else {
            warn!(client = %owner, "Packet dropped: no relay socket");
            return;
        };
        if let Err(e) = socket.emit(events::DATA, Value::String(json)) {
            warn!(client = %owner, channel = %packet.channel, "Packet dropped: {}", e);
        }
    }

    /// Shared state service
    #[must_use]
    pub fn state_service(&self) -> &Arc<StateService> {
        &self.state
    }

    /// Whether a relay session is live
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Connector configuration
    #[must_use]
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Names of the booted drivers, in boot order
    #[must_use]
    pub fn driver_names(&self) -> Vec<&'static str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    async fn request_assignment(&self) -> Result<RelayAssignment> {
        let started = Instant::now();
        let response = tokio::time::timeout(
            self.config.handshake_timeout,
            self.handshake.login(&self.keys),
        )
        .await
        .map_err(|_| TetherError::timeout("relay login"))??;

        match response {
            ApiResponse::Success(assignment) => {
                info!(
                    endpoint = %assignment.secure_endpoint,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Relay assigned"
                );
                Ok(assignment)
            }
            ApiResponse::Errors(errors) => {
                let (code, message) = errors.into_iter().next().map_or_else(
                    || ("UNKNOWN".to_string(), String::new()),
                    |e| (e.code, e.message),
                );
                Err(HandshakeError::Rejected { code, message }.into())
            }
        }
    }

    /// Log a failed attempt and move it to idle, unless a watchdog owns
    /// the transition
    fn abandon(&self, attempt: u64, err: &TetherError) {
        let Some(reason) = idle_reason(err) else {
            warn!(attempt, transient = err.is_transient(), "Connection attempt stalled: {}", err);
            return;
        };
        error!(
            attempt,
            transient = err.is_transient(),
            permanent = err.is_permanent(),
            "Connection attempt failed: {}", err
        );
        self.fail(attempt, ConnectionState::is_assigning_relay, reason);
    }

    fn fail(
        &self,
        attempt: u64,
        phase: fn(&ConnectionState) -> bool,
        reason: impl Into<String>,
    ) {
        self.state
            .transition_for(attempt, phase, ConnectionState::idle(reason));
    }

    fn arm_watchdog(
        &self,
        attempt: u64,
        after: Duration,
        phase: fn(&ConnectionState) -> bool,
        reason: &'static str,
    ) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if state.transition_for(attempt, phase, ConnectionState::idle(reason)) {
                warn!(attempt, after_secs = after.as_secs(), "{}", reason);
            }
        });
    }

    /// Fire a logout whenever a live session ends. Registered once, on the
    /// first connection attempt.
    fn register_logout_listener(&self) {
        if self.logout_registered.swap(true, Ordering::SeqCst) {
            return;
        }

        let runtime = tokio::runtime::Handle::current();
        let handshake = Arc::clone(&self.handshake);
        let keys = Arc::clone(&self.keys);
        self.state.add_listener(move |old, _new| {
            if !old.is_connected() {
                return;
            }
            let handshake = Arc::clone(&handshake);
            let keys = Arc::clone(&keys);
            runtime.spawn(async move {
                match handshake.logout(&keys).await {
                    Ok(()) => info!("Logged out of the relay"),
                    Err(e) => warn!(code = e.code(), "Relay logout failed: {}", e),
                }
            });
        });
    }
}

impl fmt::Debug for SocketConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnector")
            .field("config", &self.config)
            .field("keys", &self.keys)
            .field("state", &self.state)
            .field("drivers", &self.driver_names())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SocketConnector`].
///
/// The key pair, handshake client and socket factory are required. The
/// client and system drivers are always installed first; extra drivers boot
/// after them in the order they were added.
pub struct ConnectorBuilder {
    config: ConnectorConfig,
    keys: Option<KeySet>,
    handshake: Option<Arc<dyn HandshakeClient>>,
    sockets: Option<Arc<dyn SocketFactory>>,
    state: Option<Arc<StateService>>,
    sessions: Arc<dyn ClientSessions>,
    control: Arc<dyn SystemControl>,
    drivers: Vec<Arc<dyn MessageDriver>>,
}

impl Default for ConnectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ConnectorConfig::default(),
            keys: None,
            handshake: None,
            sockets: None,
            state: None,
            sessions: Arc::new(UnmanagedSessions),
            control: Arc::new(NoopControl),
            drivers: Vec::new(),
        }
    }

    /// Set the connector configuration
    #[must_use]
    pub fn config(mut self, config: ConnectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the server key pair
    #[must_use]
    pub fn keys(mut self, keys: KeySet) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Set the relay-assignment backend client
    #[must_use]
    pub fn handshake(mut self, handshake: Arc<dyn HandshakeClient>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    /// Set the socket factory
    #[must_use]
    pub fn sockets(mut self, sockets: Arc<dyn SocketFactory>) -> Self {
        self.sockets = Some(sockets);
        self
    }

    /// Share an existing state service
    #[must_use]
    pub fn state(mut self, state: Arc<StateService>) -> Self {
        self.state = Some(state);
        self
    }

    /// Host session store used by the client driver
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<dyn ClientSessions>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Host hooks used by the system driver
    #[must_use]
    pub fn control(mut self, control: Arc<dyn SystemControl>) -> Self {
        self.control = control;
        self
    }

    /// Add a driver booted after the built-in ones
    #[must_use]
    pub fn driver(mut self, driver: Arc<dyn MessageDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Build the connector
    ///
    /// # Errors
    /// Returns [`TetherError::InvalidConfig`] if a required part is missing
    /// or the configuration is invalid.
    pub fn build(self) -> Result<SocketConnector> {
        self.config.validate()?;
        let keys = self
            .keys
            .ok_or(TetherError::invalid_config("key pair is required"))?;
        let handshake = self
            .handshake
            .ok_or(TetherError::invalid_config("handshake client is required"))?;
        let sockets = self
            .sockets
            .ok_or(TetherError::invalid_config("socket factory is required"))?;
        let state = self.state.unwrap_or_default();

        let mut drivers: Vec<Arc<dyn MessageDriver>> = vec![
            Arc::new(ClientDriver::new(self.sessions)),
            Arc::new(SystemDriver::new(Arc::clone(&state), self.control)),
        ];
        drivers.extend(self.drivers);

        Ok(SocketConnector {
            config: self.config,
            keys: Arc::new(keys),
            state,
            handshake,
            sockets,
            drivers,
            socket: Mutex::new(None),
            logout_registered: AtomicBool::new(false),
        })
    }
}
