//! Connection lifecycle state machine
//!
//! [`StateService`] is the single source of truth for whether the process
//! may start a relay connection and whether it currently has one. Every
//! transition is serialized and fanned out to listeners in registration order.
//!
//! ```text
//!            setup_connection()          login ok            socket connect
//!   Idle ─────────────────────→ AssigningRelay ───────→ Connecting ──────────→ Connected
//!    ↑                                │                      │                     │
//!    └──── login error / timeout ─────┴──── connect error / timeout / disconnect ──┘
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::{error, info};

/// Reason carried by the state a fresh [`StateService`] starts in
pub const INITIAL_REASON: &str = "Waiting for a connection attempt";

/// Relay connection lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No active session; the reason explains why
    Idle(String),

    /// REST handshake in flight
    AssigningRelay,

    /// Socket opened, awaiting the connect acknowledgment
    Connecting,

    /// Live bidirectional session
    Connected,
}

impl ConnectionState {
    /// Idle state with a reason
    #[must_use]
    pub fn idle(reason: impl Into<String>) -> Self {
        ConnectionState::Idle(reason.into())
    }

    /// Whether a new connection attempt may start from this state
    #[must_use]
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Idle(_))
    }

    /// Whether packets may be sent in this state
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether the REST handshake is in flight
    #[must_use]
    pub fn is_assigning_relay(&self) -> bool {
        matches!(self, ConnectionState::AssigningRelay)
    }

    /// Whether the socket is open but not yet acknowledged
    #[must_use]
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Idle reason, if idle
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            ConnectionState::Idle(reason) => Some(reason),
            _ => None,
        }
    }

    /// Stable short label, suitable for metrics and log fields
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle(_) => "idle",
            ConnectionState::AssigningRelay => "assigning_relay",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// Human-readable description; idle states report their reason
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            ConnectionState::Idle(reason) => reason,
            ConnectionState::AssigningRelay => "Requesting a relay assignment",
            ConnectionState::Connecting => "Connecting to the relay",
            ConnectionState::Connected => "Connected to the relay",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::idle(INITIAL_REASON)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle(reason) => write!(f, "idle ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Transition listener, called with `(old, new)`
pub type StateListener = Box<dyn Fn(&ConnectionState, &ConnectionState) + Send + Sync>;

/// Process-wide holder of the current [`ConnectionState`].
///
/// Transitions are serialized by a transition lock held across the swap and
/// the listener fan-out, so every listener observes transitions in order.
/// The current value lives behind its own lock, which lets listeners read
/// [`StateService::current_state`]. Listeners must not call `set_state`,
/// `transition_if` or `add_listener` themselves; they spawn work instead.
///
/// The service also numbers connection attempts. Work belonging to an
/// attempt (watchdogs, socket events) only transitions while that attempt is
/// still the latest one, so a stale timer or socket cannot disturb a newer attempt.
pub struct StateService {
    current: RwLock<ConnectionState>,
    listeners: RwLock<Vec<StateListener>>,
    transition: Mutex<()>,
    attempt: AtomicU64,
}

impl Default for StateService {
    fn default() -> Self {
        Self::new()
    }
}

impl StateService {
    /// Create a service in the initial idle state
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(ConnectionState::default())
    }

    /// Create a service in a specific state
    #[must_use]
    pub fn with_state(state: ConnectionState) -> Self {
        Self {
            current: RwLock::new(state),
            listeners: RwLock::new(Vec::new()),
            transition: Mutex::new(()),
            attempt: AtomicU64::new(0),
        }
    }

    /// Current state; no side effects
    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shortcut for `current_state().is_connected()`
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_connected()
    }

    /// Append a transition listener. No deduplication.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&ConnectionState, &ConnectionState) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Replace the current state and notify every listener with `(old, new)`.
    pub fn set_state(&self, new: ConnectionState) {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        self.apply(new);
    }

    /// Transition only if the current state satisfies `predicate`.
    ///
    /// The check and the transition happen under the transition lock, so no
    /// other writer can slip in between. Returns whether the transition happened.
    pub fn transition_if<P>(&self, predicate: P, new: ConnectionState) -> bool
    where
        P: FnOnce(&ConnectionState) -> bool,
    {
        let _guard = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if !predicate(&self.current_state()) {
            return false;
        }
        self.apply(new);
        true
    }

    /// Like [`transition_if`](Self::transition_if), but only while `attempt`
    /// is still the latest connection attempt.
    pub fn transition_for<P>(&self, attempt: u64, predicate: P, new: ConnectionState) -> bool
    where
        P: FnOnce(&ConnectionState) -> bool,
    {
        self.transition_if(
            |current| self.attempt.load(Ordering::SeqCst) == attempt && predicate(current),
            new,
        )
    }

    /// Start a new connection attempt if the current state allows it.
    ///
    /// On success the state is [`ConnectionState::AssigningRelay`] and the new
    /// attempt number is returned. Returns `None` while an attempt is in
    /// flight or a session is live.
    pub fn begin_attempt(&self) -> Option<u64> {
        let mut attempt = None;
        self.transition_if(
            |current| {
                if current.can_connect() {
                    attempt = Some(self.attempt.fetch_add(1, Ordering::SeqCst) + 1);
                    true
                } else {
                    false
                }
            },
            ConnectionState::AssigningRelay,
        );
        attempt
    }

    /// Number of the latest connection attempt (0 before the first)
    #[must_use]
    pub fn current_attempt(&self) -> u64 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Swap the state and fan out. Caller holds the transition lock.
    fn apply(&self, new: ConnectionState) {
        let old = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, new.clone())
        };

        info!(from = old.label(), to = new.label(), "{}", new.description());

        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for (index, listener) in listeners.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| listener(&old, &new))).is_err() {
                error!(listener = index, "State listener panicked");
            }
        }
    }
}

impl fmt::Debug for StateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateService")
            .field("current", &self.current_state())
            .field("listeners", &self.listener_count())
            .field("attempt", &self.current_attempt())
            .finish()
    }
}
