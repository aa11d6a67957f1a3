//! Connector fixture over a scripted handshake and in-memory sockets
//!
//! # Example
//!
//! ```no_run
//! use tether_integration_tests::fixtures::{Login, RelayFixture, assignment};
//! use tether_transport::ConnectBehavior;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_connects() {
//!     let fixture = RelayFixture::new(
//!         ConnectBehavior::Accept,
//!         vec![Login::Assign(assignment("wss://relay.example/ep"))],
//!     );
//!     fixture.connector.setup_connection().await;
//!     assert!(fixture.connector.is_connected());
//! }
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::{
    ApiResponse, Authenticatable, ConnectionState, HandshakeClient, HandshakeError, KeySet,
    RelayAssignment, SocketConnector, StateService,
};
use tether_transport::{ConnectBehavior, MemorySocket, MemorySocketFactory};
use tokio::sync::Notify;
use uuid::Uuid;

/// Private key used by every fixture
pub const PRIVATE_KEY: &str = "fixture-private";

/// Public key used by every fixture
pub const PUBLIC_KEY: &str = "fixture-public";

/// Scripted outcome of one login call
pub enum Login {
    /// Return the assignment
    Assign(RelayAssignment),
    /// Return the backend error list
    Reject(Vec<tether_core::ApiError>),
    /// Fail before reaching the backend
    Fail(HandshakeError),
    /// Never answer
    Hang,
    /// Wait for the notify, then return the assignment
    Gated(Arc<Notify>, RelayAssignment),
}

/// Relay assignment pointing its socket at `insecure_endpoint`
#[must_use]
pub fn assignment(insecure_endpoint: &str) -> RelayAssignment {
    RelayAssignment {
        secure_endpoint: "https://relay.example".to_string(),
        insecure_endpoint: insecure_endpoint.to_string(),
        relay_id: Some("fixture-relay".to_string()),
        name: None,
    }
}

/// [`HandshakeClient`] answering logins from a script. Logins past the end
/// of the script hang.
#[derive(Default)]
pub struct ScriptedHandshake {
    script: Mutex<VecDeque<Login>>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

impl ScriptedHandshake {
    /// Create a handshake answering with `script`, in order
    #[must_use]
    pub fn new(script: Vec<Login>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    /// Queue another login outcome
    pub fn push(&self, login: Login) {
        self.script.lock().unwrap().push_back(login);
    }

    /// Number of login calls so far
    #[must_use]
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Number of logout calls so far
    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandshakeClient for ScriptedHandshake {
    async fn login(&self, keys: &KeySet) -> Result<ApiResponse<RelayAssignment>, HandshakeError> {
        assert_eq!(keys.private_key(), PRIVATE_KEY);
        self.logins.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next.unwrap_or(Login::Hang) {
            Login::Assign(assignment) => Ok(ApiResponse::Success(assignment)),
            Login::Reject(errors) => Ok(ApiResponse::Errors(errors)),
            Login::Fail(error) => Err(error),
            Login::Hang => std::future::pending().await,
            Login::Gated(gate, assignment) => {
                gate.notified().await;
                Ok(ApiResponse::Success(assignment))
            }
        }
    }

    async fn logout(&self, _keys: &KeySet) -> Result<(), HandshakeError> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Host-side client with a fixed session status
#[derive(Debug, Clone)]
pub struct TestClient {
    /// Whether the client's session is live
    pub connected: bool,
    /// Client identity
    pub uuid: Uuid,
}

impl TestClient {
    /// Client with a live session
    #[must_use]
    pub fn online() -> Self {
        Self {
            connected: true,
            uuid: Uuid::new_v4(),
        }
    }

    /// Client whose session ended
    #[must_use]
    pub fn offline() -> Self {
        Self {
            connected: false,
            uuid: Uuid::new_v4(),
        }
    }
}

impl Authenticatable for TestClient {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn owner_uuid(&self) -> Uuid {
        self.uuid
    }
}

type Transitions = Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>>;

/// Connector over a [`ScriptedHandshake`] and a [`MemorySocketFactory`]
pub struct RelayFixture {
    /// The connector under test
    pub connector: Arc<SocketConnector>,
    /// Its handshake client
    pub handshake: Arc<ScriptedHandshake>,
    /// Its socket factory
    pub sockets: Arc<MemorySocketFactory>,
    transitions: Transitions,
}

impl RelayFixture {
    /// Create a fixture whose sockets connect according to `behavior`
    #[must_use]
    pub fn new(behavior: ConnectBehavior, script: Vec<Login>) -> Self {
        let handshake = ScriptedHandshake::new(script);
        let sockets = Arc::new(MemorySocketFactory::new(behavior));
        let state = Arc::new(StateService::new());

        let transitions: Transitions = Arc::default();
        let sink = Arc::clone(&transitions);
        state.add_listener(move |old, new| {
            sink.lock().unwrap().push((old.clone(), new.clone()));
        });

        let connector = SocketConnector::builder()
            .keys(KeySet::new(PRIVATE_KEY, PUBLIC_KEY).unwrap())
            .handshake(handshake.clone())
            .sockets(sockets.clone())
            .state(state)
            .build()
            .unwrap();

        Self {
            connector: Arc::new(connector),
            handshake,
            sockets,
            transitions,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connector.state_service().current_state()
    }

    /// Every `(old, new)` pair observed so far
    #[must_use]
    pub fn transitions(&self) -> Vec<(ConnectionState, ConnectionState)> {
        self.transitions.lock().unwrap().clone()
    }

    /// Every state entered so far, starting with the initial one
    #[must_use]
    pub fn history(&self) -> Vec<ConnectionState> {
        let transitions = self.transitions();
        let first = transitions
            .first()
            .map_or_else(|| self.state(), |(old, _)| old.clone());
        let mut history = vec![first];
        history.extend(transitions.into_iter().map(|(_, new)| new));
        history
    }

    /// Most recently opened socket
    #[must_use]
    pub fn socket(&self) -> Option<Arc<MemorySocket>> {
        self.sockets.last()
    }
}

/// Poll `service` until `predicate` holds or `within` elapses
pub async fn wait_for_state<F>(service: &StateService, predicate: F, within: Duration) -> bool
where
    F: Fn(&ConnectionState) -> bool,
{
    tokio::time::timeout(within, async {
        while !predicate(&service.current_state()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
