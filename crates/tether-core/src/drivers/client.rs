//! Client session lifecycle driver

use super::MessageDriver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tether_transport::EventSocket;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Relay asks the host to confirm a client's session token; answered on the
/// same event name
pub const ACKNOWLEDGE_CLIENT: &str = "acknowledgeClient";

/// Relay reports that a client closed its session
pub const CLIENT_DISCONNECTED: &str = "client-disconnected";

/// Host-side view of client sessions
pub trait ClientSessions: Send + Sync {
    /// Validate a session token presented by a client. Returns whether the
    /// client is accepted.
    fn authenticate(&self, client: Uuid, token: &str) -> bool;

    /// The client's session on the relay ended
    fn client_disconnected(&self, client: Uuid);
}

/// [`ClientSessions`] for hosts that do not track sessions: every token is
/// rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmanagedSessions;

impl ClientSessions for UnmanagedSessions {
    fn authenticate(&self, client: Uuid, _token: &str) -> bool {
        debug!(%client, "No session store, rejecting client");
        false
    }

    fn client_disconnected(&self, _client: Uuid) {}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeClientPayload {
    client_uuid: Uuid,
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeClientReply {
    client_uuid: Uuid,
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientDisconnectedPayload {
    client_uuid: Uuid,
}

/// Handles client identity and session lifecycle events
pub struct ClientDriver {
    sessions: Arc<dyn ClientSessions>,
}

impl ClientDriver {
    /// Create a driver delegating to `sessions`
    #[must_use]
    pub fn new(sessions: Arc<dyn ClientSessions>) -> Self {
        Self { sessions }
    }
}

impl MessageDriver for ClientDriver {
    fn name(&self) -> &'static str {
        "client"
    }

    fn boot(&self, socket: &Arc<dyn EventSocket>) {
        let sessions = Arc::clone(&self.sessions);
        let weak: Weak<dyn EventSocket> = Arc::downgrade(socket);
        socket.on(
            ACKNOWLEDGE_CLIENT,
            Arc::new(move |payload: &Value| {
                let Some(request) = parse::<AcknowledgeClientPayload>(ACKNOWLEDGE_CLIENT, payload)
                else {
                    return;
                };

                let success = sessions.authenticate(request.client_uuid, &request.token);
                info!(client = %request.client_uuid, success, "Client acknowledgement");

                let reply = AcknowledgeClientReply {
                    client_uuid: request.client_uuid,
                    success,
                };
                let Some(socket) = weak.upgrade() else {
                    return;
                };
                match serde_json::to_value(&reply) {
                    Ok(value) => {
                        if let Err(e) = socket.emit(ACKNOWLEDGE_CLIENT, value) {
                            warn!(client = %reply.client_uuid, "Acknowledgement not sent: {}", e);
                        }
                    }
                    Err(e) => warn!("Acknowledgement not encoded: {}", e),
                }
            }),
        );

        let sessions = Arc::clone(&self.sessions);
        socket.on(
            CLIENT_DISCONNECTED,
            Arc::new(move |payload: &Value| {
                if let Some(event) = parse::<ClientDisconnectedPayload>(CLIENT_DISCONNECTED, payload)
                {
                    info!(client = %event.client_uuid, "Client left the relay");
                    sessions.client_disconnected(event.client_uuid);
                }
            }),
        );
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, payload: &Value) -> Option<T> {
    match serde_json::from_value(payload.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(event, "Malformed payload: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tether_transport::{ConnectBehavior, MemorySocket};

    #[derive(Default)]
    struct RecordingSessions {
        gone: Mutex<Vec<Uuid>>,
    }

    impl ClientSessions for RecordingSessions {
        fn authenticate(&self, _client: Uuid, token: &str) -> bool {
            token == "valid"
        }

        fn client_disconnected(&self, client: Uuid) {
            self.gone.lock().unwrap().push(client);
        }
    }

    fn booted() -> (Arc<MemorySocket>, Arc<RecordingSessions>) {
        let memory = Arc::new(MemorySocket::new(
            "ws://relay".to_string(),
            ConnectBehavior::Accept,
        ));
        let socket: Arc<dyn EventSocket> = memory.clone();
        let sessions = Arc::new(RecordingSessions::default());
        ClientDriver::new(sessions.clone()).boot(&socket);
        socket.connect();
        (memory, sessions)
    }

    #[test]
    fn test_acknowledge_client_replies() {
        let (socket, _) = booted();
        let client = Uuid::new_v4();

        assert!(socket.inject(
            ACKNOWLEDGE_CLIENT,
            json!({"clientUuid": client, "token": "valid"})
        ));
        assert!(socket.inject(
            ACKNOWLEDGE_CLIENT,
            json!({"clientUuid": client, "token": "forged"})
        ));

        let replies = socket.emitted_on(ACKNOWLEDGE_CLIENT);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["success"], true);
        assert_eq!(replies[1]["success"], false);
        assert_eq!(replies[0]["clientUuid"], client.to_string());
    }

    #[test]
    fn test_client_disconnected_reaches_sessions() {
        let (socket, sessions) = booted();
        let client = Uuid::new_v4();

        socket.inject(CLIENT_DISCONNECTED, json!({"clientUuid": client}));
        assert_eq!(*sessions.gone.lock().unwrap(), vec![client]);
    }

    #[test]
    fn test_malformed_payload_is_ignored() {
        let (socket, sessions) = booted();
        socket.inject(CLIENT_DISCONNECTED, json!({"clientUuid": "not-a-uuid"}));
        socket.inject(ACKNOWLEDGE_CLIENT, json!(42));

        assert!(sessions.gone.lock().unwrap().is_empty());
        assert!(socket.emitted_on(ACKNOWLEDGE_CLIENT).is_empty());
    }

    #[test]
    fn test_unmanaged_sessions_reject() {
        assert!(!UnmanagedSessions.authenticate(Uuid::new_v4(), "anything"));
    }
}
