//! # WebSocket Event Socket
//!
//! [`WsSocket`] carries named events over a single WebSocket connection
//! opened with `tokio-tungstenite`.
//!
//! ## Data Flow
//!
//! ```text
//! emit() ──mpsc──→ [I/O task] ──WS text frame──→ Relay
//! handlers ←──dispatch── [I/O task] ←──WS text frame── Relay
//! ```
//!
//! The I/O task owns both halves of the stream. Outbound frames are queued on
//! an unbounded channel so `emit` never blocks and can be called from any
//! thread. The socket never reconnects: once the stream ends, a `disconnect`
//! event is dispatched and the socket stays closed.

use crate::registry::{EventHandler, EventRegistry};
use crate::transport::{EventSocket, SocketFactory, TransportError, TransportResult};
use crate::{TransportOptions, events};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// `disconnect` reason when this side closed the socket
const CLIENT_DISCONNECT: &str = "io client disconnect";

/// A single named-event frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireFrame {
    /// Event name
    pub event: String,
    /// Event payload
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    /// Encode as a WebSocket text message
    ///
    /// # Errors
    /// Returns [`TransportError::Encoding`] if serialization fails.
    pub fn to_message(&self) -> TransportResult<Message> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Factory producing [`WsSocket`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct WsSocketFactory;

impl WsSocketFactory {
    /// Create a new factory
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SocketFactory for WsSocketFactory {
    fn open(
        &self,
        endpoint: &str,
        options: &TransportOptions,
    ) -> TransportResult<Arc<dyn EventSocket>> {
        let url = options.endpoint_url(endpoint)?;
        Ok(Arc::new(WsSocket::new(url.to_string())))
    }
}

/// WebSocket-backed [`EventSocket`]
pub struct WsSocket {
    url: String,
    events: Arc<EventRegistry>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    shutdown: Arc<Notify>,
    open: Arc<AtomicBool>,
    started: AtomicBool,
}

impl WsSocket {
    /// Create an unconnected socket for a fully resolved URL
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            events: Arc::new(EventRegistry::new()),
            outbound: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            open: Arc::new(AtomicBool::new(false)),
            started: AtomicBool::new(false),
        }
    }
}

impl EventSocket for WsSocket {
    fn on(&self, event: &str, handler: EventHandler) {
        self.events.on(event, handler);
    }

    fn emit(&self, event: &str, payload: Value) -> TransportResult<()> {
        let message = WireFrame {
            event: event.to_string(),
            data: payload,
        }
        .to_message()?;

        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        match outbound.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn connect(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!(url = %redact_query(&self.url), "Socket already started");
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot connect socket outside a tokio runtime: {}", e);
                self.events
                    .dispatch(events::CONNECT_ERROR, &json!({ "message": e.to_string() }));
                return;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        handle.spawn(run_socket(
            self.url.clone(),
            Arc::clone(&self.events),
            rx,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.open),
        ));
    }

    fn disconnect(&self) {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shutdown.notify_one();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Drive one WebSocket connection until either side closes it
async fn run_socket(
    url: String,
    events: Arc<EventRegistry>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    shutdown: Arc<Notify>,
    open: Arc<AtomicBool>,
) {
    let target = redact_query(&url);
    let connecting = tokio::select! {
        biased;
        _ = shutdown.notified() => None,
        result = connect_async(url.as_str()) => Some(result),
    };
    let stream = match connecting {
        Some(Ok((stream, _response))) => stream,
        Some(Err(e)) => {
            warn!(url = %target, "Socket connect failed: {}", e);
            events.dispatch(events::CONNECT_ERROR, &json!({ "message": e.to_string() }));
            return;
        }
        None => {
            info!(url = %target, "Socket closed before the relay accepted it");
            events.dispatch(events::DISCONNECT, &json!({ "reason": CLIENT_DISCONNECT }));
            return;
        }
    };

    open.store(true, Ordering::SeqCst);
    info!(url = %target, "Socket connected");
    events.dispatch(events::CONNECT, &Value::Null);

    let (mut sink, mut stream) = stream.split();
    let reason = loop {
        tokio::select! {
            _ = shutdown.notified() => {
                let _ = sink.send(Message::Close(None)).await;
                break CLIENT_DISCONNECT;
            }
            Some(message) = rx.recv() => {
                if let Err(e) = sink.send(message).await {
                    warn!("Socket write failed: {}", e);
                    break "transport error";
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch_frame(&events, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break "io server disconnect",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Socket read failed: {}", e);
                    break "transport error";
                }
            }
        }
    };

    open.store(false, Ordering::SeqCst);
    info!(url = %target, reason, "Socket closed");
    events.dispatch(events::DISCONNECT, &json!({ "reason": reason }));
}

fn dispatch_frame(events: &EventRegistry, text: &str) {
    match serde_json::from_str::<WireFrame>(text) {
        Ok(frame) => {
            if !events.dispatch(&frame.event, &frame.data) {
                debug!(event = %frame.event, "Unclaimed inbound event");
            }
        }
        Err(e) => warn!("Dropping malformed frame: {}", e),
    }
}

/// Strip the query string so credentials never reach the logs
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
