//! In-memory event sockets.
//!
//! [`MemorySocketFactory`] hands out [`MemorySocket`]s that never touch the
//! network. Inbound traffic is simulated with [`MemorySocket::inject`] and
//! everything emitted is recorded, which makes the relay connector's state
//! machine observable from tests without timing dependencies.

use crate::registry::{EventHandler, EventRegistry};
use crate::transport::{EventSocket, SocketFactory, TransportError, TransportResult};
use crate::{TransportOptions, events};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// How a [`MemorySocket`] reacts to `connect()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    /// Open immediately and dispatch `connect`
    #[default]
    Accept,
    /// Dispatch `connect_error` and stay closed
    Refuse,
    /// Never complete; the socket stays closed until a test injects `connect`
    Hang,
}

/// Factory recording every socket it opens
#[derive(Debug, Default)]
pub struct MemorySocketFactory {
    behavior: ConnectBehavior,
    opened: Mutex<Vec<Arc<MemorySocket>>>,
}

impl MemorySocketFactory {
    /// Create a factory whose sockets connect according to `behavior`
    #[must_use]
    pub fn new(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// All sockets opened so far, oldest first
    #[must_use]
    pub fn sockets(&self) -> Vec<Arc<MemorySocket>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recently opened socket
    #[must_use]
    pub fn last(&self) -> Option<Arc<MemorySocket>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of sockets opened so far
    #[must_use]
    pub fn opened_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SocketFactory for MemorySocketFactory {
    fn open(
        &self,
        endpoint: &str,
        options: &TransportOptions,
    ) -> TransportResult<Arc<dyn EventSocket>> {
        let url = options.endpoint_url(endpoint)?;
        let socket = Arc::new(MemorySocket::new(url.to_string(), self.behavior));
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&socket));
        Ok(socket)
    }
}

/// Socket that records emissions and lets callers inject inbound events
#[derive(Debug)]
pub struct MemorySocket {
    url: String,
    behavior: ConnectBehavior,
    events: EventRegistry,
    emitted: Mutex<Vec<(String, Value)>>,
    open: AtomicBool,
    connect_calls: AtomicUsize,
}

impl MemorySocket {
    /// Create an unconnected socket
    #[must_use]
    pub fn new(url: String, behavior: ConnectBehavior) -> Self {
        Self {
            url,
            behavior,
            events: EventRegistry::new(),
            emitted: Mutex::new(Vec::new()),
            open: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate an inbound event from the remote end.
    ///
    /// Injecting `connect` or `disconnect` also flips the open flag, so a
    /// hanging socket can be completed by hand.
    pub fn inject(&self, event: &str, payload: Value) -> bool {
        match event {
            events::CONNECT => self.open.store(true, Ordering::SeqCst),
            events::DISCONNECT => self.open.store(false, Ordering::SeqCst),
            _ => {}
        }
        self.events.dispatch(event, &payload)
    }

    /// Everything emitted so far, in order
    #[must_use]
    pub fn emitted(&self) -> Vec<(String, Value)> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads emitted under `event`
    #[must_use]
    pub fn emitted_on(&self, event: &str) -> Vec<Value> {
        self.emitted()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload)
            .collect()
    }

    /// How many times `connect()` was called
    #[must_use]
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Whether any handler is bound to `event`
    #[must_use]
    pub fn handles(&self, event: &str) -> bool {
        self.events.handles(event)
    }
}

impl EventSocket for MemorySocket {
    fn on(&self, event: &str, handler: EventHandler) {
        self.events.on(event, handler);
    }

    fn emit(&self, event: &str, payload: Value) -> TransportResult<()> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.to_string(), payload));
        Ok(())
    }

    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ConnectBehavior::Accept => {
                self.inject(events::CONNECT, Value::Null);
            }
            ConnectBehavior::Refuse => {
                self.events.dispatch(
                    events::CONNECT_ERROR,
                    &json!({ "message": "connection refused" }),
                );
            }
            ConnectBehavior::Hang => {}
        }
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.events.dispatch(
                events::DISCONNECT,
                &json!({ "reason": "io client disconnect" }),
            );
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn url(&self) -> &str {
        &self.url
    }
}
