//! Event-name to handler table.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Handler invoked with the payload of an inbound event
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Ordered handler lists keyed by event name.
///
/// Dispatch snapshots the handler list before invoking it, so a handler may
/// register further handlers or emit on its socket without deadlocking.
#[derive(Default)]
pub struct EventRegistry {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event`
    pub fn on(&self, event: &str, handler: EventHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    /// Invoke every handler bound to `event`.
    ///
    /// Returns `true` if at least one handler claimed the event.
    pub fn dispatch(&self, event: &str, payload: &Value) -> bool {
        let bound: Vec<EventHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(event) {
                Some(list) => list.clone(),
                None => return false,
            }
        };

        for handler in &bound {
            handler(payload);
        }
        !bound.is_empty()
    }

    /// Whether any handler is bound to `event`
    #[must_use]
    pub fn handles(&self, event: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .is_some_and(|list| !list.is_empty())
    }

    /// Names of all events with at least one handler, sorted
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.event_names())
            .finish()
    }
}
