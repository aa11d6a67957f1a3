//! Inbound message drivers
//!
//! A driver owns one family of inbound events. When the connector opens a
//! socket it boots every driver against it, and each driver binds its own
//! event names. The driver set is fixed when the connector is built.
//!
//! Two drivers are always present:
//! - [`ClientDriver`]: client identity and session lifecycle
//! - [`SystemDriver`]: socket lifecycle and relay control events

pub mod client;
pub mod system;

pub use client::{ClientDriver, ClientSessions, UnmanagedSessions};
pub use system::{NoopControl, SystemControl, SystemDriver};

use std::sync::Arc;
use tether_transport::EventSocket;

/// A family of inbound event handlers
pub trait MessageDriver: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Bind this driver's handlers on a freshly opened socket.
    ///
    /// Handlers that need to answer on the socket must hold it weakly; the
    /// socket owns its handlers.
    fn boot(&self, socket: &Arc<dyn EventSocket>);
}
