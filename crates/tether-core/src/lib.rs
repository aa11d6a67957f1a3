//! # Tether Core
//!
//! Relay connection core for Tether servers.
//!
//! A server behind NAT reaches its clients through a relay. This crate
//! provides:
//! - The connection lifecycle state machine and its listener fan-out
//! - The key-pair handshake with the relay-assignment backend
//! - The socket connector with its two connection watchdogs
//! - Message drivers binding inbound relay events
//! - Gated sending of client packets
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SocketConnector                            │
//! │   (attempt lifecycle, watchdogs, gated send, logout on close)   │
//! ├────────────────────────────┬────────────────────────────────────┤
//! │      HandshakeClient       │          MessageDrivers            │
//! │   (REST login / logout)    │   (client + system event bindings) │
//! ├────────────────────────────┴────────────────────────────────────┤
//! │                        StateService                              │
//! │   (Idle → AssigningRelay → Connecting → Connected, listeners)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      tether-transport                            │
//! │   (named-event sockets over WebSocket)                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connector;
pub mod drivers;
pub mod error;
pub mod handshake;
pub mod keys;
pub mod packet;
pub mod state;

pub use config::{CONNECT_TIMEOUT_TICKS, ConnectorConfig, DEFAULT_CONNECT_TIMEOUT, TICKS_PER_SECOND};
pub use connector::{
    ConnectorBuilder, HANDSHAKE_TIMEOUT_REASON, INVALID_ENDPOINT_REASON, SOCKET_TIMEOUT_REASON,
    SocketConnector, handshake_failure_reason,
};
pub use drivers::{
    ClientDriver, ClientSessions, MessageDriver, NoopControl, SystemControl, SystemDriver,
    UnmanagedSessions,
};
pub use error::{HandshakeError, Result, TetherError};
pub use handshake::{
    ApiError, ApiResponse, HandshakeClient, HandshakeEndpoints, HttpHandshakeClient,
    RelayAssignment,
};
pub use keys::KeySet;
pub use packet::{Authenticatable, Packet};
pub use state::{ConnectionState, INITIAL_REASON, StateListener, StateService};
