//! Test fixtures
//!
//! - [`RelayFixture`]: a connector wired to a scripted handshake and
//!   in-memory sockets, recording every state transition
//! - [`RelayBackend`]: a `wiremock` server answering relay backend calls
//!   with fixed bodies

mod backend;
mod relay;

pub use backend::RelayBackend;
pub use relay::{Login, RelayFixture, ScriptedHandshake, TestClient, assignment, wait_for_state};
