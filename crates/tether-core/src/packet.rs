//! Outbound packets and the clients they are addressed to

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A client session on the host that packets can be addressed to
pub trait Authenticatable: Send + Sync {
    /// Whether the client's own session is live
    fn is_connected(&self) -> bool;

    /// Identity stamped on every packet sent to this client
    fn owner_uuid(&self) -> Uuid;
}

/// Outbound unit of data.
///
/// Serialized as `{"client": "<uuid>", "type": "<channel>", "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Destination client, stamped by the connector right before emission
    pub client: Option<Uuid>,
    /// Logical channel the payload belongs to
    #[serde(rename = "type")]
    pub channel: String,
    /// Payload
    pub data: Value,
}

impl Packet {
    /// Create an unaddressed packet
    #[must_use]
    pub fn new(channel: impl Into<String>, data: Value) -> Self {
        Self {
            client: None,
            channel: channel.into(),
            data,
        }
    }

    /// Create an unaddressed packet from any serializable payload
    ///
    /// # Errors
    /// Returns [`TetherError::Serialization`](crate::TetherError::Serialization)
    /// if the payload cannot be represented as JSON.
    pub fn from_payload<T: Serialize>(channel: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(channel, serde_json::to_value(payload)?))
    }

    /// Address the packet to `client`
    pub fn stamp(&mut self, client: Uuid) {
        self.client = Some(client);
    }

    /// JSON text sent as the payload of the `data` event
    ///
    /// # Errors
    /// Returns [`TetherError::Serialization`](crate::TetherError::Serialization)
    /// if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
