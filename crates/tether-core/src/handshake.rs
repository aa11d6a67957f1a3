//! Relay-assignment backend client
//!
//! Phase one of the handshake: a REST login that exchanges the server's key
//! pair for a relay assignment. The matching logout runs whenever a live
//! session ends.
//!
//! The backend answers every call with the same envelope:
//!
//! ```text
//! {"errors": [{"code": "AUTH_FAIL", "message": "bad key"}], "response": null}
//! {"errors": [], "response": {"assignedRelay": {"secureEndpoint": "...", "insecureEndpoint": "..."}}}
//! ```

use crate::error::HandshakeError;
use crate::keys::KeySet;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default relay backend login endpoint
pub const DEFAULT_LOGIN_URL: &str = "https://plus.tether-relay.net/api/v1/servers/login";

/// Default relay backend logout endpoint
pub const DEFAULT_LOGOUT_URL: &str = "https://plus.tether-relay.net/api/v1/servers/logout";

/// Structured error returned by the relay backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code
    pub code: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Create an error
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a backend call that reached the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse<T> {
    /// Backend rejected the call; never empty
    Errors(Vec<ApiError>),
    /// Typed payload
    Success(T),
}

impl<T> ApiResponse<T> {
    /// First reported error, if the call failed
    #[must_use]
    pub fn first_error(&self) -> Option<&ApiError> {
        match self {
            ApiResponse::Errors(errors) => errors.first(),
            ApiResponse::Success(_) => None,
        }
    }
}

/// Relay assigned to this server for one connection attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayAssignment {
    /// HTTPS endpoint for REST follow-ups
    pub secure_endpoint: String,
    /// Socket endpoint
    pub insecure_endpoint: String,
    /// Relay identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<String>,
    /// Relay display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Login payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// The assigned relay
    pub assigned_relay: RelayAssignment,
}

/// Wire envelope shared by every backend call
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    errors: Vec<ApiError>,
    response: Option<T>,
}

impl<T> Envelope<T> {
    fn into_response(self) -> Result<ApiResponse<T>, HandshakeError> {
        if !self.errors.is_empty() {
            return Ok(ApiResponse::Errors(self.errors));
        }
        self.response
            .map(ApiResponse::Success)
            .ok_or(HandshakeError::invalid_response("envelope has neither errors nor response"))
    }
}

/// Client for the relay-assignment backend.
///
/// `login` is awaited by the connector before it can open a socket; `logout`
/// is fired on a spawned task and its result is only logged.
#[async_trait]
pub trait HandshakeClient: Send + Sync {
    /// Exchange the key pair for a relay assignment
    ///
    /// # Errors
    /// Returns [`HandshakeError`] if the backend cannot be reached or answers
    /// with an unreadable body. Structured rejections are returned as
    /// [`ApiResponse::Errors`], not as an error.
    async fn login(&self, keys: &KeySet) -> Result<ApiResponse<RelayAssignment>, HandshakeError>;

    /// Tell the backend the session ended
    ///
    /// # Errors
    /// Returns [`HandshakeError`] if the call fails or is rejected.
    async fn logout(&self, keys: &KeySet) -> Result<(), HandshakeError>;
}

/// Backend endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeEndpoints {
    /// Login endpoint
    pub login_url: String,
    /// Logout endpoint
    pub logout_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for HandshakeEndpoints {
    fn default() -> Self {
        Self {
            login_url: DEFAULT_LOGIN_URL.to_string(),
            logout_url: DEFAULT_LOGOUT_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`HandshakeClient`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpHandshakeClient {
    http: reqwest::Client,
    endpoints: HandshakeEndpoints,
}

impl HttpHandshakeClient {
    /// Create a client for the given endpoints
    ///
    /// # Errors
    /// Returns [`HandshakeError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoints: HandshakeEndpoints) -> Result<Self, HandshakeError> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(endpoints.request_timeout)
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Configured endpoints
    #[must_use]
    pub fn endpoints(&self) -> &HandshakeEndpoints {
        &self.endpoints
    }

    async fn fetch<T>(&self, url: &str, keys: &KeySet) -> Result<Envelope<T>, HandshakeError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .get(url)
            .query(&keys.query_pairs())
            .send()
            .await?;

        let status = response.status();
        debug!(%status, "Relay backend answered");
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) if status.is_success() || !envelope.errors.is_empty() => Ok(envelope),
            Ok(_) => Err(HandshakeError::Transport(format!("HTTP {status}").into())),
            Err(_) if !status.is_success() => {
                Err(HandshakeError::Transport(format!("HTTP {status}").into()))
            }
            Err(e) => Err(HandshakeError::InvalidResponse(e.to_string().into())),
        }
    }
}

#[async_trait]
impl HandshakeClient for HttpHandshakeClient {
    async fn login(&self, keys: &KeySet) -> Result<ApiResponse<RelayAssignment>, HandshakeError> {
        let response = self
            .fetch::<LoginResponse>(&self.endpoints.login_url, keys)
            .await?
            .into_response()?;
        Ok(match response {
            ApiResponse::Errors(errors) => ApiResponse::Errors(errors),
            ApiResponse::Success(login) => ApiResponse::Success(login.assigned_relay),
        })
    }

    async fn logout(&self, keys: &KeySet) -> Result<(), HandshakeError> {
        let envelope = self
            .fetch::<serde_json::Value>(&self.endpoints.logout_url, keys)
            .await?;
        match envelope.errors.into_iter().next() {
            Some(first) => {
                warn!(code = %first.code, message = %first.message, "Relay logout rejected");
                Err(HandshakeError::Rejected {
                    code: first.code,
                    message: first.message,
                })
            }
            None => Ok(()),
        }
    }
}
