//! Relay backend double on top of `wiremock`

use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock relay-assignment backend.
///
/// Every answer is bound to a GET on one path carrying `type=server`;
/// anything else gets wiremock's default 404.
pub struct RelayBackend {
    server: MockServer,
}

impl RelayBackend {
    /// Start a backend on an ephemeral local port
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Answer `route` with `status` and a JSON body
    pub async fn answer_json(&self, route: &str, status: u16, body: Value) {
        self.answer(route, ResponseTemplate::new(status).set_body_json(body))
            .await;
    }

    /// Answer `route` with `status` and a raw text body
    pub async fn answer_text(&self, route: &str, status: u16, body: &str) {
        self.answer(route, ResponseTemplate::new(status).set_body_string(body))
            .await;
    }

    async fn answer(&self, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(query_param("type", "server"))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Absolute URL for `route`
    #[must_use]
    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// Request targets (path and query) received so far
    pub async fn requests(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| match request.url.query() {
                Some(query) => format!("{}?{}", request.url.path(), query),
                None => request.url.path().to_string(),
            })
            .collect()
    }

    /// Whether a request to `route` arrives within `within`
    pub async fn saw_request(&self, route: &str, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while !self.requests().await.iter().any(|r| r.starts_with(route)) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}
