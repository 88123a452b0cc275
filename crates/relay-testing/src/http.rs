//! HTTP mocking utilities for subscriber endpoints.

use std::time::Duration;

use serde_json::Value;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer as WiremockServer, ResponseTemplate,
};

/// Port nothing listens on; connections are refused immediately.
pub const REFUSED_ENDPOINT: &str = "http://127.0.0.1:1/unreachable";

/// How a mocked subscriber endpoint answers.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Respond with the given 2xx status.
    Success {
        /// Status code to return.
        status: u16,
    },
    /// Respond with the given non-2xx status.
    Failure {
        /// Status code to return.
        status: u16,
    },
    /// Respond with 200 after a delay longer than any test client timeout.
    Timeout,
}

/// HTTP mock server standing in for subscriber endpoints.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Returns the base URL of the mock server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Returns the full URL for `path`.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Configures `path` to answer JSON POSTs with `response`.
    pub async fn mock_endpoint(&self, endpoint_path: &str, response: MockResponse) {
        let template = match response {
            MockResponse::Success { status } | MockResponse::Failure { status } => {
                ResponseTemplate::new(status)
            },
            MockResponse::Timeout => {
                ResponseTemplate::new(200).set_delay(Duration::from_secs(35))
            },
        };

        Mock::given(method("POST"))
            .and(path(endpoint_path))
            .and(header("content-type", "application/json"))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Shorthand for a `200 OK` endpoint.
    pub async fn mock_success(&self, endpoint_path: &str) -> String {
        self.mock_endpoint(endpoint_path, MockResponse::Success { status: 200 }).await;
        self.endpoint_url(endpoint_path)
    }

    /// Shorthand for an endpoint failing with `status`.
    pub async fn mock_failure(&self, endpoint_path: &str, status: u16) -> String {
        self.mock_endpoint(endpoint_path, MockResponse::Failure { status }).await;
        self.endpoint_url(endpoint_path)
    }

    /// Removes every configured endpoint and forgets received requests.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Returns the JSON bodies POSTed to `endpoint_path`, in arrival order.
    pub async fn received_bodies(&self, endpoint_path: &str) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == endpoint_path)
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Returns how many requests reached `endpoint_path`.
    pub async fn request_count(&self, endpoint_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == endpoint_path)
            .count()
    }
}
