//! HTTP client for event delivery with configurable timeouts.
//!
//! Sends one event to one endpoint as a JSON POST. The client never retries
//! on its own; retry is the dispatcher's and sweeper's responsibility.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use bytes::Bytes;
use relay_core::{Clock, Event};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, ErrorCategory, Result};

/// Largest response body kept for diagnostics.
const MAX_LOGGED_BODY_BYTES: usize = 1024;

/// Sends events to subscriber endpoints.
///
/// This is the seam the dispatcher and sweeper deliver through; tests swap in
/// `mock::MockDeliverer`.
pub trait Deliverer: Send + Sync + 'static {
    /// Delivers `event` to `endpoint`, returning `true` only on a 2xx
    /// response. Failures are logged, never raised.
    fn deliver<'a>(
        &'a self,
        event: &'a Event,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// Configuration for the delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a whole request, connect included.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("relay/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

/// Response from a successful delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code (2xx).
    pub status_code: u16,
    /// Response body, truncated for logging.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
}

/// HTTP client used to reach subscriber endpoints.
///
/// Wraps a pooled `reqwest::Client`; cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built from the provided settings.
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config, clock })
    }

    /// Creates a new delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Result<Self> {
        Self::new(ClientConfig::default(), clock)
    }

    /// Sends an event and reports the categorized outcome.
    ///
    /// # Errors
    ///
    /// - `NetworkError` for connection failures
    /// - `Timeout` when the request exceeds the configured timeout
    /// - `ClientError` / `ServerError` / `UnexpectedStatus` for non-2xx
    ///   responses
    pub async fn send(&self, event: &Event, endpoint: &str) -> Result<DeliveryResponse> {
        let body = serde_json::to_vec(event.payload())
            .map(Bytes::from)
            .map_err(|e| DeliveryError::serialization(e.to_string()))?;
        let start_time = self.clock.now();

        let response = match self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let duration = self.clock.now().saturating_duration_since(start_time);
                tracing::debug!(duration_ms = duration.as_millis(), "request failed: {}", e);

                if e.is_timeout() {
                    return Err(DeliveryError::timeout(self.config.timeout.as_secs()));
                }
                if e.is_connect() {
                    return Err(DeliveryError::network(format!("connection failed: {e}")));
                }
                return Err(DeliveryError::network(e.to_string()));
            },
        };

        let duration = self.clock.now().saturating_duration_since(start_time);
        let status_code = response.status().as_u16();
        let is_success = response.status().is_success();
        let body = read_body(response).await;

        tracing::debug!(
            status = status_code,
            duration_ms = duration.as_millis(),
            "received response"
        );

        if is_success {
            Ok(DeliveryResponse { status_code, body, duration })
        } else {
            Err(DeliveryError::from_status(status_code, body))
        }
    }
}

impl Deliverer for DeliveryClient {
    fn deliver<'a>(
        &'a self,
        event: &'a Event,
        endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        let span = info_span!("event_delivery", endpoint = %endpoint);

        Box::pin(
            async move {
                tracing::debug!(payload = %event.payload(), "delivering event");

                match self.send(event, endpoint).await {
                    Ok(response) => {
                        tracing::debug!(
                            status = response.status_code,
                            duration_ms = response.duration.as_millis(),
                            "event accepted by endpoint"
                        );
                        true
                    },
                    Err(error) => {
                        tracing::error!(
                            category = %ErrorCategory::from(&error),
                            status = error.status_code(),
                            error = %error,
                            body = response_body(&error),
                            "event delivery failed"
                        );
                        false
                    },
                }
            }
            .instrument(span),
        )
    }
}

/// Reads a response body, keeping at most `MAX_LOGGED_BODY_BYTES`.
async fn read_body(response: Response) -> String {
    match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_LOGGED_BODY_BYTES => {
            let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY_BYTES]);
            format!("{truncated}... (truncated)")
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}

fn response_body(error: &DeliveryError) -> &str {
    match error {
        DeliveryError::ClientError { body, .. } | DeliveryError::ServerError { body, .. } => body,
        _ => "",
    }
}

pub mod mock {
    //! Scripted deliverer for testing relay logic without HTTP.
    //!
    //! Each endpoint is configured to succeed or fail; unknown endpoints
    //! fail, mirroring an unreachable host. Every attempt is recorded.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use relay_core::Event;
    use tokio::sync::RwLock;

    use super::Deliverer;

    /// A delivery attempt observed by `MockDeliverer`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedAttempt {
        /// Endpoint the event was sent to.
        pub endpoint: String,
        /// Event that was sent.
        pub event: Event,
    }

    /// Deliverer with per-endpoint scripted outcomes.
    #[derive(Debug, Clone, Default)]
    pub struct MockDeliverer {
        outcomes: Arc<RwLock<HashMap<String, bool>>>,
        attempts: Arc<RwLock<Vec<RecordedAttempt>>>,
    }

    impl MockDeliverer {
        /// Creates a deliverer where every endpoint fails.
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes deliveries to `endpoint` succeed.
        pub async fn succeed(&self, endpoint: impl Into<String>) {
            self.outcomes.write().await.insert(endpoint.into(), true);
        }

        /// Makes deliveries to `endpoint` fail.
        pub async fn fail(&self, endpoint: impl Into<String>) {
            self.outcomes.write().await.insert(endpoint.into(), false);
        }

        /// Returns every recorded attempt in arrival order.
        pub async fn attempts(&self) -> Vec<RecordedAttempt> {
            self.attempts.read().await.clone()
        }

        /// Returns the number of attempts made against `endpoint`.
        pub async fn attempts_for(&self, endpoint: &str) -> usize {
            self.attempts.read().await.iter().filter(|a| a.endpoint == endpoint).count()
        }
    }

    impl Deliverer for MockDeliverer {
        fn deliver<'a>(
            &'a self,
            event: &'a Event,
            endpoint: &'a str,
        ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
            Box::pin(async move {
                self.attempts
                    .write()
                    .await
                    .push(RecordedAttempt { endpoint: endpoint.to_string(), event: event.clone() });
                self.outcomes.read().await.get(endpoint).copied().unwrap_or(false)
            })
        }
    }
}
