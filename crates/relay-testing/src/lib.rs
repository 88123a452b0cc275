//! Test infrastructure for the relay.
//!
//! Bundles in-memory stores, a deterministic clock, and a mock HTTP server
//! into a `TestEnv` so tests can drive the real dispatcher, sweeper and API
//! without a database.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use chrono::{DateTime, Utc};
use relay_api::{create_router, handlers::HealthCheck, AppState};
use relay_core::{error::CoreError, Clock, PendingDelivery};
use relay_delivery::{
    storage::mock::{MockRetryStore, MockSubscriberDirectory},
    Relay, RelayConfig,
};
use tokio::sync::RwLock;
use tokio_util::task::TaskTracker;

pub mod fixtures;
pub mod http;

pub use fixtures::{EventBuilder, PendingDeliveryBuilder};
pub use http::{MockResponse, MockServer, REFUSED_ENDPOINT};
pub use relay_core::TestClock;

/// Health check whose answer is set by the test.
#[derive(Debug, Clone, Default)]
pub struct StubHealth {
    down: Arc<RwLock<bool>>,
}

impl StubHealth {
    /// Makes the check fail until reset.
    pub async fn set_down(&self, down: bool) {
        *self.down.write().await = down;
    }
}

impl HealthCheck for StubHealth {
    fn check(&self) -> Pin<Box<dyn Future<Output = relay_core::Result<()>> + Send + '_>> {
        Box::pin(async move {
            if *self.down.read().await {
                return Err(CoreError::Database("connection refused".to_string()));
            }
            Ok(())
        })
    }
}

/// Test environment wiring a real HTTP relay to in-memory tables.
///
/// Provides:
/// - A mock HTTP server for subscriber endpoints
/// - Deterministic time control shared by every component
/// - In-memory retry store and subscriber directory with failure injection
pub struct TestEnv {
    /// HTTP mock server for subscriber endpoints
    pub http_mock: MockServer,
    /// Deterministic clock for expiry tests
    pub clock: TestClock,
    /// In-memory pending delivery table
    pub store: MockRetryStore,
    /// In-memory subscriber table
    pub directory: MockSubscriberDirectory,
    /// Controllable database health check
    pub health: StubHealth,
    config: RelayConfig,
}

impl TestEnv {
    /// Creates an environment with a short delivery timeout.
    pub async fn new() -> Self {
        let mut config = RelayConfig::default();
        config.client_config.timeout = Duration::from_secs(2);
        Self::with_config(config).await
    }

    /// Creates an environment with the given relay configuration.
    pub async fn with_config(config: RelayConfig) -> Self {
        Self {
            http_mock: MockServer::start().await,
            clock: TestClock::new(),
            store: MockRetryStore::new(),
            directory: MockSubscriberDirectory::default(),
            health: StubHealth::default(),
            config,
        }
    }

    /// Current time of the test clock, at persisted precision.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    /// Registers a subscriber answering 200 at `path` and returns its URL.
    pub async fn subscribe_ok(&self, path: &str) -> String {
        let url = self.http_mock.mock_success(path).await;
        self.directory.add(url.clone()).await;
        url
    }

    /// Registers a subscriber failing with `status` at `path` and returns
    /// its URL.
    pub async fn subscribe_failing(&self, path: &str, status: u16) -> String {
        let url = self.http_mock.mock_failure(path, status).await;
        self.directory.add(url.clone()).await;
        url
    }

    /// Registers a subscriber whose connections are refused.
    pub async fn subscribe_unreachable(&self) -> String {
        self.directory.add(REFUSED_ENDPOINT).await;
        REFUSED_ENDPOINT.to_string()
    }

    /// Seeds a pending delivery relative to the test clock.
    pub async fn seed_pending(&self, builder: PendingDeliveryBuilder) -> PendingDelivery {
        let record = builder.build_at(self.now());
        self.store.insert(record.clone()).await;
        record
    }

    /// Builds a relay delivering over HTTP against this environment.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn relay(&self) -> Result<Arc<Relay>> {
        let relay = Relay::new(
            &self.config,
            Arc::new(self.directory.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.clock.clone()),
        )?;
        Ok(Arc::new(relay))
    }

    /// Builds API state around a fresh relay.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be built.
    pub fn app_state(&self) -> Result<AppState> {
        Ok(AppState {
            relay: self.relay()?,
            health: Arc::new(self.health.clone()),
            clock: Arc::new(self.clock.clone()),
            request_timeout: Duration::from_secs(30),
            tasks: TaskTracker::new(),
        })
    }

    /// Builds the API router for `tower::ServiceExt::oneshot` tests.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be built.
    pub fn router(&self) -> Result<Router> {
        Ok(create_router(self.app_state()?))
    }
}
