//! Health check handler for service monitoring.
//!
//! Reports database reachability so orchestration systems can tell a live
//! relay from one whose tables are unreachable.

use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use relay_core::{storage::Storage, Clock};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::server::AppState;

/// Probe for the backing store.
pub trait HealthCheck: Send + Sync + 'static {
    /// Resolves to `Ok` when the store answers a trivial query.
    fn check(&self) -> Pin<Box<dyn Future<Output = relay_core::Result<()>> + Send + '_>>;
}

impl HealthCheck for Storage {
    fn check(&self) -> Pin<Box<dyn Future<Output = relay_core::Result<()>> + Send + '_>> {
        Box::pin(self.health_check())
    }
}

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Database component status
    pub database: ComponentHealth,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Database unreachable
    Unhealthy,
}

/// Health status for an individual component.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Whether the component answered
    pub up: bool,
    /// Error message if the component is down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Runs the store health check and builds the response body.
pub async fn health_report(check: &dyn HealthCheck, clock: &Arc<dyn Clock>) -> HealthResponse {
    let timestamp = clock.now_utc();
    let start_time = clock.now();

    let result = check.check().await;
    let elapsed = clock.now().saturating_duration_since(start_time);
    let response_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let (status, database) = match result {
        Ok(()) => {
            let database = ComponentHealth { up: true, message: None, response_time_ms };
            (HealthStatus::Healthy, database)
        },
        Err(e) => {
            error!(error = %e, "database health check failed");
            let message = Some(format!("Database connection failed: {e}"));
            (HealthStatus::Unhealthy, ComponentHealth { up: false, message, response_time_ms })
        },
    };

    HealthResponse { status, timestamp, database, version: env!("CARGO_PKG_VERSION").to_string() }
}

/// Health check endpoint handler.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = health_report(state.health.as_ref(), &state.clock).await;

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(status = ?response.status, "health check completed");

    (status_code, Json(response)).into_response()
}
