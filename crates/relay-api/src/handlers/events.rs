//! Trigger handlers.
//!
//! `POST /events` accepts a trigger envelope and routes it exactly like the
//! scheduler does: the scheduled-source marker runs a sweep, anything else
//! is published. `POST /sweep` forces a sweep. Both always answer
//! `202 Accepted` with the outcome; delivery and store failures are part of
//! the outcome, never an HTTP error.
//!
//! Trigger work runs on its own task. A request that times out or whose
//! client disconnects stops waiting for the outcome, but every subscriber is
//! still attempted and every failure is still recorded. Tasks are tracked in
//! `AppState::tasks` so shutdown can drain them.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_delivery::Trigger;
use serde_json::Value;
use tracing::{error, info, instrument, Instrument};

use crate::server::AppState;

/// Handles a trigger envelope.
#[instrument(name = "handle_trigger", skip(state, envelope))]
pub async fn handle_trigger(
    State(state): State<AppState>,
    Json(envelope): Json<Value>,
) -> Response {
    let trigger = Trigger::from_envelope(envelope);
    info!(sweep = matches!(trigger, Trigger::Sweep), "processing trigger");

    run_detached(&state, trigger).await
}

/// Runs a sweep on demand.
#[instrument(name = "manual_sweep", skip(state))]
pub async fn sweep(State(state): State<AppState>) -> Response {
    info!("processing manual sweep");

    run_detached(&state, Trigger::Sweep).await
}

async fn run_detached(state: &AppState, trigger: Trigger) -> Response {
    let relay = state.relay.clone();
    let task = state.tasks.spawn(async move { relay.handle(trigger).await }.in_current_span());

    match task.await {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(outcome)).into_response(),
        Err(e) => {
            error!(error = %e, "trigger task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}
