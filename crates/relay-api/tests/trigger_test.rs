//! Trigger endpoint tests.
//!
//! Drives `POST /events` and `POST /sweep` through the router against mock
//! subscriber endpoints and in-memory tables.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration as StdDuration};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::Duration;
use relay_api::create_router;
use relay_core::Event;
use relay_delivery::{Deliverer, Relay, RelayConfig};
use relay_testing::{PendingDeliveryBuilder, TestEnv};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Deliverer whose endpoints take longer to fail than the request may wait.
struct SlowFailure;

impl Deliverer for SlowFailure {
    fn deliver<'a>(
        &'a self,
        _event: &'a Event,
        _endpoint: &'a str,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async {
            tokio::time::sleep(StdDuration::from_millis(500)).await;
            false
        })
    }
}

async fn post(env: &TestEnv, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();

    let response = env.router().unwrap().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post_json(env: &TestEnv, uri: &str, body: &Value) -> (StatusCode, Value) {
    post(env, uri, Body::from(body.to_string())).await
}

#[tokio::test]
async fn published_event_fans_out() {
    let env = TestEnv::new().await;
    env.subscribe_ok("/ok").await;
    let down = env.subscribe_unreachable().await;

    let (status, body) = post_json(&env, "/events", &json!({"id": 1})).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["trigger"], "publish");
    assert_eq!(body["outcome"]["status"], "completed");
    assert_eq!(body["outcome"]["delivered"], 1);
    assert_eq!(body["outcome"]["deferred"], 1);

    let pending = env.store.records().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].subscriber, down);
    assert_eq!(pending[0].event.payload(), &json!({"id": 1}));
}

#[tokio::test]
async fn scheduled_envelope_sweeps() {
    let env = TestEnv::new().await;
    let url = env.http_mock.mock_success("/now-ok").await;
    env.seed_pending(PendingDeliveryBuilder::new(url).age(Duration::hours(2))).await;

    let envelope = json!({"source": "aws.events", "detail-type": "Scheduled Event"});
    let (status, body) = post_json(&env, "/events", &envelope).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["trigger"], "sweep");
    assert_eq!(body["outcome"]["delivered"], 1);
    assert!(env.store.records().await.is_empty());
}

#[tokio::test]
async fn manual_sweep_reports_store_outage() {
    let env = TestEnv::new().await;
    env.store.fail_listing(true).await;

    let (status, body) = post(&env, "/sweep", Body::empty()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"trigger": "sweep", "outcome": {"status": "store_unavailable"}}));
}

#[tokio::test]
async fn directory_outage_is_accepted_not_failed() {
    let env = TestEnv::new().await;
    env.subscribe_ok("/ok").await;
    env.directory.set_unavailable(true).await;

    let (status, body) = post_json(&env, "/events", &json!({"id": 2})).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"]["status"], "directory_unavailable");
    assert_eq!(env.http_mock.request_count("/ok").await, 0);
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let env = TestEnv::new().await;

    let (status, _) = post(&env, "/events", Body::from("{not json")).await;

    assert!(status.is_client_error());
    assert!(env.store.records().await.is_empty());
}

#[tokio::test]
async fn timed_out_request_still_records_every_failure() {
    let env = TestEnv::new().await;
    env.directory.add("http://slow-a").await;
    env.directory.add("http://slow-b").await;

    let mut state = env.app_state().unwrap();
    state.relay = Arc::new(
        Relay::from_parts(
            &RelayConfig::default(),
            Arc::new(env.directory.clone()),
            Arc::new(env.store.clone()),
            Arc::new(SlowFailure),
            Arc::new(env.clock.clone()),
        )
        .unwrap(),
    );
    state.request_timeout = StdDuration::from_millis(100);
    let tasks = state.tasks.clone();

    let request = Request::builder()
        .method("POST")
        .uri("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"id": 1}).to_string()))
        .unwrap();
    let response = create_router(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    tasks.close();
    tasks.wait().await;

    let pending = env.store.records().await;
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|record| record.event.payload() == &json!({"id": 1})));
}
