//! End-to-end tests for the relay lifecycle.
//!
//! Drives publish, scheduled sweep and expiry through the HTTP API and the
//! sweep scheduler against mock subscriber endpoints.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use relay_delivery::{RelayOutcome, SweepOutcome, SweepReport, SweepScheduler};
use relay_testing::{EventBuilder, MockResponse, TestEnv};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

async fn trigger(env: &TestEnv, envelope: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(envelope.to_string()))
        .unwrap();

    let response = env.router().unwrap().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn failed_delivery_recovers_on_scheduled_sweep() {
    let env = TestEnv::new().await;
    let url = env.subscribe_failing("/orders", 503).await;
    let event = json!({"id": 1, "type": "order.created"});

    trigger(&env, event.clone()).await;
    assert_eq!(env.store.records_for(&url).await.len(), 1);

    env.http_mock.reset().await;
    env.http_mock.mock_endpoint("/orders", MockResponse::Success { status: 200 }).await;
    env.clock.advance(Duration::from_secs(600));

    let body = trigger(&env, json!({"source": "aws.events"})).await;

    assert_eq!(body["outcome"]["delivered"], 1);
    assert!(env.store.records().await.is_empty());
    assert_eq!(env.http_mock.received_bodies("/orders").await, vec![event]);
}

#[tokio::test]
async fn persistent_failure_expires_after_a_day() {
    let env = TestEnv::new().await;
    let url = env.subscribe_failing("/gone", 500).await;
    trigger(&env, json!({"id": 2})).await;
    let first = env.store.records_for(&url).await;

    env.clock.advance(Duration::from_secs(23 * 3600 + 59 * 60));
    let body = trigger(&env, json!({"source": "aws.events"})).await;
    assert_eq!(body["outcome"]["retained"], 1);
    assert_eq!(env.store.records_for(&url).await, first);

    env.clock.advance(Duration::from_secs(61));
    let body = trigger(&env, json!({"source": "aws.events"})).await;
    assert_eq!(body["outcome"]["expired"], 1);
    assert!(env.store.records().await.is_empty());
    assert_eq!(env.http_mock.request_count("/gone").await, 3);
}

#[tokio::test]
async fn republishing_keeps_original_failure_time() {
    let env = TestEnv::new().await;
    let url = env.subscribe_unreachable().await;
    let event = EventBuilder::new().field("id", 3).build();

    trigger(&env, event.payload().clone()).await;
    let created_at = env.store.records_for(&url).await[0].created_at;

    env.clock.advance(Duration::from_secs(3600));
    trigger(&env, json!({"id": 3.0})).await;

    let records = env.store.records_for(&url).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].created_at, created_at);
}

#[tokio::test]
async fn scheduler_drains_backlog() {
    let env = TestEnv::new().await;
    let url = env.subscribe_failing("/flaky", 502).await;
    let relay = env.relay().unwrap();
    relay.publish(&EventBuilder::with_defaults().build()).await;
    assert_eq!(env.store.records_for(&url).await.len(), 1);

    env.http_mock.reset().await;
    env.http_mock.mock_success("/flaky").await;

    let token = CancellationToken::new();
    let scheduler = SweepScheduler::new(
        relay,
        Duration::from_secs(60),
        std::sync::Arc::new(env.clock.clone()),
        token.clone(),
    );

    assert_eq!(
        scheduler.tick().await,
        RelayOutcome::Sweep(SweepOutcome::Completed(SweepReport {
            delivered: 1,
            ..Default::default()
        }))
    );
    assert!(env.store.records().await.is_empty());
    token.cancel();
    assert_eq!(scheduler.run().await, 0);
}
