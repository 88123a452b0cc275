//! Integration tests for the HTTP delivery client.
//!
//! Tests request shape, success detection, and how transport and status
//! failures are reported through the boolean `Deliverer` contract.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{sync::Arc, time::Duration};

use relay_core::{Event, TestClock};
use relay_delivery::{ClientConfig, Deliverer, DeliveryClient, DeliveryError};
use serde_json::json;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn client_with_timeout(timeout: Duration) -> DeliveryClient {
    let config = ClientConfig { timeout, ..Default::default() };
    DeliveryClient::new(config, Arc::new(TestClock::new())).unwrap()
}

fn client() -> DeliveryClient {
    client_with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn posts_event_as_json() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .and(matchers::header("content-type", "application/json"))
        .and(matchers::body_json(json!({"id": 1, "kind": "created"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let event = Event::new(json!({"kind": "created", "id": 1}));
    let delivered = client().deliver(&event, &format!("{}/hook", server.uri())).await;

    assert!(delivered);
}

#[tokio::test]
async fn any_2xx_status_is_success() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let event = Event::new(json!({"id": 1}));
    assert!(client().deliver(&event, &server.uri()).await);
}

#[tokio::test]
async fn non_2xx_status_is_failure() {
    let event = Event::new(json!({"id": 1}));

    for status in [301, 400, 404, 500, 503] {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        assert!(!client().deliver(&event, &server.uri()).await, "status {status} should fail");
    }
}

#[tokio::test]
async fn connection_refused_is_failure() {
    let event = Event::new(json!({"id": 1}));

    assert!(!client().deliver(&event, "http://127.0.0.1:1/hook").await);

    let error = client().send(&event, "http://127.0.0.1:1/hook").await.unwrap_err();
    assert!(matches!(error, DeliveryError::NetworkError { .. }), "got {error:?}");
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let event = Event::new(json!({"id": 1}));
    let client = client_with_timeout(Duration::from_millis(200));

    let error = client.send(&event, &server.uri()).await.unwrap_err();
    assert!(matches!(error, DeliveryError::Timeout { .. }), "got {error:?}");
    assert!(!client.deliver(&event, &server.uri()).await);
}

#[tokio::test]
async fn client_never_retries_internally() {
    let server = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let event = Event::new(json!({"id": 1}));
    assert!(!client().deliver(&event, &server.uri()).await);
}

#[tokio::test]
async fn invalid_endpoint_is_failure() {
    let event = Event::new(json!({"id": 1}));
    assert!(!client().deliver(&event, "not a url").await);
}
