//! Health check endpoint tests.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use relay_testing::TestEnv;
use serde_json::Value;
use tower::ServiceExt;

async fn get_health(env: &TestEnv) -> (StatusCode, Value) {
    let request = Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap();

    let response = env.router().unwrap().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn healthy_database_returns_ok() {
    let env = TestEnv::new().await;

    let (status, body) = get_health(&env).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["up"], true);
    assert!(body["database"].get("message").is_none());
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn unreachable_database_returns_unavailable() {
    let env = TestEnv::new().await;
    env.health.set_down(true).await;

    let (status, body) = get_health(&env).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"]["up"], false);
    assert!(body["database"]["message"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let env = TestEnv::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = env.router().unwrap().oneshot(request).await.unwrap();

    let request_id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert_eq!(request_id.len(), 36);
}
