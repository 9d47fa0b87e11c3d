//! Health, documentation and middleware tests.
//!
//! Run with: `cargo test -p rentguard-api --test health_test`

mod helpers;

use helpers::{setup_test_app, TestOptions};
use serde_json::Value;

#[tokio::test]
async fn test_health_without_database_pool() {
    let app = setup_test_app(TestOptions::default()).await;

    let response = app.client().get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
}

#[tokio::test]
async fn test_request_id_is_generated_and_propagated() {
    let app = setup_test_app(TestOptions::default()).await;

    let generated = app.client().get("/health").await;
    let id = generated
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    let propagated = app
        .client()
        .get("/health")
        .add_header("x-request-id", "trace-abc-123")
        .await;
    assert_eq!(
        propagated.headers().get("x-request-id").unwrap(),
        "trace-abc-123"
    );
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = setup_test_app(TestOptions::default()).await;

    let response = app.client().get("/api/openapi.json").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert!(body["paths"]["/api/verify-insurance"].is_object());
    assert!(body["paths"]["/webhooks/kyc"].is_object());
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = setup_test_app(TestOptions::default()).await;

    let response = app
        .client()
        .post("/webhooks/kyc")
        .content_type("application/json")
        .bytes(bytes::Bytes::from(vec![b'a'; 2 * 1024 * 1024]))
        .await;

    assert_eq!(response.status_code(), 413);
}
