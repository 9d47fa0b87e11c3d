//! KYC vendor callback tests.
//!
//! Run with: `cargo test -p rentguard-api --test kyc_webhook_test`

mod helpers;

use bytes::Bytes;
use helpers::fixtures::{decision_payload, submitted_payload};
use helpers::{setup_test_app, TestApp, TestOptions, KYC_SECRET};
use rentguard_core::models::{CustomerVerificationStatus, IdentityStatus, OutboxStatus, ReviewResult};
use rentguard_services::kyc::sign;
use serde_json::Value;
use uuid::Uuid;

async fn post_signed(app: &TestApp, header: &str, payload: &Value) -> axum_test::TestResponse {
    let body = payload.to_string();
    let signature = sign(KYC_SECRET, body.as_bytes()).unwrap();
    app.client()
        .post("/webhooks/kyc")
        .add_header(header.to_string(), signature)
        .content_type("application/json")
        .bytes(Bytes::from(body))
        .await
}

#[tokio::test]
async fn test_signed_green_decision_verifies_customer() {
    let app = setup_test_app(TestOptions::default()).await;
    let tenant = Uuid::new_v4();
    let customer = app.db.insert_customer(tenant);

    let response = post_signed(
        &app,
        "x-hmac-signature",
        &decision_payload("sess-green", 9001, customer, "D1234567"),
    )
    .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["ok"], true);

    let record = app.db.identity("sess-green").unwrap();
    assert_eq!(record.status, IdentityStatus::Completed);
    assert_eq!(record.review_result, Some(ReviewResult::Green));
    assert_eq!(record.tenant_id, Some(tenant));
    assert!(record.face_url.is_some());

    let row = app.db.customer(customer).unwrap();
    assert_eq!(row.identity_verification_status, CustomerVerificationStatus::Verified);
}

#[tokio::test]
async fn test_legacy_signature_header_is_accepted() {
    let app = setup_test_app(TestOptions::default()).await;
    let customer = app.db.insert_customer(Uuid::new_v4());

    let response = post_signed(
        &app,
        "x-signature",
        &decision_payload("sess-legacy", 9103, customer, "D7654321"),
    )
    .await;

    assert_eq!(response.status_code(), 200);
    let record = app.db.identity("sess-legacy").unwrap();
    assert_eq!(record.review_result, Some(ReviewResult::Retry));
    assert_eq!(app.media.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(
        app.db.customer(customer).unwrap().identity_verification_status,
        CustomerVerificationStatus::RetryRequired
    );
}

#[tokio::test]
async fn test_invalid_signature_is_unauthorized_without_writes() {
    let app = setup_test_app(TestOptions::default()).await;
    let customer = app.db.insert_customer(Uuid::new_v4());
    let body = decision_payload("sess-forged", 9001, customer, "D1234567").to_string();

    let forged = app
        .client()
        .post("/webhooks/kyc")
        .add_header("x-hmac-signature", "00".repeat(32))
        .content_type("application/json")
        .bytes(Bytes::from(body.clone()))
        .await;
    assert_eq!(forged.status_code(), 401);
    assert_eq!(forged.json::<Value>()["ok"], false);

    let unsigned = app
        .client()
        .post("/webhooks/kyc")
        .content_type("application/json")
        .bytes(Bytes::from(body))
        .await;
    assert_eq!(unsigned.status_code(), 401);

    assert_eq!(app.db.identity_count(), 0);
    assert_eq!(
        app.db.customer(customer).unwrap().identity_verification_status,
        CustomerVerificationStatus::Pending
    );
}

#[tokio::test]
async fn test_blocklisted_identity_blocks_customer_and_notifies_admins() {
    let app = setup_test_app(TestOptions::default()).await;
    let tenant = Uuid::new_v4();
    let customer = app.db.insert_customer(tenant);
    let admin = app.db.insert_admin(tenant);
    app.db.insert_blocked_identity(tenant, "D 123 4567", "Unpaid damages");

    let response = post_signed(
        &app,
        "x-hmac-signature",
        &decision_payload("sess-blocked", 9001, customer, "d1234567"),
    )
    .await;

    assert_eq!(response.status_code(), 200);

    let row = app.db.customer(customer).unwrap();
    assert_eq!(row.identity_verification_status, CustomerVerificationStatus::Rejected);
    assert!(row.is_blocked);

    let record = app.db.identity("sess-blocked").unwrap();
    assert!(record
        .rejection_reason
        .as_deref()
        .unwrap()
        .contains("Unpaid damages"));

    let notifications = app.db.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, admin);
    assert_eq!(app.db.outbox_events()[0].status, OutboxStatus::Delivered);
}

#[tokio::test]
async fn test_submission_creates_pending_record() {
    let app = setup_test_app(TestOptions::default()).await;
    let tenant = Uuid::new_v4();
    let customer = app.db.insert_customer(tenant);

    let response = post_signed(&app, "x-hmac-signature", &submitted_payload("sess-sub", customer)).await;

    assert_eq!(response.status_code(), 200);
    let record = app.db.identity("sess-sub").unwrap();
    assert_eq!(record.status, IdentityStatus::Pending);
    assert_eq!(record.review_result, None);
    assert_eq!(record.tenant_id, Some(tenant));
    assert_eq!(record.customer_id, Some(customer));
}

#[tokio::test]
async fn test_unrecognized_callback_is_bad_request() {
    let app = setup_test_app(TestOptions::default()).await;

    let response = post_signed(
        &app,
        "x-hmac-signature",
        &serde_json::json!({"id": "sess-x", "action": "exploded"}),
    )
    .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert!(body["error"].is_string());
    assert_eq!(app.db.identity_count(), 0);
}

#[tokio::test]
async fn test_unsigned_callbacks_accepted_without_secret() {
    let app = setup_test_app(TestOptions {
        kyc_secret: None,
        ..TestOptions::default()
    })
    .await;
    let customer = app.db.insert_customer(Uuid::new_v4());

    let response = app
        .client()
        .post("/webhooks/kyc")
        .json(&decision_payload("sess-open", 9102, customer, "D1234567"))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(
        app.db.identity("sess-open").unwrap().review_result,
        Some(ReviewResult::Red)
    );
}
