//! Request bodies and file payloads shared by the integration tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

/// JPEG start-of-image marker plus an APP0 header.
pub fn jpeg_bytes() -> Vec<u8> {
    vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10]
}

pub fn approve_verdict() -> String {
    json!({
        "isInsuranceDocument": true,
        "confidence": 0.92,
        "recommendation": "APPROVE",
        "extractedData": {
            "policyNumber": "ABC123",
            "insurer": "Acme Insurance",
            "expirationDate": (Utc::now().date_naive() + Duration::days(200)).format("%Y-%m-%d").to_string()
        },
        "validationResults": {"hasRequiredFields": true}
    })
    .to_string()
}

/// Extraction reply with every scored field present and a future expiry.
pub fn complete_extraction() -> String {
    let next_year = Utc::now().date_naive() + Duration::days(365);
    json!({
        "provider": "Acme Insurance",
        "policyNumber": "ABC123",
        "policyholderName": "Jane Driver",
        "effectiveDate": "2024-01-01",
        "expirationDate": next_year.format("%Y-%m-%d").to_string(),
        "coverageType": "Full coverage",
        "liabilityLimit": "$100,000",
        "isValid": true,
        "needsManualReview": false
    })
    .to_string()
}

pub fn decision_payload(session_id: &str, code: i64, customer_id: Uuid, document_number: &str) -> Value {
    json!({
        "status": "success",
        "verification": {
            "id": session_id,
            "code": code,
            "status": "approved",
            "vendorData": customer_id.to_string(),
            "person": {"firstName": "Jane", "lastName": "Driver", "dateOfBirth": "1990-04-02"},
            "document": {
                "number": document_number,
                "type": "DRIVERS_LICENSE",
                "country": "US",
                "validUntil": "2031-01-01"
            }
        }
    })
}

pub fn submitted_payload(session_id: &str, customer_id: Uuid) -> Value {
    json!({
        "id": session_id,
        "action": "submitted",
        "vendorData": customer_id.to_string()
    })
}
