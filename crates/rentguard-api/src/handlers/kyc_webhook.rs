//! Callback endpoint for the KYC vendor.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use rentguard_core::ErrorMetadata;
use rentguard_services::kyc::{LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::error_with_body;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn signature_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(LEGACY_SIGNATURE_HEADER))
        .and_then(|value| value.to_str().ok())
}

/// The body is taken raw: the signature covers the exact bytes sent.
#[utoipa::path(
    post,
    path = "/webhooks/kyc",
    tag = "kyc",
    request_body(content = String, description = "Raw vendor callback JSON", content_type = "application/json"),
    params(
        ("X-HMAC-SIGNATURE" = Option<String>, Header, description = "Hex HMAC-SHA256 of the body"),
        ("X-Signature" = Option<String>, Header, description = "Legacy signature header")
    ),
    responses(
        (status = 200, description = "Callback accepted", body = WebhookAck),
        (status = 400, description = "Malformed or unrecognized callback", body = WebhookAck),
        (status = 401, description = "Missing or invalid signature", body = WebhookAck),
        (status = 500, description = "Processing failed", body = WebhookAck)
    )
)]
pub async fn kyc_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match state.kyc.handle(&body, signature_header(&headers)).await {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "KYC callback processed");
            (
                StatusCode::OK,
                Json(WebhookAck {
                    ok: true,
                    error: None,
                }),
            )
                .into_response()
        }
        Err(e) => error_with_body(
            &e,
            WebhookAck {
                ok: false,
                error: Some(e.client_message()),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_signature_header_prefers_hmac_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_static("legacy"));
        headers.insert("x-hmac-signature", HeaderValue::from_static("current"));
        assert_eq!(signature_header(&headers), Some("current"));
    }

    #[test]
    fn test_signature_header_falls_back_to_legacy() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Signature", HeaderValue::from_static("legacy"));
        assert_eq!(signature_header(&headers), Some("legacy"));
        assert_eq!(signature_header(&HeaderMap::new()), None);
    }
}
