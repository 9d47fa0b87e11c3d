//! Full extraction scan of a stored insurance document.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentguard_core::models::ScanOutcome;
use rentguard_core::ErrorMetadata;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{error_with_body, ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanDocumentRequest {
    pub document_id: Uuid,
    /// Overrides the record's storage path as the download source
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ScanOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/functions/scan-insurance-document",
    tag = "verification",
    request_body = ScanDocumentRequest,
    responses(
        (status = 200, description = "Scan completed", body = ScanResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ScanResponse),
        (status = 409, description = "Another scan is in progress", body = ScanResponse),
        (status = 500, description = "Scan failed", body = ScanResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(document_id = %body.document_id))]
pub async fn scan_insurance_document(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<ScanDocumentRequest>,
) -> Result<Response, HttpAppError> {
    match state
        .scanner
        .scan(body.document_id, body.file_url.as_deref())
        .await
    {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(ScanResponse {
                success: true,
                data: Some(outcome),
                error: None,
            }),
        )
            .into_response()),
        Err(e) => Ok(error_with_body(
            &e,
            ScanResponse {
                success: false,
                data: None,
                error: Some(e.client_message()),
            },
        )),
    }
}
