//! Synchronous approve/reject/manual-review check for an uploaded document.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentguard_core::models::{VerificationResult, VerificationStatus};
use rentguard_core::{AppError, ErrorMetadata};
use rentguard_services::VerificationRequest;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{error_with_body, ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyInsuranceRequest {
    pub document_id: Uuid,
    /// Download URL or storage key of the uploaded file
    #[validate(length(min = 1, message = "fileUrl must not be empty"))]
    pub file_url: String,
    #[validate(length(min = 1, message = "fileName must not be empty"))]
    pub file_name: String,
    #[validate(length(min = 1, message = "mimeType must not be empty"))]
    pub mime_type: String,
}

/// Failure body; the document falls back to manual review.
#[derive(Debug, Serialize, ToSchema)]
pub struct VerificationFailure {
    pub error: String,
    pub message: String,
    pub status: VerificationStatus,
}

#[utoipa::path(
    post,
    path = "/api/verify-insurance",
    tag = "verification",
    request_body = VerifyInsuranceRequest,
    responses(
        (status = 200, description = "Verification verdict", body = VerificationResult),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 500, description = "Verification failed; manual review required", body = VerificationFailure)
    )
)]
#[tracing::instrument(skip(state, body), fields(document_id = %body.document_id))]
pub async fn verify_insurance(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<VerifyInsuranceRequest>,
) -> Result<Response, HttpAppError> {
    body.validate().map_err(AppError::from)?;

    let request = VerificationRequest {
        document_id: body.document_id,
        file_reference: body.file_url,
        file_name: body.file_name,
        mime_type: body.mime_type,
    };

    match state.verifier.verify(&request).await {
        Ok(result) => Ok((StatusCode::OK, Json(result)).into_response()),
        Err(e) => Ok(error_with_body(
            &e,
            VerificationFailure {
                error: e.client_message(),
                message: "Verification could not be completed. The document will be sent to manual review."
                    .to_string(),
                status: VerificationStatus::PendingReview,
            },
        )),
    }
}
