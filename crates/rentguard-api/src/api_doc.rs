//! OpenAPI documentation served at `/api/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::handlers;
use rentguard_core::models;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RentGuard Verification API",
        version = "0.1.0",
        description = "Insurance document verification, extraction scans with fraud scoring, and KYC vendor callbacks."
    ),
    paths(
        handlers::verify_insurance::verify_insurance,
        handlers::scan_document::scan_insurance_document,
        handlers::kyc_webhook::kyc_webhook,
        handlers::health::health_check,
    ),
    components(schemas(
        ErrorResponse,
        handlers::verify_insurance::VerifyInsuranceRequest,
        handlers::verify_insurance::VerificationFailure,
        handlers::scan_document::ScanDocumentRequest,
        handlers::scan_document::ScanResponse,
        handlers::kyc_webhook::WebhookAck,
        handlers::health::HealthCheckResponse,
        models::VerificationResult,
        models::VerificationStatus,
        models::ValidationChecks,
        models::CheckOutcome,
        models::VerifiedPolicyFields,
        models::ScanOutcome,
        models::VerificationDecision,
    )),
    tags(
        (name = "verification", description = "Insurance document verification and scans"),
        (name = "kyc", description = "Identity verification callbacks"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
