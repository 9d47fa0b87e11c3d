//! Shared application state handed to every handler.

use rentguard_services::{DocumentScanner, InsuranceVerifier, KycWebhookService, OutboxRetryService};
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub verifier: Arc<InsuranceVerifier>,
    pub scanner: Arc<DocumentScanner>,
    pub kyc: Arc<KycWebhookService>,
    /// Pool pinged by the health check; absent when the stores are not Postgres-backed.
    pub db_pool: Option<PgPool>,
    pub outbox_retry: Option<Arc<OutboxRetryService>>,
}
