//! Service initialization and application state setup

use anyhow::{Context, Result};
use rentguard_core::Config;
use rentguard_db::{
    BlocklistRepository, CustomerRepository, DocumentRepository, IdentityVerificationRepository,
    NotificationRepository, OutboxRepository, UserRepository,
};
use rentguard_services::{
    DocumentFetcher, DocumentScanner, InsuranceVerifier, KycWebhookService, MediaRetriever,
    ModelClient, OutboxDispatcher, OutboxRetryService, OutboxRetryServiceConfig, Storage,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

/// Wire repositories, clients and pipelines, and start the outbox worker.
pub fn initialize_services(
    config: &Config,
    pool: PgPool,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let documents = Arc::new(DocumentRepository::new(pool.clone()));
    let identities = Arc::new(IdentityVerificationRepository::new(pool.clone()));
    let customers = Arc::new(CustomerRepository::new(pool.clone()));
    let blocklist = Arc::new(BlocklistRepository::new(pool.clone()));
    let users = Arc::new(UserRepository::new(pool.clone()));
    let notifications = Arc::new(NotificationRepository::new(pool.clone()));
    let outbox = Arc::new(OutboxRepository::new(pool.clone()));

    let model = Arc::new(
        ModelClient::new(config.model().clone()).context("Failed to initialize model client")?,
    );
    if !config.model().is_configured() {
        tracing::warn!("No model API credential configured; verification requests will fail");
    }

    let fetcher = Arc::new(
        DocumentFetcher::new(
            storage.clone(),
            config.documents().clone(),
            Duration::from_secs(config.signed_url_ttl_secs()),
        )
        .context("Failed to initialize document fetcher")?,
    );
    let stale_after = chrono::Duration::seconds(config.documents().scan_stale_after_secs);

    let verifier = Arc::new(InsuranceVerifier::new(
        documents.clone(),
        fetcher.clone(),
        model.clone(),
        stale_after,
    ));
    let scanner = Arc::new(DocumentScanner::new(documents, fetcher, model, stale_after));

    let dispatcher = Arc::new(OutboxDispatcher::new(
        outbox,
        users,
        notifications,
        config.outbox().max_attempts,
    ));
    let media = Arc::new(
        MediaRetriever::new(storage, config.kyc()).context("Failed to initialize media retriever")?,
    );
    let kyc = Arc::new(KycWebhookService::new(
        identities,
        customers,
        blocklist,
        media,
        dispatcher.clone(),
        config.kyc().shared_secret.clone(),
    ));

    let retry_config = OutboxRetryServiceConfig::from(config.outbox());
    tracing::info!(
        poll_interval_seconds = retry_config.poll_interval_seconds,
        batch_size = retry_config.batch_size,
        max_attempts = config.outbox().max_attempts,
        "Starting outbox retry service"
    );
    let outbox_retry = Arc::new(OutboxRetryService::start(dispatcher, retry_config));

    Ok(Arc::new(AppState {
        verifier,
        scanner,
        kyc,
        db_pool: Some(pool),
        outbox_retry: Some(outbox_retry),
    }))
}
