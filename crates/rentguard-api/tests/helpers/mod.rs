//! Test helpers: build AppState and router for integration tests.
//!
//! The router is the production one; stores are in memory, storage is a
//! temporary local directory and the model replies from a script.

#![allow(dead_code)]

pub mod fixtures;

use async_trait::async_trait;
use axum_test::TestServer;
use rentguard_api::setup::routes;
use rentguard_api::state::AppState;
use rentguard_core::models::MediaSet;
use rentguard_core::{Config, DocumentSettings, VerificationConfig};
use rentguard_db::InMemoryDatabase;
use rentguard_services::fetcher::InlineImage;
use rentguard_services::{
    CompletionModel, DocumentFetcher, DocumentScanner, InsuranceVerifier, KycWebhookService,
    LocalStorage, MediaSource, OutboxDispatcher, Prompt, Storage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const STORAGE_BASE_URL: &str = "http://files.test";
pub const KYC_SECRET: &str = "test-shared-secret";

/// Model double that returns a fixed reply.
pub struct ScriptedModel {
    pub configured: bool,
    pub reply: Option<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, _prompt: &Prompt, _image: Option<&InlineImage>) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// Vendor media double; every decision gets a face image.
#[derive(Default)]
pub struct StubMedia {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaSource for StubMedia {
    async fn retrieve(&self, session_id: &str) -> MediaSet {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MediaSet {
            face_url: Some(format!(
                "{}/identity-verifications/{}/face.jpg",
                STORAGE_BASE_URL, session_id
            )),
            ..Default::default()
        }
    }
}

pub struct TestOptions {
    /// `None` simulates an unreachable model.
    pub model_reply: Option<String>,
    pub model_configured: bool,
    pub kyc_secret: Option<String>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            model_reply: None,
            model_configured: true,
            kyc_secret: Some(KYC_SECRET.to_string()),
        }
    }
}

impl TestOptions {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            model_reply: Some(reply.into()),
            ..Default::default()
        }
    }
}

/// Test application: server plus handles on its doubles.
pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<InMemoryDatabase>,
    pub storage: Arc<LocalStorage>,
    pub model: Arc<ScriptedModel>,
    pub media: Arc<StubMedia>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Store a file and create a pending document record pointing at it.
    pub async fn insert_stored_document(
        &self,
        key: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> uuid::Uuid {
        self.storage
            .store_object(key, bytes, mime_type)
            .await
            .expect("Failed to store fixture");
        self.db.insert_document(file_name, mime_type, Some(key))
    }
}

pub fn test_config() -> Config {
    let config = VerificationConfig::from_lookup(|key| {
        let value = match key {
            "DATABASE_URL" => "postgresql://localhost/rentguard_test",
            "LOCAL_STORAGE_PATH" => "/tmp/rentguard-test",
            "LOCAL_STORAGE_BASE_URL" => STORAGE_BASE_URL,
            "MAX_REQUEST_BODY_MB" => "1",
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("Test configuration is valid");
    Config(Box::new(config))
}

pub async fn setup_test_app(options: TestOptions) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let storage = Arc::new(
        LocalStorage::new(temp_dir.path(), STORAGE_BASE_URL.to_string())
            .await
            .expect("Failed to create local storage"),
    );
    let db = Arc::new(InMemoryDatabase::new());
    let model = Arc::new(ScriptedModel {
        configured: options.model_configured,
        reply: options.model_reply,
        calls: AtomicUsize::new(0),
    });
    let media = Arc::new(StubMedia::default());

    let fetcher = Arc::new(
        DocumentFetcher::new(
            storage.clone() as Arc<dyn Storage>,
            DocumentSettings {
                url_allowlist: None,
                allow_private_urls: false,
                max_document_size_bytes: 1024 * 1024,
                download_timeout_secs: 5,
                scan_stale_after_secs: 600,
            },
            Duration::from_secs(300),
        )
        .expect("Failed to create fetcher"),
    );
    let stale_after = chrono::Duration::minutes(10);

    let dispatcher = Arc::new(OutboxDispatcher::new(db.clone(), db.clone(), db.clone(), 5));
    let state = Arc::new(AppState {
        verifier: Arc::new(InsuranceVerifier::new(
            db.clone(),
            fetcher.clone(),
            model.clone(),
            stale_after,
        )),
        scanner: Arc::new(DocumentScanner::new(
            db.clone(),
            fetcher,
            model.clone(),
            stale_after,
        )),
        kyc: Arc::new(KycWebhookService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            media.clone(),
            dispatcher,
            options.kyc_secret,
        )),
        db_pool: None,
        outbox_retry: None,
    });

    let app = routes::setup_routes(&test_config(), state).expect("Failed to build router");
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        db,
        storage,
        model,
        media,
        _temp_dir: temp_dir,
    }
}
