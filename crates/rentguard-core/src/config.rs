//! Configuration module
//!
//! Settings are read once from the environment at startup. Numeric values fall
//! back to their defaults when unparsable; required values fail loudly.

use std::env;

use crate::storage_types::StorageBackend;

// Common constants
const SERVER_PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_REQUEST_BODY_MB: usize = 10;
const SIGNED_URL_TTL_SECS: u64 = 3600;

const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_COMPLETION_TOKENS: u32 = 2000;
const MODEL_TEMPERATURE: f32 = 0.1;
const MODEL_TIMEOUT_SECS: u64 = 120;

const MAX_DOCUMENT_SIZE_MB: usize = 20;
const DOCUMENT_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const SCAN_STALE_AFTER_SECS: i64 = 600;

const DEFAULT_KYC_BASE_URL: &str = "https://stationapi.veriff.com";
const KYC_MEDIA_TIMEOUT_SECS: u64 = 30;

const OUTBOX_POLL_INTERVAL_SECS: u64 = 30;
const OUTBOX_BATCH_SIZE: i64 = 50;
const OUTBOX_MAX_ATTEMPTS: i32 = 8;

/// Server and database settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub request_timeout_secs: u64,
    pub max_request_body_bytes: usize,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

/// Chat-completion model endpoint
#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    pub fallback_api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_completion_tokens: u32,
    /// Some reasoning models reject any temperature other than their default.
    pub omit_temperature: bool,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl ModelSettings {
    /// Credentials in the order they should be tried.
    pub fn credentials(&self) -> Vec<String> {
        [&self.api_key, &self.fallback_api_key]
            .into_iter()
            .flatten()
            .filter(|key| !key.trim().is_empty())
            .cloned()
            .collect()
    }

    pub fn is_configured(&self) -> bool {
        !self.credentials().is_empty()
    }
}

/// Model names that only accept their default temperature.
pub fn model_rejects_temperature(model: &str) -> bool {
    let model = model.to_lowercase();
    ["o1", "o3", "o4", "gpt-5"]
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// Document download and scan settings
#[derive(Clone, Debug)]
pub struct DocumentSettings {
    pub url_allowlist: Option<Vec<String>>,
    pub allow_private_urls: bool,
    pub max_document_size_bytes: usize,
    pub download_timeout_secs: u64,
    pub scan_stale_after_secs: i64,
}

/// KYC vendor settings
#[derive(Clone, Debug)]
pub struct KycSettings {
    pub shared_secret: Option<String>,
    pub api_key: Option<String>,
    pub base_url: String,
    pub require_signature: bool,
    pub media_timeout_secs: u64,
}

/// Outbox delivery settings
#[derive(Clone, Debug)]
pub struct OutboxSettings {
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
}

/// Verification service configuration
#[derive(Clone, Debug)]
pub struct VerificationConfig {
    pub base: BaseConfig,
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub model: ModelSettings,
    pub documents: DocumentSettings,
    pub kyc: KycSettings,
    pub outbox: OutboxSettings,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<VerificationConfig>);

impl Config {
    fn as_verification(&self) -> &VerificationConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Ok(Config(Box::new(VerificationConfig::from_lookup(|key| {
            env::var(key).ok()
        })?)))
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.as_verification().base.environment)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_verification().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.as_verification().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_verification().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_verification().base.environment
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.as_verification().base.request_timeout_secs
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.as_verification().base.max_request_body_bytes
    }

    pub fn database_url(&self) -> &str {
        &self.as_verification().base.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.as_verification().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.as_verification().base.db_timeout_seconds
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_verification().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_verification().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_verification().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_verification().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_verification().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_verification().local_storage_base_url.as_deref()
    }

    pub fn signed_url_ttl_secs(&self) -> u64 {
        self.as_verification().signed_url_ttl_secs
    }

    pub fn model(&self) -> &ModelSettings {
        &self.as_verification().model
    }

    pub fn documents(&self) -> &DocumentSettings {
        &self.as_verification().documents
    }

    pub fn kyc(&self) -> &KycSettings {
        &self.as_verification().kyc
    }

    pub fn outbox(&self) -> &OutboxSettings {
        &self.as_verification().outbox
    }
}

fn is_production_env(environment: &str) -> bool {
    let environment = environment.to_lowercase();
    environment == "production" || environment == "prod"
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        _ => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn csv_list(value: Option<String>) -> Option<Vec<String>> {
    non_empty(value).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl VerificationConfig {
    /// Build the configuration from a key lookup. `Config::from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins_str = lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        if is_production_env(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let server_port = match lookup("PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            None => SERVER_PORT,
        };

        let base = BaseConfig {
            server_port,
            cors_origins,
            environment,
            request_timeout_secs: parse_or(lookup("REQUEST_TIMEOUT_SECS"), REQUEST_TIMEOUT_SECS),
            max_request_body_bytes: parse_or(lookup("MAX_REQUEST_BODY_MB"), MAX_REQUEST_BODY_MB)
                * 1024
                * 1024,
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(lookup("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
        };

        let storage_backend = match non_empty(lookup("STORAGE_BACKEND")) {
            Some(backend) => backend.parse()?,
            None => StorageBackend::Local,
        };

        let model_name = non_empty(lookup("LLM_MODEL")).unwrap_or_else(|| DEFAULT_MODEL.into());
        let model = ModelSettings {
            api_key: non_empty(lookup("LLM_API_KEY")),
            fallback_api_key: non_empty(lookup("LLM_FALLBACK_API_KEY")),
            base_url: non_empty(lookup("LLM_API_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            omit_temperature: parse_flag(
                lookup("LLM_OMIT_TEMPERATURE"),
                model_rejects_temperature(&model_name),
            ),
            model: model_name,
            max_completion_tokens: parse_or(
                lookup("LLM_MAX_COMPLETION_TOKENS"),
                MAX_COMPLETION_TOKENS,
            ),
            temperature: parse_or(lookup("LLM_TEMPERATURE"), MODEL_TEMPERATURE),
            timeout_secs: parse_or(lookup("LLM_TIMEOUT_SECS"), MODEL_TIMEOUT_SECS),
        };

        let documents = DocumentSettings {
            url_allowlist: csv_list(lookup("DOCUMENT_URL_ALLOWLIST")),
            allow_private_urls: parse_flag(lookup("DOCUMENT_URL_ALLOW_PRIVATE"), false),
            max_document_size_bytes: parse_or(
                lookup("MAX_DOCUMENT_SIZE_MB"),
                MAX_DOCUMENT_SIZE_MB,
            ) * 1024
                * 1024,
            download_timeout_secs: parse_or(
                lookup("DOCUMENT_DOWNLOAD_TIMEOUT_SECS"),
                DOCUMENT_DOWNLOAD_TIMEOUT_SECS,
            ),
            scan_stale_after_secs: parse_or(lookup("SCAN_STALE_AFTER_SECS"), SCAN_STALE_AFTER_SECS),
        };

        let kyc = KycSettings {
            shared_secret: non_empty(lookup("KYC_SHARED_SECRET")),
            api_key: non_empty(lookup("KYC_API_KEY")),
            base_url: non_empty(lookup("KYC_API_BASE_URL"))
                .unwrap_or_else(|| DEFAULT_KYC_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            require_signature: parse_flag(lookup("KYC_WEBHOOK_REQUIRE_SIGNATURE"), false),
            media_timeout_secs: parse_or(lookup("KYC_MEDIA_TIMEOUT_SECS"), KYC_MEDIA_TIMEOUT_SECS),
        };

        let outbox = OutboxSettings {
            poll_interval_secs: parse_or(
                lookup("OUTBOX_POLL_INTERVAL_SECS"),
                OUTBOX_POLL_INTERVAL_SECS,
            ),
            batch_size: parse_or(lookup("OUTBOX_BATCH_SIZE"), OUTBOX_BATCH_SIZE),
            max_attempts: parse_or(lookup("OUTBOX_MAX_ATTEMPTS"), OUTBOX_MAX_ATTEMPTS),
        };

        Ok(VerificationConfig {
            base,
            storage_backend,
            s3_bucket: non_empty(lookup("S3_BUCKET")),
            s3_region: non_empty(lookup("S3_REGION")).or_else(|| non_empty(lookup("AWS_REGION"))),
            s3_endpoint: non_empty(lookup("S3_ENDPOINT")),
            local_storage_path: non_empty(lookup("LOCAL_STORAGE_PATH")),
            local_storage_base_url: non_empty(lookup("LOCAL_STORAGE_BASE_URL")),
            signed_url_ttl_secs: parse_or(lookup("SIGNED_URL_TTL_SECS"), SIGNED_URL_TTL_SECS),
            model,
            documents,
            kyc,
            outbox,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        let url = &self.base.database_url;
        if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.kyc.require_signature && self.kyc.shared_secret.is_none() {
            return Err(anyhow::anyhow!(
                "KYC_WEBHOOK_REQUIRE_SIGNATURE=true requires KYC_SHARED_SECRET to be set"
            ));
        }

        if self.outbox.max_attempts < 1 {
            return Err(anyhow::anyhow!("OUTBOX_MAX_ATTEMPTS must be at least 1"));
        }

        Ok(())
    }
}
