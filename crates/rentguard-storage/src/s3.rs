//! S3 and S3-compatible object storage through `object_store`.

use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ObjectStoreExt, PutPayload};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    /// Base of public object URLs, without a trailing slash.
    public_base: String,
}

impl S3Storage {
    /// Credentials come from the usual AWS environment variables. A custom
    /// `endpoint_url` switches to path-style URLs for S3-compatible services.
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.as_str())
            .with_bucket_name(bucket.as_str());

        let public_base = match endpoint_url.as_deref() {
            Some(endpoint) => {
                builder = builder
                    .with_endpoint(endpoint)
                    .with_allow_http(endpoint.starts_with("http://"));
                format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
            }
            None => format!("https://{}.s3.{}.amazonaws.com", bucket, region),
        };

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("S3 client for bucket {}: {}", bucket, e)))?;

        Ok(Self {
            store,
            bucket,
            public_base,
        })
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(key))
    }

    fn to_storage_error(&self, key: &str, error: object_store::Error) -> StorageError {
        match error {
            object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(error = %other, bucket = %self.bucket, key = %key, "S3 request failed");
                StorageError::Backend(other.to_string())
            }
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn fetch_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let location = Self::location(key)?;
        let started = Instant::now();

        let object = self
            .store
            .get(&location)
            .await
            .map_err(|e| self.to_storage_error(key, e))?;
        let bytes = object
            .bytes()
            .await
            .map_err(|e| self.to_storage_error(key, e))?;

        tracing::debug!(
            key = %key,
            size_bytes = bytes.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched object from S3"
        );
        Ok(bytes.to_vec())
    }

    async fn store_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let location = Self::location(key)?;
        let size = data.len();
        let started = Instant::now();

        self.store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| self.to_storage_error(key, e))?;

        tracing::info!(
            key = %key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = started.elapsed().as_millis() as u64,
            "Stored object in S3"
        );
        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let location = Self::location(key)?;
        let url = self
            .store
            .signed_url(Method::GET, &location, ttl)
            .await
            .map_err(|e| self.to_storage_error(key, e))?;
        Ok(url.to_string())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
