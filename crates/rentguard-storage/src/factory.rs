use crate::{Storage, StorageBackend, StorageError, StorageResult};
use rentguard_core::Config;
use std::sync::Arc;

fn required(value: Option<&str>, name: &str) -> StorageResult<String> {
    value
        .map(String::from)
        .ok_or_else(|| StorageError::Config(format!("{} must be set for this storage backend", name)))
}

/// Build the backend selected by `STORAGE_BACKEND`.
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    let backend = config.storage_backend();
    let storage: Arc<dyn Storage> = match backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = required(config.s3_bucket(), "S3_BUCKET")?;
            let region = required(config.s3_region(), "S3_REGION or AWS_REGION")?;
            let endpoint = config.s3_endpoint().map(String::from);
            Arc::new(crate::S3Storage::new(bucket, region, endpoint).await?)
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let root = required(config.local_storage_path(), "LOCAL_STORAGE_PATH")?;
            let base_url = required(config.local_storage_base_url(), "LOCAL_STORAGE_BASE_URL")?;
            Arc::new(crate::LocalStorage::new(root, base_url).await?)
        }

        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::Config(format!(
                "storage backend {} is not compiled into this build",
                other
            )))
        }
    };
    Ok(storage)
}
