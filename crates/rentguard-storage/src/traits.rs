//! Object storage interface the pipeline is written against.

use crate::StorageBackend;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Where insurance documents are read from and KYC media is archived to.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a whole object into memory.
    async fn fetch_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Write an object, replacing any previous one under `key`, and return
    /// the URL it can be read from.
    async fn store_object(&self, key: &str, data: Vec<u8>, content_type: &str)
        -> StorageResult<String>;

    /// Time-limited read URL for an object. Backends without signing return
    /// their public URL.
    async fn signed_read_url(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    fn backend_type(&self) -> StorageBackend;
}
