//! RentGuard Storage Library
//!
//! Object storage abstraction used by the verification pipeline: uploaded
//! insurance documents are read from it and KYC media is archived into it.
//!
//! # Storage key format
//!
//! - **Identity media**: `identity-verifications/{session_id}/{context}.{ext}`
//! - **Insurance documents**: written by the booking portal; read by key as stored
//!   on the document record.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{extension_for_content_type, identity_media_key, validate_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use rentguard_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
