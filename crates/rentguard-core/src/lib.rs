//! RentGuard Core Library
//!
//! Domain models, status machines, error types and configuration shared by
//! the verification pipeline crates.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{
    BaseConfig, Config, DocumentSettings, KycSettings, ModelSettings, OutboxSettings,
    VerificationConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::transition::InvalidTransition;
pub use storage_types::StorageBackend;
