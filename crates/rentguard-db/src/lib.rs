//! RentGuard Database Layer
//!
//! Postgres repositories for the verification pipeline, plus the store traits
//! the services depend on so they can run against in-memory doubles in tests.

pub mod db;
#[cfg(any(test, feature = "test-helpers"))]
pub mod in_memory;
pub mod store_traits;

pub use db::{
    calculate_next_retry_time, BlocklistRepository, CustomerRepository, DocumentRepository,
    IdentityVerificationRepository, NotificationRepository, OutboxRepository, UserRepository,
};
pub use db::transaction::TransactionGuard;
#[cfg(any(test, feature = "test-helpers"))]
pub use in_memory::InMemoryDatabase;
pub use store_traits::{
    BlocklistStore, CustomerStore, DocumentStore, IdentityVerificationStore, NotificationStore,
    OutboxStore, UserStore,
};
