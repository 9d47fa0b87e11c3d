//! Postgres repositories
//!
//! One repository per table the pipeline touches. Documents and identity
//! verifications are owned here; customers, users and the blocklist belong to
//! the wider product and are only read or narrowly updated.

pub mod blocklist;
pub mod customers;
pub mod documents;
pub mod identity;
pub mod notifications;
pub mod outbox;
pub mod transaction;
pub mod users;

pub use blocklist::BlocklistRepository;
pub use customers::CustomerRepository;
pub use documents::DocumentRepository;
pub use identity::IdentityVerificationRepository;
pub use notifications::NotificationRepository;
pub use outbox::{calculate_next_retry_time, OutboxRepository};
pub use users::UserRepository;
