//! Transactional outbox for side effects of identity decisions.
//!
//! Events are written in the same transaction as the decision, delivered
//! right after commit, and retried in the background until they succeed or
//! run out of attempts.

pub mod dispatcher;
pub mod retry;

pub use dispatcher::{DeliveryOutcome, DeliveryStats, OutboxDispatcher};
pub use retry::{OutboxRetryService, OutboxRetryServiceConfig};
