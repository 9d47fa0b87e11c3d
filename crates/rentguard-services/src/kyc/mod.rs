//! Identity verification callbacks from the KYC vendor.

pub mod decision;
pub mod media;
pub mod payload;
pub mod service;
pub mod signature;

pub use decision::{plan_decision, DecisionContext, DecisionPlan};
pub use media::{MediaRetriever, MediaSource};
pub use payload::{KycEvent, KycWebhookPayload, PayloadError};
pub use service::{KycWebhookService, WebhookOutcome};
pub use signature::{sign, verify_signature, LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER};
