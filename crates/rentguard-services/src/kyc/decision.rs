use chrono::{DateTime, Utc};
use rentguard_core::models::{
    BlockMark, BlockedIdentity, CustomerUpdate, CustomerVerificationStatus, DecisionUpdate,
    MediaSet, NewOutboxEvent, OutboxPayload, ReviewResult,
};
use uuid::Uuid;

use super::payload::VendorVerification;

const DEFAULT_BLOCK_REASON: &str = "Identity document is on the blocklist";

/// Everything known about a decision callback once lookups are done.
pub struct DecisionContext<'a> {
    pub session_id: &'a str,
    pub result: ReviewResult,
    pub verification: &'a VendorVerification,
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    /// Set only when the customer row exists.
    pub customer_exists: bool,
    pub media: MediaSet,
    pub block: Option<&'a BlockedIdentity>,
    pub now: DateTime<Utc>,
}

/// Writes that a decision callback results in, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionPlan {
    pub record: DecisionUpdate,
    pub customer: Option<CustomerUpdate>,
    pub events: Vec<NewOutboxEvent>,
}

pub fn plan_decision(ctx: DecisionContext<'_>) -> DecisionPlan {
    let verification = ctx.verification;
    let person = verification.person.clone().unwrap_or_default();
    let document = verification.document.clone().unwrap_or_default();

    let block_reason = ctx.block.map(|block| {
        block
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_BLOCK_REASON)
            .to_string()
    });

    let rejection_reason = match &block_reason {
        Some(reason) => Some(format!("Blocked identity: {}", reason)),
        None => verification.reason.clone(),
    };

    let record = DecisionUpdate {
        tenant_id: ctx.tenant_id,
        customer_id: ctx.customer_id,
        review_status: verification.status.clone(),
        review_result: Some(ctx.result),
        rejection_reason,
        document_type: document.document_type,
        document_number: verification.document_number().map(String::from),
        document_country: document.country,
        document_expiry_date: document.valid_until,
        first_name: person.first_name,
        last_name: person.last_name,
        date_of_birth: person.date_of_birth,
        media: ctx.media,
    };

    let customer = ctx
        .customer_id
        .filter(|_| ctx.customer_exists)
        .map(|customer_id| match &block_reason {
            Some(reason) => CustomerUpdate {
                customer_id,
                verification_status: CustomerVerificationStatus::Rejected,
                block: Some(BlockMark {
                    blocked_at: ctx.now,
                    reason: reason.clone(),
                }),
            },
            None => CustomerUpdate {
                customer_id,
                verification_status: CustomerVerificationStatus::from(ctx.result),
                block: None,
            },
        });

    let events = match (ctx.block, &block_reason) {
        (Some(block), Some(reason)) => vec![NewOutboxEvent {
            tenant_id: block.tenant_id,
            payload: OutboxPayload::IdentityBlocked {
                customer_id: ctx.customer_id,
                session_id: ctx.session_id.to_string(),
                document_number: verification
                    .document_number()
                    .unwrap_or(&block.identity_number)
                    .to_string(),
                reason: reason.clone(),
            },
        }],
        _ => Vec::new(),
    };

    DecisionPlan {
        record,
        customer,
        events,
    }
}
