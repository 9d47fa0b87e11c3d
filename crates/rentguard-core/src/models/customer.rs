use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::identity::ReviewResult;

/// Identity verification status shown on the customer profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "customer_verification_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CustomerVerificationStatus {
    Pending,
    Verified,
    Rejected,
    RetryRequired,
}

impl From<ReviewResult> for CustomerVerificationStatus {
    fn from(result: ReviewResult) -> Self {
        match result {
            ReviewResult::Green => CustomerVerificationStatus::Verified,
            ReviewResult::Red => CustomerVerificationStatus::Rejected,
            ReviewResult::Retry => CustomerVerificationStatus::RetryRequired,
        }
    }
}

impl Display for CustomerVerificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CustomerVerificationStatus::Pending => write!(f, "pending"),
            CustomerVerificationStatus::Verified => write!(f, "verified"),
            CustomerVerificationStatus::Rejected => write!(f, "rejected"),
            CustomerVerificationStatus::RetryRequired => write!(f, "retry_required"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub identity_verification_status: CustomerVerificationStatus,
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_reason: Option<String>,
}

/// Change applied to a customer after a vendor decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerUpdate {
    pub customer_id: Uuid,
    pub verification_status: CustomerVerificationStatus,
    pub block: Option<BlockMark>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMark {
    pub blocked_at: DateTime<Utc>,
    pub reason: String,
}

/// Tenant-scoped blocklist entry. Read-only for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct BlockedIdentity {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub identity_number: String,
    pub identity_type: String,
    pub reason: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Canonical form used when matching identity numbers against the blocklist.
pub fn normalize_identity_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_result_maps_to_customer_status() {
        assert_eq!(
            CustomerVerificationStatus::from(ReviewResult::Green),
            CustomerVerificationStatus::Verified
        );
        assert_eq!(
            CustomerVerificationStatus::from(ReviewResult::Red),
            CustomerVerificationStatus::Rejected
        );
        assert_eq!(
            CustomerVerificationStatus::from(ReviewResult::Retry),
            CustomerVerificationStatus::RetryRequired
        );
    }

    #[test]
    fn test_normalize_identity_number() {
        assert_eq!(normalize_identity_number(" ab 12345 "), "AB12345");
        assert_eq!(normalize_identity_number("X9"), "X9");
    }
}
