use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::transition::InvalidTransition;

/// Lifecycle of a KYC session record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "identity_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Pending,
    Completed,
}

/// Vendor verdict for a completed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "review_result", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReviewResult {
    Green,
    Red,
    Retry,
}

impl ReviewResult {
    /// Vendor decision codes: 9001 approved, 9102 declined, 9103 resubmission requested.
    pub fn from_vendor_code(code: i64) -> Option<Self> {
        match code {
            9001 => Some(ReviewResult::Green),
            9102 => Some(ReviewResult::Red),
            9103 => Some(ReviewResult::Retry),
            _ => None,
        }
    }

    /// Whether the vendor holds media worth archiving for this verdict.
    pub fn has_media(self) -> bool {
        matches!(self, ReviewResult::Green | ReviewResult::Red)
    }
}

impl Display for ReviewResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ReviewResult::Green => write!(f, "GREEN"),
            ReviewResult::Red => write!(f, "RED"),
            ReviewResult::Retry => write!(f, "RETRY"),
        }
    }
}

impl FromStr for ReviewResult {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GREEN" => Ok(ReviewResult::Green),
            "RED" => Ok(ReviewResult::Red),
            "RETRY" => Ok(ReviewResult::Retry),
            _ => Err(anyhow::anyhow!("Invalid review result: {}", s)),
        }
    }
}

/// Combined status and result of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    Pending,
    Completed(ReviewResult),
}

/// Vendor callbacks that move a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorEvent {
    Submitted,
    Decision(ReviewResult),
}

impl Display for VerificationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VerificationState::Pending => write!(f, "pending"),
            VerificationState::Completed(result) => write!(f, "completed({})", result),
        }
    }
}

impl Display for VendorEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VendorEvent::Submitted => write!(f, "submitted"),
            VendorEvent::Decision(result) => write!(f, "decision({})", result),
        }
    }
}

impl VerificationState {
    /// Apply a vendor event to the current state (`None` when no record exists yet).
    ///
    /// A resubmission after RETRY reopens the session; a submission after a
    /// final GREEN/RED verdict is rejected. Decisions always apply because the
    /// vendor may re-decide a session.
    pub fn apply(
        current: Option<VerificationState>,
        event: VendorEvent,
    ) -> Result<VerificationState, InvalidTransition> {
        match (current, event) {
            (None | Some(VerificationState::Pending), VendorEvent::Submitted) => {
                Ok(VerificationState::Pending)
            }
            (Some(VerificationState::Completed(ReviewResult::Retry)), VendorEvent::Submitted) => {
                Ok(VerificationState::Pending)
            }
            (Some(state @ VerificationState::Completed(_)), VendorEvent::Submitted) => {
                Err(InvalidTransition::new(state, event))
            }
            (_, VendorEvent::Decision(result)) => Ok(VerificationState::Completed(result)),
        }
    }

    pub fn status(self) -> IdentityStatus {
        match self {
            VerificationState::Pending => IdentityStatus::Pending,
            VerificationState::Completed(_) => IdentityStatus::Completed,
        }
    }

    pub fn review_result(self) -> Option<ReviewResult> {
        match self {
            VerificationState::Pending => None,
            VerificationState::Completed(result) => Some(result),
        }
    }
}

/// One KYC session as tracked locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct IdentityVerification {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub session_id: String,
    pub status: IdentityStatus,
    pub review_status: Option<String>,
    pub review_result: Option<ReviewResult>,
    pub rejection_reason: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub document_country: Option<String>,
    pub document_expiry_date: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub document_front_url: Option<String>,
    pub document_back_url: Option<String>,
    pub face_url: Option<String>,
    pub media_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdentityVerification {
    /// Current state, or `None` for a record whose columns disagree.
    pub fn state(&self) -> Option<VerificationState> {
        match (self.status, self.review_result) {
            (IdentityStatus::Pending, _) => Some(VerificationState::Pending),
            (IdentityStatus::Completed, Some(result)) => {
                Some(VerificationState::Completed(result))
            }
            (IdentityStatus::Completed, None) => None,
        }
    }
}

/// Columns written when a decision callback is applied. `None` leaves the
/// stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionUpdate {
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub review_status: Option<String>,
    pub review_result: Option<ReviewResult>,
    pub rejection_reason: Option<String>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
    pub document_country: Option<String>,
    pub document_expiry_date: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub media: MediaSet,
}

/// Image slots archived from the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaContext {
    DocumentFront,
    DocumentBack,
    Face,
}

impl MediaContext {
    pub const ALL: [MediaContext; 3] = [
        MediaContext::DocumentFront,
        MediaContext::DocumentBack,
        MediaContext::Face,
    ];

    /// Context label used by the vendor media API.
    pub fn vendor_label(self) -> &'static str {
        match self {
            MediaContext::DocumentFront => "document-front",
            MediaContext::DocumentBack => "document-back",
            MediaContext::Face => "face",
        }
    }

    pub fn from_vendor_label(label: &str) -> Option<Self> {
        match label {
            "document-front" => Some(MediaContext::DocumentFront),
            "document-back" => Some(MediaContext::DocumentBack),
            "face" => Some(MediaContext::Face),
            _ => None,
        }
    }
}

/// Archived media URLs for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaSet {
    pub document_front_url: Option<String>,
    pub document_back_url: Option<String>,
    pub face_url: Option<String>,
}

impl MediaSet {
    pub fn set(&mut self, context: MediaContext, url: String) {
        match context {
            MediaContext::DocumentFront => self.document_front_url = Some(url),
            MediaContext::DocumentBack => self.document_back_url = Some(url),
            MediaContext::Face => self.face_url = Some(url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document_front_url.is_none()
            && self.document_back_url.is_none()
            && self.face_url.is_none()
    }
}
