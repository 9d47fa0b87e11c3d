use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Delivery state of a queued side effect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "outbox_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Dead,
}

impl Display for OutboxStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutboxStatus::Pending => write!(f, "pending"),
            OutboxStatus::Delivered => write!(f, "delivered"),
            OutboxStatus::Dead => write!(f, "dead"),
        }
    }
}

/// Side effects produced by a verification decision, delivered after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxPayload {
    /// A verified session matched the tenant blocklist; every admin is told.
    /// The customer may not be linked to the session yet.
    IdentityBlocked {
        customer_id: Option<Uuid>,
        session_id: String,
        document_number: String,
        reason: String,
    },
}

impl OutboxPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboxPayload::IdentityBlocked { .. } => "identity_blocked",
        }
    }
}

/// Event waiting in (or delivered from) the outbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct OutboxEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub payload: OutboxPayload,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Event produced by the decision logic, not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxEvent {
    pub tenant_id: Uuid,
    pub payload: OutboxPayload,
}
