//! Store traits consumed by the pipeline services
//!
//! Each trait is the narrow slice of a repository a service needs. The Postgres
//! repositories implement them directly; `InMemoryDatabase` implements all of
//! them for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentguard_core::models::{
    BlockedIdentity, Customer, CustomerUpdate, DecisionUpdate, IdentityVerification,
    InsuranceDocument, NewNotification, NewOutboxEvent, OutboxEvent, ScanCompletion, ScanStatus,
};
use rentguard_core::AppError;
use uuid::Uuid;

use crate::db::{
    BlocklistRepository, CustomerRepository, DocumentRepository, IdentityVerificationRepository,
    NotificationRepository, OutboxRepository, UserRepository,
};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, id: Uuid) -> Result<Option<InsuranceDocument>, AppError>;

    /// Compare-and-set into `processing`. Succeeds only while the record still
    /// has `expected_status` and `expected_started_at`; returns `None` when
    /// another scan got there first.
    async fn begin_scan(
        &self,
        id: Uuid,
        expected_status: ScanStatus,
        expected_started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<InsuranceDocument>, AppError>;

    /// Terminal write for the processing cycle that started at `cycle_started_at`.
    /// Returns `false` when the record is no longer `processing` or another
    /// scan has since reclaimed it.
    async fn finish_scan(
        &self,
        id: Uuid,
        cycle_started_at: DateTime<Utc>,
        completion: &ScanCompletion,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait IdentityVerificationStore: Send + Sync {
    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<IdentityVerification>, AppError>;

    /// Create or reopen the session record as `pending`.
    async fn mark_submitted(
        &self,
        session_id: &str,
        tenant_id: Option<Uuid>,
        customer_id: Option<Uuid>,
    ) -> Result<IdentityVerification, AppError>;

    /// Atomically apply a decision: upsert the session record, update the
    /// customer, and queue the side-effect events. Returns the stored events.
    async fn commit_decision(
        &self,
        session_id: &str,
        update: &DecisionUpdate,
        customer: Option<&CustomerUpdate>,
        events: &[NewOutboxEvent],
    ) -> Result<(IdentityVerification, Vec<OutboxEvent>), AppError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError>;
}

#[async_trait]
pub trait BlocklistStore: Send + Sync {
    /// Active entry in the tenant's blocklist for an already-normalized number.
    async fn find_active_block(
        &self,
        tenant_id: Uuid,
        identity_number: &str,
    ) -> Result<Option<BlockedIdentity>, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Users with an admin role in the tenant.
    async fn list_admin_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, AppError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert notifications, skipping any already created for the same
    /// event and user. Returns the number inserted.
    async fn create_notifications(
        &self,
        source_event_id: Uuid,
        notifications: &[NewNotification],
    ) -> Result<u64, AppError>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn get_events(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, AppError>;

    /// Pending events whose next attempt is due.
    async fn get_due_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError>;

    async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError>;

    /// Record a failed attempt. `next_attempt_at = None` dead-letters the event.
    async fn record_failure(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<(), AppError>;
}

// Implementations for concrete repository types

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn get_document(&self, id: Uuid) -> Result<Option<InsuranceDocument>, AppError> {
        self.get_document(id).await
    }

    async fn begin_scan(
        &self,
        id: Uuid,
        expected_status: ScanStatus,
        expected_started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<InsuranceDocument>, AppError> {
        self.begin_scan(id, expected_status, expected_started_at)
            .await
    }

    async fn finish_scan(
        &self,
        id: Uuid,
        cycle_started_at: DateTime<Utc>,
        completion: &ScanCompletion,
    ) -> Result<bool, AppError> {
        self.finish_scan(id, cycle_started_at, completion).await
    }
}

#[async_trait]
impl IdentityVerificationStore for IdentityVerificationRepository {
    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<IdentityVerification>, AppError> {
        self.find_by_session(session_id).await
    }

    async fn mark_submitted(
        &self,
        session_id: &str,
        tenant_id: Option<Uuid>,
        customer_id: Option<Uuid>,
    ) -> Result<IdentityVerification, AppError> {
        self.mark_submitted(session_id, tenant_id, customer_id)
            .await
    }

    async fn commit_decision(
        &self,
        session_id: &str,
        update: &DecisionUpdate,
        customer: Option<&CustomerUpdate>,
        events: &[NewOutboxEvent],
    ) -> Result<(IdentityVerification, Vec<OutboxEvent>), AppError> {
        self.commit_decision(session_id, update, customer, events)
            .await
    }
}

#[async_trait]
impl CustomerStore for CustomerRepository {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        self.get_customer(id).await
    }
}

#[async_trait]
impl BlocklistStore for BlocklistRepository {
    async fn find_active_block(
        &self,
        tenant_id: Uuid,
        identity_number: &str,
    ) -> Result<Option<BlockedIdentity>, AppError> {
        self.find_active_block(tenant_id, identity_number).await
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn list_admin_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        self.list_admin_ids(tenant_id).await
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn create_notifications(
        &self,
        source_event_id: Uuid,
        notifications: &[NewNotification],
    ) -> Result<u64, AppError> {
        self.create_notifications(source_event_id, notifications)
            .await
    }
}

#[async_trait]
impl OutboxStore for OutboxRepository {
    async fn get_events(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, AppError> {
        self.get_events(ids).await
    }

    async fn get_due_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        self.get_due_events(limit).await
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError> {
        self.mark_delivered(id).await
    }

    async fn record_failure(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<(), AppError> {
        self.record_failure(id, attempts, next_attempt_at, error)
            .await
    }
}
