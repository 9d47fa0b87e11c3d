//! In-memory implementation of every store trait, for tests.
//!
//! All tables live behind one mutex so `commit_decision` is atomic the same
//! way the Postgres transaction is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentguard_core::models::{
    normalize_identity_number, BlockedIdentity, Customer, CustomerUpdate,
    CustomerVerificationStatus, DecisionUpdate, IdentityStatus, IdentityVerification,
    InsuranceDocument, NewNotification, NewOutboxEvent, Notification, OutboxEvent, OutboxStatus,
    ScanCompletion, ScanStatus,
};
use rentguard_core::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::store_traits::{
    BlocklistStore, CustomerStore, DocumentStore, IdentityVerificationStore, NotificationStore,
    OutboxStore, UserStore,
};

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, InsuranceDocument>,
    identities: HashMap<String, IdentityVerification>,
    customers: HashMap<Uuid, Customer>,
    blocklist: Vec<BlockedIdentity>,
    admins: Vec<(Uuid, Uuid)>,
    notifications: Vec<(Uuid, Notification)>,
    outbox: Vec<OutboxEvent>,
}

#[derive(Default)]
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    fail_notifications: AtomicBool,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a `pending` document and return its id.
    pub fn insert_document(&self, file_name: &str, mime_type: &str, storage_path: Option<&str>) -> Uuid {
        let now = Utc::now();
        let document = InsuranceDocument {
            id: Uuid::new_v4(),
            tenant_id: None,
            customer_id: None,
            storage_path: storage_path.map(String::from),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            scan_status: ScanStatus::Pending,
            extracted_data: None,
            confidence_score: None,
            validation_score: None,
            scan_errors: Vec::new(),
            scan_started_at: None,
            last_scanned_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = document.id;
        self.lock().documents.insert(id, document);
        id
    }

    pub fn put_document(&self, document: InsuranceDocument) {
        self.lock().documents.insert(document.id, document);
    }

    pub fn document(&self, id: Uuid) -> Option<InsuranceDocument> {
        self.lock().documents.get(&id).cloned()
    }

    pub fn insert_customer(&self, tenant_id: Uuid) -> Uuid {
        let customer = Customer {
            id: Uuid::new_v4(),
            tenant_id,
            identity_verification_status: CustomerVerificationStatus::Pending,
            is_blocked: false,
            blocked_at: None,
            blocked_reason: None,
        };
        let id = customer.id;
        self.lock().customers.insert(id, customer);
        id
    }

    pub fn customer(&self, id: Uuid) -> Option<Customer> {
        self.lock().customers.get(&id).cloned()
    }

    pub fn insert_blocked_identity(&self, tenant_id: Uuid, identity_number: &str, reason: &str) {
        self.lock().blocklist.push(BlockedIdentity {
            id: Uuid::new_v4(),
            tenant_id,
            identity_number: identity_number.to_string(),
            identity_type: "passport".to_string(),
            reason: Some(reason.to_string()),
            is_active: true,
            created_at: Utc::now(),
        });
    }

    pub fn insert_admin(&self, tenant_id: Uuid) -> Uuid {
        let user_id = Uuid::new_v4();
        self.lock().admins.push((tenant_id, user_id));
        user_id
    }

    pub fn identity(&self, session_id: &str) -> Option<IdentityVerification> {
        self.lock().identities.get(session_id).cloned()
    }

    pub fn identity_count(&self) -> usize {
        self.lock().identities.len()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock()
            .notifications
            .iter()
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.lock().outbox.clone()
    }

    /// Make the next notification inserts fail, to exercise outbox retries.
    pub fn set_fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    /// Make every pending outbox event due now.
    pub fn make_outbox_due(&self) {
        let now = Utc::now();
        for event in self.lock().outbox.iter_mut() {
            if event.status == OutboxStatus::Pending {
                event.next_attempt_at = now;
            }
        }
    }
}

fn empty_identity(session_id: &str, now: DateTime<Utc>) -> IdentityVerification {
    IdentityVerification {
        id: Uuid::new_v4(),
        tenant_id: None,
        customer_id: None,
        session_id: session_id.to_string(),
        status: IdentityStatus::Pending,
        review_status: None,
        review_result: None,
        rejection_reason: None,
        document_type: None,
        document_number: None,
        document_country: None,
        document_expiry_date: None,
        first_name: None,
        last_name: None,
        date_of_birth: None,
        document_front_url: None,
        document_back_url: None,
        face_url: None,
        media_fetched_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn keep_or_replace(slot: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *slot = value.clone();
    }
}

#[async_trait]
impl DocumentStore for InMemoryDatabase {
    async fn get_document(&self, id: Uuid) -> Result<Option<InsuranceDocument>, AppError> {
        Ok(self.lock().documents.get(&id).cloned())
    }

    async fn begin_scan(
        &self,
        id: Uuid,
        expected_status: ScanStatus,
        expected_started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<InsuranceDocument>, AppError> {
        let mut tables = self.lock();
        let Some(document) = tables.documents.get_mut(&id) else {
            return Ok(None);
        };
        if document.scan_status != expected_status
            || document.scan_started_at != expected_started_at
        {
            return Ok(None);
        }
        let now = Utc::now();
        document.scan_status = ScanStatus::Processing;
        document.scan_started_at = Some(now);
        document.scan_errors.clear();
        document.updated_at = now;
        Ok(Some(document.clone()))
    }

    async fn finish_scan(
        &self,
        id: Uuid,
        cycle_started_at: DateTime<Utc>,
        completion: &ScanCompletion,
    ) -> Result<bool, AppError> {
        let mut tables = self.lock();
        let Some(document) = tables.documents.get_mut(&id) else {
            return Ok(false);
        };
        if document.scan_status != ScanStatus::Processing
            || document.scan_started_at != Some(cycle_started_at)
        {
            return Ok(false);
        }
        let now = Utc::now();
        let (confidence, validation) = completion.scores();
        document.scan_status = completion.status();
        document.extracted_data = Some(completion.extracted_data());
        document.confidence_score = confidence;
        document.validation_score = validation;
        document.scan_errors = completion.scan_errors();
        document.last_scanned_at = Some(now);
        document.updated_at = now;
        Ok(true)
    }
}

#[async_trait]
impl IdentityVerificationStore for InMemoryDatabase {
    async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<IdentityVerification>, AppError> {
        Ok(self.lock().identities.get(session_id).cloned())
    }

    async fn mark_submitted(
        &self,
        session_id: &str,
        tenant_id: Option<Uuid>,
        customer_id: Option<Uuid>,
    ) -> Result<IdentityVerification, AppError> {
        let now = Utc::now();
        let mut tables = self.lock();
        let record = tables
            .identities
            .entry(session_id.to_string())
            .or_insert_with(|| empty_identity(session_id, now));
        if tenant_id.is_some() {
            record.tenant_id = tenant_id;
        }
        if customer_id.is_some() {
            record.customer_id = customer_id;
        }
        record.status = IdentityStatus::Pending;
        record.review_status = Some("submitted".to_string());
        record.review_result = None;
        record.rejection_reason = None;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn commit_decision(
        &self,
        session_id: &str,
        update: &DecisionUpdate,
        customer: Option<&CustomerUpdate>,
        events: &[NewOutboxEvent],
    ) -> Result<(IdentityVerification, Vec<OutboxEvent>), AppError> {
        let now = Utc::now();
        let mut tables = self.lock();

        if let Some(change) = customer {
            if !tables.customers.contains_key(&change.customer_id) {
                tracing::debug!(customer_id = %change.customer_id, "Customer not found; update skipped");
            }
        }

        let record = tables
            .identities
            .entry(session_id.to_string())
            .or_insert_with(|| empty_identity(session_id, now));
        if update.tenant_id.is_some() {
            record.tenant_id = update.tenant_id;
        }
        if update.customer_id.is_some() {
            record.customer_id = update.customer_id;
        }
        record.status = IdentityStatus::Completed;
        keep_or_replace(&mut record.review_status, &update.review_status);
        record.review_result = update.review_result;
        record.rejection_reason = update.rejection_reason.clone();
        keep_or_replace(&mut record.document_type, &update.document_type);
        keep_or_replace(&mut record.document_number, &update.document_number);
        keep_or_replace(&mut record.document_country, &update.document_country);
        keep_or_replace(&mut record.document_expiry_date, &update.document_expiry_date);
        keep_or_replace(&mut record.first_name, &update.first_name);
        keep_or_replace(&mut record.last_name, &update.last_name);
        keep_or_replace(&mut record.date_of_birth, &update.date_of_birth);
        keep_or_replace(&mut record.document_front_url, &update.media.document_front_url);
        keep_or_replace(&mut record.document_back_url, &update.media.document_back_url);
        keep_or_replace(&mut record.face_url, &update.media.face_url);
        if !update.media.is_empty() {
            record.media_fetched_at = Some(now);
        }
        record.updated_at = now;
        let record = record.clone();

        if let Some(change) = customer {
            if let Some(row) = tables.customers.get_mut(&change.customer_id) {
                row.identity_verification_status = change.verification_status;
                if let Some(block) = &change.block {
                    row.is_blocked = true;
                    row.blocked_at = Some(block.blocked_at);
                    row.blocked_reason = Some(block.reason.clone());
                }
            }
        }

        let stored: Vec<OutboxEvent> = events
            .iter()
            .map(|event| OutboxEvent {
                id: Uuid::new_v4(),
                tenant_id: event.tenant_id,
                payload: event.payload.clone(),
                status: OutboxStatus::Pending,
                attempts: 0,
                next_attempt_at: now,
                last_error: None,
                created_at: now,
                delivered_at: None,
            })
            .collect();
        tables.outbox.extend(stored.iter().cloned());

        Ok((record, stored))
    }
}

#[async_trait]
impl CustomerStore for InMemoryDatabase {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        Ok(self.lock().customers.get(&id).cloned())
    }
}

#[async_trait]
impl BlocklistStore for InMemoryDatabase {
    async fn find_active_block(
        &self,
        tenant_id: Uuid,
        identity_number: &str,
    ) -> Result<Option<BlockedIdentity>, AppError> {
        Ok(self
            .lock()
            .blocklist
            .iter()
            .find(|entry| {
                entry.tenant_id == tenant_id
                    && entry.is_active
                    && normalize_identity_number(&entry.identity_number) == identity_number
            })
            .cloned())
    }
}

#[async_trait]
impl UserStore for InMemoryDatabase {
    async fn list_admin_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        Ok(self
            .lock()
            .admins
            .iter()
            .filter(|(tenant, _)| *tenant == tenant_id)
            .map(|(_, user)| *user)
            .collect())
    }
}

#[async_trait]
impl NotificationStore for InMemoryDatabase {
    async fn create_notifications(
        &self,
        source_event_id: Uuid,
        notifications: &[NewNotification],
    ) -> Result<u64, AppError> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(AppError::Internal("notifications table unavailable".to_string()));
        }

        let mut tables = self.lock();
        let existing: HashSet<(Uuid, Uuid)> = tables
            .notifications
            .iter()
            .map(|(source, n)| (*source, n.user_id))
            .collect();

        let mut inserted = 0;
        for new in notifications {
            if existing.contains(&(source_event_id, new.user_id)) {
                continue;
            }
            tables.notifications.push((
                source_event_id,
                Notification {
                    id: Uuid::new_v4(),
                    tenant_id: new.tenant_id,
                    user_id: new.user_id,
                    kind: new.kind.clone(),
                    title: new.title.clone(),
                    message: new.message.clone(),
                    metadata: new.metadata.clone(),
                    is_read: false,
                    created_at: Utc::now(),
                },
            ));
            inserted += 1;
        }

        Ok(inserted)
    }
}

#[async_trait]
impl OutboxStore for InMemoryDatabase {
    async fn get_events(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, AppError> {
        Ok(self
            .lock()
            .outbox
            .iter()
            .filter(|event| ids.contains(&event.id) && event.status == OutboxStatus::Pending)
            .cloned()
            .collect())
    }

    async fn get_due_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        let now = Utc::now();
        Ok(self
            .lock()
            .outbox
            .iter()
            .filter(|event| event.status == OutboxStatus::Pending && event.next_attempt_at <= now)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.lock();
        if let Some(event) = tables.outbox.iter_mut().find(|event| event.id == id) {
            event.status = OutboxStatus::Delivered;
            event.attempts += 1;
            event.delivered_at = Some(Utc::now());
            event.last_error = None;
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<(), AppError> {
        let mut tables = self.lock();
        if let Some(event) = tables.outbox.iter_mut().find(|event| event.id == id) {
            event.attempts = attempts;
            event.last_error = Some(error.to_string());
            match next_attempt_at {
                Some(at) => event.next_attempt_at = at,
                None => event.status = OutboxStatus::Dead,
            }
        }
        Ok(())
    }
}
