use chrono::Utc;
use rentguard_core::models::{
    normalize_identity_number, Customer, ReviewResult, VendorEvent, VerificationState,
};
use rentguard_core::AppError;
use rentguard_db::{BlocklistStore, CustomerStore, IdentityVerificationStore};
use std::sync::Arc;
use uuid::Uuid;

use super::decision::{plan_decision, DecisionContext};
use super::media::MediaSource;
use super::payload::{KycEvent, KycWebhookPayload, VendorVerification};
use super::signature::verify_signature;
use crate::outbox::OutboxDispatcher;

/// What a callback did, for logging and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Started,
    Submitted,
    /// Submission for a session that already has a final verdict.
    IgnoredSubmission,
    Decided {
        result: ReviewResult,
        blocked: bool,
    },
}

pub struct KycWebhookService {
    identities: Arc<dyn IdentityVerificationStore>,
    customers: Arc<dyn CustomerStore>,
    blocklist: Arc<dyn BlocklistStore>,
    media: Arc<dyn MediaSource>,
    dispatcher: Arc<OutboxDispatcher>,
    shared_secret: Option<String>,
}

impl KycWebhookService {
    pub fn new(
        identities: Arc<dyn IdentityVerificationStore>,
        customers: Arc<dyn CustomerStore>,
        blocklist: Arc<dyn BlocklistStore>,
        media: Arc<dyn MediaSource>,
        dispatcher: Arc<OutboxDispatcher>,
        shared_secret: Option<String>,
    ) -> Self {
        Self {
            identities,
            customers,
            blocklist,
            media,
            dispatcher,
            shared_secret: shared_secret.filter(|s| !s.is_empty()),
        }
    }

    fn authenticate(&self, body: &[u8], signature: Option<&str>) -> Result<(), AppError> {
        let Some(secret) = &self.shared_secret else {
            tracing::warn!("KYC webhook secret not configured; accepting unsigned callback");
            return Ok(());
        };

        match signature {
            None => Err(AppError::Unauthorized("Missing webhook signature".to_string())),
            Some(provided) if verify_signature(secret, body, provided) => Ok(()),
            Some(_) => Err(AppError::Unauthorized("Invalid webhook signature".to_string())),
        }
    }

    /// Authenticate and apply one vendor callback.
    ///
    /// Nothing is read or written before the signature check passes.
    #[tracing::instrument(skip_all, fields(body_len = body.len()))]
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, AppError> {
        self.authenticate(body, signature)?;

        let payload: KycWebhookPayload = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;
        let event = payload
            .classify()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        match event {
            KycEvent::Started { session_id } => {
                tracing::info!(session_id = ?session_id, "Verification session started");
                Ok(WebhookOutcome::Started)
            }
            KycEvent::Submitted {
                session_id,
                customer_id,
            } => self.on_submitted(&session_id, customer_id).await,
            KycEvent::Decision {
                session_id,
                result,
                customer_id,
                verification,
            } => {
                self.on_decision(&session_id, result, customer_id, &verification)
                    .await
            }
        }
    }

    async fn lookup_customer(&self, customer_id: Option<Uuid>) -> Result<Option<Customer>, AppError> {
        match customer_id {
            Some(id) => {
                let customer = self.customers.get_customer(id).await?;
                if customer.is_none() {
                    tracing::warn!(customer_id = %id, "vendorData references an unknown customer");
                }
                Ok(customer)
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    async fn on_submitted(
        &self,
        session_id: &str,
        customer_id: Option<Uuid>,
    ) -> Result<WebhookOutcome, AppError> {
        let existing = self.identities.find_by_session(session_id).await?;
        let current = existing.as_ref().and_then(|record| record.state());

        if let Err(e) = VerificationState::apply(current, VendorEvent::Submitted) {
            tracing::warn!(error = %e, "Ignoring submission for a decided session");
            return Ok(WebhookOutcome::IgnoredSubmission);
        }

        let customer = self.lookup_customer(customer_id).await?;
        let tenant_id = existing
            .as_ref()
            .and_then(|record| record.tenant_id)
            .or(customer.as_ref().map(|c| c.tenant_id));

        self.identities
            .mark_submitted(session_id, tenant_id, customer.map(|c| c.id))
            .await?;
        tracing::info!(created = existing.is_none(), "Verification submitted");
        Ok(WebhookOutcome::Submitted)
    }

    #[tracing::instrument(skip(self, verification), fields(session_id = %session_id, result = %result))]
    async fn on_decision(
        &self,
        session_id: &str,
        result: ReviewResult,
        customer_id: Option<Uuid>,
        verification: &VendorVerification,
    ) -> Result<WebhookOutcome, AppError> {
        let existing = self.identities.find_by_session(session_id).await?;
        if existing.is_none() {
            tracing::info!("No record for session; creating one from the decision");
        }

        let current = existing.as_ref().and_then(|record| record.state());
        let next = VerificationState::apply(current, VendorEvent::Decision(result))?;
        tracing::debug!(from = ?current, to = %next, "Applying vendor decision");

        let customer_id = customer_id.or(existing.as_ref().and_then(|record| record.customer_id));
        let customer = self.lookup_customer(customer_id).await?;
        let tenant_id = existing
            .as_ref()
            .and_then(|record| record.tenant_id)
            .or(customer.as_ref().map(|c| c.tenant_id));

        let media = if result.has_media() {
            self.media.retrieve(session_id).await
        } else {
            Default::default()
        };

        let block = match (tenant_id, verification.document_number()) {
            (Some(tenant_id), Some(number)) => {
                self.blocklist
                    .find_active_block(tenant_id, &normalize_identity_number(number))
                    .await?
            }
            _ => None,
        };
        if block.is_some() {
            tracing::warn!(tenant_id = ?tenant_id, "Document number is on the tenant blocklist");
        }

        let plan = plan_decision(DecisionContext {
            session_id,
            result,
            verification,
            tenant_id,
            customer_id,
            customer_exists: customer.is_some(),
            media,
            block: block.as_ref(),
            now: Utc::now(),
        });

        let (_, events) = self
            .identities
            .commit_decision(session_id, &plan.record, plan.customer.as_ref(), &plan.events)
            .await?;

        tracing::info!(
            customer_id = ?customer_id,
            queued_events = events.len(),
            "Vendor decision recorded"
        );

        if !events.is_empty() {
            let ids: Vec<Uuid> = events.iter().map(|event| event.id).collect();
            let stats = self.dispatcher.deliver_now(&ids).await;
            tracing::debug!(delivered = stats.delivered, retrying = stats.retrying, "Post-commit delivery");
        }

        Ok(WebhookOutcome::Decided {
            result,
            blocked: block.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kyc::signature::sign;
    use async_trait::async_trait;
    use rentguard_core::models::{
        CustomerVerificationStatus, IdentityStatus, MediaContext, MediaSet, OutboxStatus,
    };
    use rentguard_db::InMemoryDatabase;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubMedia {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaSource for StubMedia {
        async fn retrieve(&self, session_id: &str) -> MediaSet {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut media = MediaSet::default();
            media.set(
                MediaContext::Face,
                format!("http://files.test/identity-verifications/{}/face.jpg", session_id),
            );
            media
        }
    }

    struct Harness {
        db: Arc<InMemoryDatabase>,
        media: Arc<StubMedia>,
        service: KycWebhookService,
    }

    fn harness(secret: Option<&str>) -> Harness {
        let db = Arc::new(InMemoryDatabase::new());
        let media = Arc::new(StubMedia::default());
        let dispatcher = Arc::new(OutboxDispatcher::new(db.clone(), db.clone(), db.clone(), 5));
        let service = KycWebhookService::new(
            db.clone(),
            db.clone(),
            db.clone(),
            media.clone(),
            dispatcher,
            secret.map(String::from),
        );
        Harness { db, media, service }
    }

    fn decision_body(session: &str, code: i64, customer: Uuid, number: &str) -> Vec<u8> {
        json!({
            "status": "success",
            "verification": {
                "id": session,
                "code": code,
                "status": "approved",
                "vendorData": customer.to_string(),
                "person": {"firstName": "Jane", "lastName": "Driver", "dateOfBirth": "1990-04-02"},
                "document": {"number": number, "type": "PASSPORT", "country": "US", "validUntil": "2031-01-01"}
            }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_green_decision_verifies_customer() {
        let h = harness(None);
        let tenant = Uuid::new_v4();
        let customer = h.db.insert_customer(tenant);
        let body = decision_body("sess-1", 9001, customer, "P1234567");

        let outcome = h.service.handle(&body, None).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Decided {
                result: ReviewResult::Green,
                blocked: false
            }
        );

        let record = h.db.identity("sess-1").unwrap();
        assert_eq!(record.status, IdentityStatus::Completed);
        assert_eq!(record.review_result, Some(ReviewResult::Green));
        assert_eq!(record.tenant_id, Some(tenant));
        assert_eq!(record.customer_id, Some(customer));
        assert_eq!(record.document_number.as_deref(), Some("P1234567"));
        assert!(record.face_url.is_some());
        assert!(record.media_fetched_at.is_some());

        let row = h.db.customer(customer).unwrap();
        assert_eq!(row.identity_verification_status, CustomerVerificationStatus::Verified);
        assert!(!row.is_blocked);
        assert!(h.db.outbox_events().is_empty());
    }

    #[tokio::test]
    async fn test_blocklisted_document_rejects_and_notifies_admins() {
        let h = harness(None);
        let tenant = Uuid::new_v4();
        let customer = h.db.insert_customer(tenant);
        h.db.insert_blocked_identity(tenant, "p123 4567", "Stolen vehicle");
        let admin_a = h.db.insert_admin(tenant);
        let admin_b = h.db.insert_admin(tenant);
        let body = decision_body("sess-2", 9001, customer, "P1234567");

        let outcome = h.service.handle(&body, None).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Decided {
                result: ReviewResult::Green,
                blocked: true
            }
        );

        let row = h.db.customer(customer).unwrap();
        assert_eq!(row.identity_verification_status, CustomerVerificationStatus::Rejected);
        assert!(row.is_blocked);
        assert!(row.blocked_at.is_some());
        assert_eq!(row.blocked_reason.as_deref(), Some("Stolen vehicle"));

        let mut notified: Vec<Uuid> = h.db.notifications().iter().map(|n| n.user_id).collect();
        notified.sort();
        let mut admins = vec![admin_a, admin_b];
        admins.sort();
        assert_eq!(notified, admins);
        assert_eq!(h.db.outbox_events()[0].status, OutboxStatus::Delivered);
    }

    #[tokio::test]
    async fn test_blocklist_is_tenant_scoped() {
        let h = harness(None);
        let tenant = Uuid::new_v4();
        let customer = h.db.insert_customer(tenant);
        h.db.insert_blocked_identity(Uuid::new_v4(), "P1234567", "Other tenant");
        let body = decision_body("sess-3", 9001, customer, "P1234567");

        h.service.handle(&body, None).await.unwrap();
        let row = h.db.customer(customer).unwrap();
        assert_eq!(row.identity_verification_status, CustomerVerificationStatus::Verified);
        assert!(!row.is_blocked);
    }

    #[tokio::test]
    async fn test_bad_signature_is_rejected_before_any_write() {
        let h = harness(Some("vendor-secret"));
        let tenant = Uuid::new_v4();
        let customer = h.db.insert_customer(tenant);
        let body = decision_body("sess-4", 9001, customer, "P1234567");
        let forged = sign("wrong-secret", &body).unwrap();

        let err = h.service.handle(&body, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        let err = h.service.handle(&body, None).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        assert_eq!(h.db.identity_count(), 0);
        assert_eq!(
            h.db.customer(customer).unwrap().identity_verification_status,
            CustomerVerificationStatus::Pending
        );
        assert_eq!(h.media.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_signature_is_accepted() {
        let h = harness(Some("vendor-secret"));
        let customer = h.db.insert_customer(Uuid::new_v4());
        let body = decision_body("sess-5", 9102, customer, "P1234567");
        let signature = sign("vendor-secret", &body).unwrap().to_uppercase();

        h.service.handle(&body, Some(&signature)).await.unwrap();
        assert_eq!(
            h.db.customer(customer).unwrap().identity_verification_status,
            CustomerVerificationStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_submission_lifecycle() {
        let h = harness(None);
        let submitted = json!({"id": "sess-6", "action": "submitted"}).to_string();
        assert_eq!(
            h.service.handle(submitted.as_bytes(), None).await.unwrap(),
            WebhookOutcome::Submitted
        );
        let record = h.db.identity("sess-6").unwrap();
        assert_eq!(record.status, IdentityStatus::Pending);
        assert_eq!(record.customer_id, None);

        let decision = json!({"verification": {"id": "sess-6", "code": 9001, "status": "approved"}})
            .to_string();
        h.service.handle(decision.as_bytes(), None).await.unwrap();

        // A late submission must not reopen a final verdict.
        assert_eq!(
            h.service.handle(submitted.as_bytes(), None).await.unwrap(),
            WebhookOutcome::IgnoredSubmission
        );
        assert_eq!(
            h.db.identity("sess-6").unwrap().review_result,
            Some(ReviewResult::Green)
        );
    }

    #[tokio::test]
    async fn test_retry_skips_media_and_allows_resubmission() {
        let h = harness(None);
        let customer = h.db.insert_customer(Uuid::new_v4());
        let body = decision_body("sess-7", 9103, customer, "P1234567");
        h.service.handle(&body, None).await.unwrap();
        assert_eq!(h.media.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            h.db.customer(customer).unwrap().identity_verification_status,
            CustomerVerificationStatus::RetryRequired
        );

        let submitted = json!({"id": "sess-7", "action": "submitted"}).to_string();
        assert_eq!(
            h.service.handle(submitted.as_bytes(), None).await.unwrap(),
            WebhookOutcome::Submitted
        );
        assert_eq!(h.db.identity("sess-7").unwrap().status, IdentityStatus::Pending);
    }

    #[tokio::test]
    async fn test_started_event_is_acknowledged_without_writes() {
        let h = harness(None);
        let body = json!({"id": "sess-8", "action": "started"}).to_string();
        assert_eq!(
            h.service.handle(body.as_bytes(), None).await.unwrap(),
            WebhookOutcome::Started
        );
        assert_eq!(h.db.identity_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_bad_requests() {
        let h = harness(None);
        for body in [
            "not json".to_string(),
            json!({"verification": {"id": "sess-9", "code": 1234}}).to_string(),
            json!({"action": "exploded"}).to_string(),
        ] {
            let err = h.service.handle(body.as_bytes(), None).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{}", body);
        }
        assert_eq!(h.db.identity_count(), 0);
    }
}
