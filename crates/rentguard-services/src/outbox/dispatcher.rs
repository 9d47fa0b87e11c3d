use chrono::Utc;
use rentguard_core::models::{NewNotification, OutboxEvent, OutboxPayload};
use rentguard_core::AppError;
use rentguard_db::{calculate_next_retry_time, NotificationStore, OutboxStore, UserStore};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Retrying,
    Dead,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub retrying: usize,
    pub dead: usize,
}

impl DeliveryStats {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Retrying => self.retrying += 1,
            DeliveryOutcome::Dead => self.dead += 1,
        }
    }
}

/// Delivers queued side effects of verification decisions.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationStore>,
    max_attempts: i32,
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationStore>,
        max_attempts: i32,
    ) -> Self {
        Self {
            outbox,
            users,
            notifications,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Perform the side effect of one event. Safe to repeat: notifications
    /// are keyed by event and user.
    pub async fn dispatch(&self, event: &OutboxEvent) -> Result<(), AppError> {
        match &event.payload {
            OutboxPayload::IdentityBlocked {
                customer_id,
                session_id,
                document_number,
                reason,
            } => {
                let admins = self.users.list_admin_ids(event.tenant_id).await?;
                if admins.is_empty() {
                    tracing::warn!(tenant_id = %event.tenant_id, "No admins to notify about blocked identity");
                    return Ok(());
                }

                let notifications: Vec<NewNotification> = admins
                    .into_iter()
                    .map(|user_id| NewNotification {
                        tenant_id: event.tenant_id,
                        user_id,
                        kind: event.payload.kind().to_string(),
                        title: "Blocked identity detected".to_string(),
                        message: format!(
                            "Identity verification {} matched blocked document {}. Reason: {}",
                            session_id, document_number, reason
                        ),
                        metadata: json!({
                            "customerId": customer_id,
                            "sessionId": session_id,
                            "documentNumber": document_number,
                            "reason": reason,
                        }),
                    })
                    .collect();

                let inserted = self
                    .notifications
                    .create_notifications(event.id, &notifications)
                    .await?;
                tracing::info!(
                    event_id = %event.id,
                    tenant_id = %event.tenant_id,
                    inserted,
                    "Admins notified about blocked identity"
                );
                Ok(())
            }
        }
    }

    /// Dispatch one event and record the outcome on it.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, kind = event.payload.kind(), attempts = event.attempts))]
    pub async fn attempt(&self, event: &OutboxEvent) -> Result<DeliveryOutcome, AppError> {
        let error = match self.dispatch(event).await {
            Ok(()) => {
                self.outbox.mark_delivered(event.id).await?;
                return Ok(DeliveryOutcome::Delivered);
            }
            Err(e) => e,
        };

        let attempts = event.attempts + 1;
        if attempts >= self.max_attempts {
            tracing::error!(error = %error, attempts, "Outbox event dead-lettered");
            self.outbox
                .record_failure(event.id, attempts, None, &error.to_string())
                .await?;
            return Ok(DeliveryOutcome::Dead);
        }

        let next_attempt_at = Utc::now() + calculate_next_retry_time(attempts);
        tracing::warn!(
            error = %error,
            attempts,
            next_attempt_at = %next_attempt_at,
            "Outbox delivery failed; will retry"
        );
        self.outbox
            .record_failure(event.id, attempts, Some(next_attempt_at), &error.to_string())
            .await?;
        Ok(DeliveryOutcome::Retrying)
    }

    /// Post-commit delivery of freshly queued events. Anything that fails
    /// stays queued for the retry loop.
    pub async fn deliver_now(&self, ids: &[Uuid]) -> DeliveryStats {
        let mut stats = DeliveryStats::default();
        if ids.is_empty() {
            return stats;
        }

        let events = match self.outbox.get_events(ids).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load queued events; leaving them for retry");
                return stats;
            }
        };

        for event in &events {
            match self.attempt(event).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "Delivery bookkeeping failed");
                }
            }
        }
        stats
    }

    /// Attempt a batch of due events.
    pub async fn deliver_due(&self, batch_size: i64) -> Result<DeliveryStats, AppError> {
        let events = self.outbox.get_due_events(batch_size).await?;
        let mut stats = DeliveryStats::default();
        for event in &events {
            match self.attempt(event).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Delivery bookkeeping failed");
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentguard_core::models::{NewOutboxEvent, OutboxStatus};
    use rentguard_db::InMemoryDatabase;

    fn blocked_event(tenant_id: Uuid) -> NewOutboxEvent {
        NewOutboxEvent {
            tenant_id,
            payload: OutboxPayload::IdentityBlocked {
                customer_id: None,
                session_id: "sess-1".to_string(),
                document_number: "D1234567".to_string(),
                reason: "Chargeback fraud".to_string(),
            },
        }
    }

    async fn queue(db: &InMemoryDatabase, tenant_id: Uuid) -> Uuid {
        use rentguard_core::models::DecisionUpdate;
        use rentguard_db::IdentityVerificationStore;

        let (_, events) = db
            .commit_decision("sess-1", &DecisionUpdate::default(), None, &[blocked_event(tenant_id)])
            .await
            .unwrap();
        events[0].id
    }

    fn dispatcher(db: &Arc<InMemoryDatabase>, max_attempts: i32) -> OutboxDispatcher {
        OutboxDispatcher::new(db.clone(), db.clone(), db.clone(), max_attempts)
    }

    #[tokio::test]
    async fn test_deliver_now_notifies_every_admin_once() {
        let db = Arc::new(InMemoryDatabase::new());
        let tenant = Uuid::new_v4();
        let admin_a = db.insert_admin(tenant);
        let admin_b = db.insert_admin(tenant);
        db.insert_admin(Uuid::new_v4());
        let id = queue(&db, tenant).await;

        let d = dispatcher(&db, 5);
        let stats = d.deliver_now(&[id]).await;
        assert_eq!(stats.delivered, 1);

        let mut notified: Vec<Uuid> = db.notifications().iter().map(|n| n.user_id).collect();
        notified.sort();
        let mut expected = vec![admin_a, admin_b];
        expected.sort();
        assert_eq!(notified, expected);
        assert_eq!(db.outbox_events()[0].status, OutboxStatus::Delivered);

        // A delivered event is not picked up again.
        assert_eq!(d.deliver_now(&[id]).await, DeliveryStats::default());
        assert_eq!(db.notifications().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_retried_with_backoff() {
        let db = Arc::new(InMemoryDatabase::new());
        let tenant = Uuid::new_v4();
        db.insert_admin(tenant);
        let id = queue(&db, tenant).await;
        db.set_fail_notifications(true);

        let d = dispatcher(&db, 5);
        let stats = d.deliver_now(&[id]).await;
        assert_eq!(stats.retrying, 1);

        let event = db.outbox_events()[0].clone();
        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.attempts, 1);
        assert!(event.last_error.is_some());
        assert!(event.next_attempt_at > Utc::now() + chrono::Duration::seconds(50));

        // Not yet due.
        assert_eq!(d.deliver_due(10).await.unwrap(), DeliveryStats::default());

        db.set_fail_notifications(false);
        db.make_outbox_due();
        assert_eq!(d.deliver_due(10).await.unwrap().delivered, 1);
        assert_eq!(db.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_event_is_dead_lettered_after_max_attempts() {
        let db = Arc::new(InMemoryDatabase::new());
        let tenant = Uuid::new_v4();
        db.insert_admin(tenant);
        queue(&db, tenant).await;
        db.set_fail_notifications(true);

        let d = dispatcher(&db, 2);
        assert_eq!(d.deliver_due(10).await.unwrap().retrying, 1);
        db.make_outbox_due();
        assert_eq!(d.deliver_due(10).await.unwrap().dead, 1);

        let event = db.outbox_events()[0].clone();
        assert_eq!(event.status, OutboxStatus::Dead);
        assert_eq!(event.attempts, 2);

        db.make_outbox_due();
        assert_eq!(d.deliver_due(10).await.unwrap(), DeliveryStats::default());
    }

    #[tokio::test]
    async fn test_tenant_without_admins_is_delivered() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = queue(&db, Uuid::new_v4()).await;
        let stats = dispatcher(&db, 5).deliver_now(&[id]).await;
        assert_eq!(stats.delivered, 1);
        assert!(db.notifications().is_empty());
    }
}
