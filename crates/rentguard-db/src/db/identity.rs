use rentguard_core::{
    models::{
        CustomerUpdate, DecisionUpdate, IdentityStatus, IdentityVerification, NewOutboxEvent,
        OutboxEvent,
    },
    AppError,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::transaction::TransactionGuard;

/// Repository for KYC session records
#[derive(Clone)]
pub struct IdentityVerificationRepository {
    pool: PgPool,
}

impl IdentityVerificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "identity_verifications", db.operation = "select"))]
    pub async fn find_by_session(
        &self,
        session_id: &str,
    ) -> Result<Option<IdentityVerification>, AppError> {
        let record = sqlx::query_as::<Postgres, IdentityVerification>(
            "SELECT * FROM identity_verifications WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "identity_verifications", db.operation = "upsert"))]
    pub async fn mark_submitted(
        &self,
        session_id: &str,
        tenant_id: Option<Uuid>,
        customer_id: Option<Uuid>,
    ) -> Result<IdentityVerification, AppError> {
        let record = sqlx::query_as::<Postgres, IdentityVerification>(
            r#"
            INSERT INTO identity_verifications (session_id, tenant_id, customer_id, status, review_status)
            VALUES ($1, $2, $3, $4, 'submitted')
            ON CONFLICT (session_id)
            DO UPDATE SET
                tenant_id = COALESCE(EXCLUDED.tenant_id, identity_verifications.tenant_id),
                customer_id = COALESCE(EXCLUDED.customer_id, identity_verifications.customer_id),
                status = EXCLUDED.status,
                review_status = EXCLUDED.review_status,
                review_result = NULL,
                rejection_reason = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(tenant_id)
        .bind(customer_id)
        .bind(IdentityStatus::Pending)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Apply a vendor decision and everything that follows from it in one transaction.
    #[tracing::instrument(skip(self, update, customer, events), fields(db.table = "identity_verifications", db.operation = "upsert", events = events.len()))]
    pub async fn commit_decision(
        &self,
        session_id: &str,
        update: &DecisionUpdate,
        customer: Option<&CustomerUpdate>,
        events: &[NewOutboxEvent],
    ) -> Result<(IdentityVerification, Vec<OutboxEvent>), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let media_fetched = !update.media.is_empty();
        let record = sqlx::query_as::<Postgres, IdentityVerification>(
            r#"
            INSERT INTO identity_verifications (
                session_id, tenant_id, customer_id, status, review_status, review_result,
                rejection_reason, document_type, document_number, document_country,
                document_expiry_date, first_name, last_name, date_of_birth,
                document_front_url, document_back_url, face_url, media_fetched_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    CASE WHEN $18 THEN NOW() ELSE NULL END)
            ON CONFLICT (session_id)
            DO UPDATE SET
                tenant_id = COALESCE(EXCLUDED.tenant_id, identity_verifications.tenant_id),
                customer_id = COALESCE(EXCLUDED.customer_id, identity_verifications.customer_id),
                status = EXCLUDED.status,
                review_status = COALESCE(EXCLUDED.review_status, identity_verifications.review_status),
                review_result = EXCLUDED.review_result,
                rejection_reason = EXCLUDED.rejection_reason,
                document_type = COALESCE(EXCLUDED.document_type, identity_verifications.document_type),
                document_number = COALESCE(EXCLUDED.document_number, identity_verifications.document_number),
                document_country = COALESCE(EXCLUDED.document_country, identity_verifications.document_country),
                document_expiry_date = COALESCE(EXCLUDED.document_expiry_date, identity_verifications.document_expiry_date),
                first_name = COALESCE(EXCLUDED.first_name, identity_verifications.first_name),
                last_name = COALESCE(EXCLUDED.last_name, identity_verifications.last_name),
                date_of_birth = COALESCE(EXCLUDED.date_of_birth, identity_verifications.date_of_birth),
                document_front_url = COALESCE(EXCLUDED.document_front_url, identity_verifications.document_front_url),
                document_back_url = COALESCE(EXCLUDED.document_back_url, identity_verifications.document_back_url),
                face_url = COALESCE(EXCLUDED.face_url, identity_verifications.face_url),
                media_fetched_at = COALESCE(EXCLUDED.media_fetched_at, identity_verifications.media_fetched_at),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(update.tenant_id)
        .bind(update.customer_id)
        .bind(IdentityStatus::Completed)
        .bind(&update.review_status)
        .bind(update.review_result)
        .bind(&update.rejection_reason)
        .bind(&update.document_type)
        .bind(&update.document_number)
        .bind(&update.document_country)
        .bind(&update.document_expiry_date)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.date_of_birth)
        .bind(&update.media.document_front_url)
        .bind(&update.media.document_back_url)
        .bind(&update.media.face_url)
        .bind(media_fetched)
        .fetch_one(&mut **tx)
        .await?;

        if let Some(customer) = customer {
            let block = customer.block.as_ref();
            sqlx::query(
                r#"
                UPDATE customers
                SET identity_verification_status = $2,
                    is_blocked = is_blocked OR $3,
                    blocked_at = COALESCE($4, blocked_at),
                    blocked_reason = COALESCE($5, blocked_reason),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(customer.customer_id)
            .bind(customer.verification_status)
            .bind(block.is_some())
            .bind(block.map(|b| b.blocked_at))
            .bind(block.map(|b| b.reason.clone()))
            .execute(&mut **tx)
            .await?;
        }

        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            let row = sqlx::query_as::<Postgres, OutboxEvent>(
                r#"
                INSERT INTO outbox_events (tenant_id, payload)
                VALUES ($1, $2)
                RETURNING *
                "#,
            )
            .bind(event.tenant_id)
            .bind(Json(&event.payload))
            .fetch_one(&mut **tx)
            .await?;
            stored.push(row);
        }

        tx.commit().await?;

        Ok((record, stored))
    }
}
