use chrono::{DateTime, Duration, Utc};
use rentguard_core::{
    models::{OutboxEvent, OutboxStatus},
    AppError,
};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Repository for post-commit side effects
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, ids), fields(db.table = "outbox_events", db.operation = "select", count = ids.len()))]
    pub async fn get_events(&self, ids: &[Uuid]) -> Result<Vec<OutboxEvent>, AppError> {
        let events = sqlx::query_as::<Postgres, OutboxEvent>(
            "SELECT * FROM outbox_events WHERE id = ANY($1) AND status = $2 ORDER BY created_at ASC",
        )
        .bind(ids)
        .bind(OutboxStatus::Pending)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Due events, claimed with SKIP LOCKED so concurrent workers don't pick
    /// the same rows. The claim pushes `next_attempt_at` forward so a crashed
    /// worker's batch becomes due again later.
    #[tracing::instrument(skip(self), fields(db.table = "outbox_events", db.operation = "select"))]
    pub async fn get_due_events(&self, limit: i64) -> Result<Vec<OutboxEvent>, AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query_as::<Postgres, OutboxEvent>(
            r#"
            UPDATE outbox_events
            SET next_attempt_at = NOW() + INTERVAL '5 minutes'
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE status = $1 AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(OutboxStatus::Pending)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await;

        match result {
            Ok(events) => {
                tx.commit().await?;
                Ok(events)
            }
            Err(e) => {
                tx.rollback().await.ok();
                Err(anyhow::anyhow!("Failed to fetch due outbox events: {}", e).into())
            }
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "outbox_events", db.operation = "update", db.record_id = %id))]
    pub async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = $2, attempts = attempts + 1, delivered_at = NOW(), last_error = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(OutboxStatus::Delivered)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "outbox_events", db.operation = "update", db.record_id = %id))]
    pub async fn record_failure(
        &self,
        id: Uuid,
        attempts: i32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> Result<(), AppError> {
        let status = if next_attempt_at.is_some() {
            OutboxStatus::Pending
        } else {
            OutboxStatus::Dead
        };

        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = $2,
                attempts = $3,
                next_attempt_at = COALESCE($4, next_attempt_at),
                last_error = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Backoff before the next delivery attempt, given how many attempts already failed.
pub fn calculate_next_retry_time(failed_attempts: i32) -> Duration {
    match failed_attempts {
        i32::MIN..=1 => Duration::minutes(1),
        2 => Duration::minutes(5),
        3 => Duration::minutes(10),
        4 => Duration::minutes(30),
        5 => Duration::minutes(60),
        _ => Duration::hours(1),
    }
}
