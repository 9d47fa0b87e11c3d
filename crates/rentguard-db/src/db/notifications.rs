use rentguard_core::{models::NewNotification, AppError};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Redelivering the same outbox event does not duplicate notifications.
    #[tracing::instrument(skip(self, notifications), fields(db.table = "notifications", db.operation = "insert", count = notifications.len()))]
    pub async fn create_notifications(
        &self,
        source_event_id: Uuid,
        notifications: &[NewNotification],
    ) -> Result<u64, AppError> {
        let mut inserted = 0;
        for notification in notifications {
            let result = sqlx::query(
                r#"
                INSERT INTO notifications (tenant_id, user_id, kind, title, message, metadata, source_event_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (source_event_id, user_id) DO NOTHING
                "#,
            )
            .bind(notification.tenant_id)
            .bind(notification.user_id)
            .bind(&notification.kind)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(&notification.metadata)
            .bind(source_event_id)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }
}
