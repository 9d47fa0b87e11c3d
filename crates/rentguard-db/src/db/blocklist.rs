use rentguard_core::{models::BlockedIdentity, AppError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

#[derive(Clone)]
pub struct BlocklistRepository {
    pool: PgPool,
}

impl BlocklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `identity_number` must already be normalized; stored numbers are
    /// normalized in the query the same way.
    #[tracing::instrument(skip(self, identity_number), fields(db.table = "blocked_identities", db.operation = "select", tenant_id = %tenant_id))]
    pub async fn find_active_block(
        &self,
        tenant_id: Uuid,
        identity_number: &str,
    ) -> Result<Option<BlockedIdentity>, AppError> {
        let entry = sqlx::query_as::<Postgres, BlockedIdentity>(
            r#"
            SELECT id, tenant_id, identity_number, identity_type, reason, is_active, created_at
            FROM blocked_identities
            WHERE tenant_id = $1
              AND is_active = TRUE
              AND UPPER(REGEXP_REPLACE(identity_number, '\s', '', 'g')) = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(identity_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
