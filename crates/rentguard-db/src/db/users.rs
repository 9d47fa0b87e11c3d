use rentguard_core::AppError;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const ADMIN_ROLES: [&str; 2] = ["admin", "head_admin"];

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "users", db.operation = "select"))]
    pub async fn list_admin_ids(&self, tenant_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<Postgres, Uuid>(
            "SELECT id FROM users WHERE tenant_id = $1 AND role = ANY($2) ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(&ADMIN_ROLES[..])
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
