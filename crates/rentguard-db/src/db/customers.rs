use rentguard_core::{models::Customer, AppError};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Read access to customers. Decision-driven updates go through
/// `IdentityVerificationRepository::commit_decision`.
#[derive(Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "customers", db.operation = "select", db.record_id = %id))]
    pub async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<Postgres, Customer>(
            r#"
            SELECT id, tenant_id, identity_verification_status, is_blocked, blocked_at, blocked_reason
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }
}
