use chrono::{DateTime, Utc};
use rentguard_core::{
    models::{InsuranceDocument, ScanCompletion, ScanStatus},
    AppError,
};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

const DOCUMENT_COLUMNS: &str = "id, tenant_id, customer_id, storage_path, file_name, mime_type, \
    scan_status, extracted_data, confidence_score, validation_score, scan_errors, \
    scan_started_at, last_scanned_at, created_at, updated_at";

/// Repository for uploaded insurance documents
#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self), fields(db.table = "insurance_documents", db.operation = "select", db.record_id = %id))]
    pub async fn get_document(&self, id: Uuid) -> Result<Option<InsuranceDocument>, AppError> {
        let document = sqlx::query_as::<Postgres, InsuranceDocument>(&format!(
            "SELECT {} FROM insurance_documents WHERE id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    /// Move a document into `processing` if nobody else changed it since it was read.
    #[tracing::instrument(skip(self), fields(db.table = "insurance_documents", db.operation = "update", db.record_id = %id))]
    pub async fn begin_scan(
        &self,
        id: Uuid,
        expected_status: ScanStatus,
        expected_started_at: Option<DateTime<Utc>>,
    ) -> Result<Option<InsuranceDocument>, AppError> {
        let document = sqlx::query_as::<Postgres, InsuranceDocument>(&format!(
            r#"
            UPDATE insurance_documents
            SET scan_status = $4,
                scan_started_at = NOW(),
                scan_errors = '{{}}',
                updated_at = NOW()
            WHERE id = $1
              AND scan_status = $2
              AND scan_started_at IS NOT DISTINCT FROM $3
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .bind(expected_status)
        .bind(expected_started_at)
        .bind(ScanStatus::Processing)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    /// Write the outcome of a processing cycle, only while that cycle still owns the record.
    #[tracing::instrument(skip(self, completion), fields(db.table = "insurance_documents", db.operation = "update", db.record_id = %id, scan_status = %completion.status()))]
    pub async fn finish_scan(
        &self,
        id: Uuid,
        cycle_started_at: DateTime<Utc>,
        completion: &ScanCompletion,
    ) -> Result<bool, AppError> {
        let (confidence_score, validation_score) = completion.scores();

        let result = sqlx::query(
            r#"
            UPDATE insurance_documents
            SET scan_status = $2,
                extracted_data = $3,
                confidence_score = $4,
                validation_score = $5,
                scan_errors = $6,
                last_scanned_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND scan_status = $7
              AND scan_started_at = $8
            "#,
        )
        .bind(id)
        .bind(completion.status())
        .bind(completion.extracted_data())
        .bind(confidence_score)
        .bind(validation_score)
        .bind(completion.scan_errors())
        .bind(ScanStatus::Processing)
        .bind(cycle_started_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
