use chrono::{DateTime, Utc};
use rentguard_core::models::{InsuranceDocument, ScanCompletion};
use rentguard_core::AppError;
use rentguard_db::DocumentStore;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// One claimed processing cycle. Terminal writes only land while the record
/// still carries this cycle's start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCycle {
    pub document_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl ScanCycle {
    /// Cycle of a document returned by a successful claim.
    pub fn of(document: &InsuranceDocument) -> Result<Self, AppError> {
        let started_at = document.scan_started_at.ok_or_else(|| {
            AppError::Internal(format!(
                "Claimed document {} has no scan start time",
                document.id
            ))
        })?;
        Ok(Self {
            document_id: document.id,
            started_at,
        })
    }
}

/// Terminal writes for a document's processing cycle. No retries.
#[derive(Clone)]
pub struct ScanWriter {
    documents: Arc<dyn DocumentStore>,
}

impl ScanWriter {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Returns `false` when the cycle no longer owns the record.
    #[tracing::instrument(skip(self, extracted_data, warnings), fields(document_id = %cycle.document_id))]
    pub async fn complete(
        &self,
        cycle: &ScanCycle,
        extracted_data: JsonValue,
        confidence_score: f64,
        validation_score: f64,
        warnings: Vec<String>,
    ) -> Result<bool, AppError> {
        let completion = ScanCompletion::Completed {
            extracted_data,
            confidence_score,
            validation_score,
            warnings,
        };
        let written = self
            .documents
            .finish_scan(cycle.document_id, cycle.started_at, &completion)
            .await?;
        if !written {
            tracing::warn!("Scan result not written; cycle no longer owns the document");
        }
        Ok(written)
    }

    /// Mark the cycle failed with `needsManualReview` set on the stored blob.
    #[tracing::instrument(skip(self), fields(document_id = %cycle.document_id))]
    pub async fn fail(&self, cycle: &ScanCycle, message: &str) -> Result<bool, AppError> {
        let written = self
            .documents
            .finish_scan(
                cycle.document_id,
                cycle.started_at,
                &ScanCompletion::failed(message),
            )
            .await?;
        if !written {
            tracing::warn!("Failure not written; cycle no longer owns the document");
        }
        Ok(written)
    }
}
