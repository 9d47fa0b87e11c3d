//! Insurance document pipelines: the synchronous verification call and the
//! full extraction scan, plus the writer that finalises document records.

pub mod scan;
pub mod verify;
pub mod writer;

pub use scan::DocumentScanner;
pub use verify::{InsuranceVerifier, VerificationRequest};
pub use writer::{ScanCycle, ScanWriter};

use chrono::{Duration, Utc};
use rentguard_core::models::{InsuranceDocument, ScanEvent};
use rentguard_core::AppError;
use rentguard_db::DocumentStore;
use rentguard_storage::StorageError;

/// Move a document into `processing` for a new scan cycle.
///
/// Fails with a conflict when another scan owns a fresh processing cycle or
/// wins the compare-and-set first.
pub(crate) async fn claim_document(
    documents: &dyn DocumentStore,
    document: &InsuranceDocument,
    stale_after: Duration,
) -> Result<InsuranceDocument, AppError> {
    let event = document.claim_event(Utc::now(), stale_after)?;
    document.scan_status.transition(event)?;

    if event == ScanEvent::ReclaimStale {
        tracing::warn!(
            document_id = %document.id,
            scan_started_at = ?document.scan_started_at,
            "Reclaiming stale processing cycle"
        );
    }

    documents
        .begin_scan(document.id, document.scan_status, document.scan_started_at)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("Document {} is already being scanned", document.id))
        })
}

/// Error returned to callers once a claimed cycle has failed. Storage
/// failures anywhere in the cause chain surface as storage errors.
pub(crate) fn pipeline_error(error: anyhow::Error) -> AppError {
    if error.downcast_ref::<StorageError>().is_some() {
        AppError::Storage(format!("{:#}", error))
    } else {
        AppError::Internal(error.to_string())
    }
}
