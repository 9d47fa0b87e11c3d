use anyhow::Result;
use chrono::{Duration, Utc};
use rentguard_core::models::{VerificationResult, VerificationStatus};
use rentguard_core::AppError;
use rentguard_db::DocumentStore;
use std::sync::Arc;
use uuid::Uuid;

use super::{claim_document, pipeline_error, ScanCycle, ScanWriter};
use crate::fetcher::{DocumentFetcher, DocumentSource};
use crate::model::CompletionModel;
use crate::parser::{manual_review_result, parse_model_reply, verification_result, ModelVerdict};
use crate::prompts::verification_prompt;
use crate::scoring;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub document_id: Uuid,
    /// Download URL or storage key of the uploaded file.
    pub file_reference: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Synchronous approve/reject/manual-review check of an uploaded document.
///
/// Record updates are a side channel: the caller always gets a verdict even
/// when the document record cannot be claimed or written.
pub struct InsuranceVerifier {
    documents: Arc<dyn DocumentStore>,
    writer: ScanWriter,
    fetcher: Arc<DocumentFetcher>,
    model: Arc<dyn CompletionModel>,
    stale_after: Duration,
}

impl InsuranceVerifier {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        fetcher: Arc<DocumentFetcher>,
        model: Arc<dyn CompletionModel>,
        stale_after: Duration,
    ) -> Self {
        Self {
            writer: ScanWriter::new(documents.clone()),
            documents,
            fetcher,
            model,
            stale_after,
        }
    }

    #[tracing::instrument(skip(self, request), fields(document_id = %request.document_id, mime_type = %request.mime_type))]
    pub async fn verify(&self, request: &VerificationRequest) -> Result<VerificationResult, AppError> {
        if !self.model.is_configured() {
            return Err(AppError::Configuration(
                "No model API credential is configured".to_string(),
            ));
        }

        let cycle = self.try_claim(request.document_id).await;

        match self.run(request).await {
            Ok((result, warnings)) => {
                tracing::info!(
                    status = %result.status,
                    confidence = result.confidence,
                    "Insurance verification finished"
                );
                if let Some(cycle) = &cycle {
                    self.persist(cycle, &result, warnings).await;
                }
                Ok(result)
            }
            Err(e) => {
                tracing::error!(error = %e, "Insurance verification failed");
                if let Some(cycle) = &cycle {
                    if let Err(write_err) = self.writer.fail(cycle, &e.to_string()).await {
                        tracing::error!(error = %write_err, "Failed to record verification failure");
                    }
                }
                Err(pipeline_error(e))
            }
        }
    }

    /// Claim the record if possible; `None` means verify without writing back.
    async fn try_claim(&self, document_id: Uuid) -> Option<ScanCycle> {
        let document = match self.documents.get_document(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                tracing::warn!("Document record not found; verifying without updating it");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load document record");
                return None;
            }
        };

        let claimed = claim_document(self.documents.as_ref(), &document, self.stale_after)
            .await
            .and_then(|claimed| ScanCycle::of(&claimed));
        match claimed {
            Ok(cycle) => Some(cycle),
            Err(e) => {
                tracing::warn!(error = %e, "Could not claim document for verification");
                None
            }
        }
    }

    /// Verdict plus non-fatal warnings to store with it.
    async fn run(&self, request: &VerificationRequest) -> Result<(VerificationResult, Vec<String>)> {
        let source = DocumentSource::from_reference(&request.file_reference);
        let prepared = self
            .fetcher
            .fetch(&source, &request.mime_type, &request.file_name)
            .await?;
        if let Some(error) = &prepared.extraction_error {
            tracing::warn!(error = %error, "Continuing verification without PDF text");
        }

        let prompt = verification_prompt(
            &request.file_name,
            &request.mime_type,
            prepared.usable_text(),
        );

        let result = match self.model.complete(&prompt, prepared.image.as_ref()).await {
            Some(raw) => {
                verification_result(parse_model_reply::<ModelVerdict>(&raw, &request.file_name))
            }
            None => manual_review_result("Automated verification is currently unavailable."),
        };

        Ok((result, prepared.extraction_error.into_iter().collect()))
    }

    async fn persist(&self, cycle: &ScanCycle, result: &VerificationResult, warnings: Vec<String>) {
        let validation_score = result
            .extracted_data
            .as_ref()
            .map(|fields| scoring::score(&fields.to_extracted(), Utc::now().date_naive()).validation_score)
            .unwrap_or(0.0);

        let mut blob = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize verification result");
                return;
            }
        };
        blob["needsManualReview"] = (result.status == VerificationStatus::PendingReview).into();

        if let Err(e) = self
            .writer
            .complete(cycle, blob, result.confidence, validation_score, warnings)
            .await
        {
            tracing::warn!(error = %e, "Failed to persist verification result");
        }
    }
}
