use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use rentguard_core::models::{
    ExtractedInsuranceData, InsuranceDocument, ScanOutcome, VerificationDecision,
    VerificationStatus,
};
use rentguard_core::AppError;
use rentguard_db::DocumentStore;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{claim_document, pipeline_error, ScanCycle, ScanWriter};
use crate::fetcher::{DocumentFetcher, DocumentSource};
use crate::model::CompletionModel;
use crate::parser::{classify, parse_model_reply, ParseResult};
use crate::prompts::extraction_prompt;
use crate::scoring;

/// Parse an extraction reply into structured insurance data.
///
/// Replies sometimes put `liabilityLimit` at the top level instead of under
/// `coverageLimits`; it is moved there before deserializing.
pub fn parse_extraction(raw: &str, file_name: &str) -> ParseResult<ExtractedInsuranceData> {
    match parse_model_reply::<JsonValue>(raw, file_name) {
        ParseResult::Structured(mut value) => {
            hoist_liability_limit(&mut value);
            match serde_json::from_value(value) {
                Ok(data) => ParseResult::Structured(data),
                Err(e) => {
                    tracing::warn!(error = %e, "Extraction reply did not match the expected shape");
                    ParseResult::Heuristic(classify(&raw.to_lowercase(), &file_name.to_lowercase()))
                }
            }
        }
        ParseResult::Heuristic(guess) => ParseResult::Heuristic(guess),
        ParseResult::Unparseable => ParseResult::Unparseable,
    }
}

fn hoist_liability_limit(value: &mut JsonValue) {
    let Some(object) = value.as_object_mut() else {
        return;
    };
    let Some(limit) = object.remove("liabilityLimit") else {
        return;
    };

    let limits = object
        .entry("coverageLimits")
        .or_insert_with(|| json!({}));
    if !limits.is_object() {
        *limits = json!({});
    }
    if let Some(limits) = limits.as_object_mut() {
        if limits.get("liability").map_or(true, JsonValue::is_null) {
            limits.insert("liability".to_string(), limit);
        }
    }
}

/// Full extraction scan of a stored document record.
pub struct DocumentScanner {
    documents: Arc<dyn DocumentStore>,
    writer: ScanWriter,
    fetcher: Arc<DocumentFetcher>,
    model: Arc<dyn CompletionModel>,
    stale_after: Duration,
}

impl DocumentScanner {
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

    /// Scan a document and store the scored extraction.
    ///
    /// `file_url` overrides the record's storage path as the download source.
    /// Once the record is claimed, every failure ends the cycle as `failed`.
    #[tracing::instrument(skip(self, file_url), fields(document_id = %document_id))]
    pub async fn scan(
        &self,
        document_id: Uuid,
        file_url: Option<&str>,
    ) -> Result<ScanOutcome, AppError> {
        if !self.model.is_configured() {
            return Err(AppError::Configuration(
                "No model API credential is configured".to_string(),
            ));
        }

        let document = self
            .documents
            .get_document(document_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Document {} not found", document_id)))?;

        let document = claim_document(self.documents.as_ref(), &document, self.stale_after).await?;
        let cycle = ScanCycle::of(&document)?;
        let started = Instant::now();

        match self.run(&document, &cycle, file_url).await {
            Ok(outcome) => {
                tracing::info!(
                    decision = %outcome.verification_decision,
                    validation_score = outcome.validation_score,
                    fraud_risk_score = outcome.fraud_risk_score,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document scan completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Document scan failed"
                );
                if let Err(write_err) = self.writer.fail(&cycle, &e.to_string()).await {
                    tracing::error!(error = %write_err, "Failed to record scan failure");
                }
                Err(pipeline_error(e))
            }
        }
    }

    async fn run(
        &self,
        document: &InsuranceDocument,
        cycle: &ScanCycle,
        file_url: Option<&str>,
    ) -> Result<ScanOutcome> {
        let reference = file_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or(document.storage_path.as_deref())
            .ok_or_else(|| anyhow!("Document has no storage path and no file URL was given"))?;
        let source = DocumentSource::from_reference(reference);

        let prepared = self
            .fetcher
            .fetch(&source, &document.mime_type, &document.file_name)
            .await?;
        if let Some(error) = &prepared.extraction_error {
            tracing::warn!(error = %error, "Continuing scan without PDF text");
        }

        let prompt = extraction_prompt(
            &document.file_name,
            &document.mime_type,
            prepared.usable_text(),
        );
        let raw = self
            .model
            .complete(&prompt, prepared.image.as_ref())
            .await
            .ok_or_else(|| anyhow!("Model service unavailable"))?;

        let mut outcome = match parse_extraction(&raw, &document.file_name) {
            ParseResult::Structured(data) => scored_outcome(&data)?,
            ParseResult::Heuristic(guess) => {
                tracing::warn!(status = %guess.status, "Scoring skipped; extraction classified by keywords");
                unscored_outcome(guess.status == VerificationStatus::Rejected, &raw)
            }
            ParseResult::Unparseable => {
                tracing::warn!("Extraction reply was empty");
                unscored_outcome(false, &raw)
            }
        };

        self.writer
            .complete(
                cycle,
                outcome.extracted_data.clone(),
                outcome.confidence_score,
                outcome.validation_score,
                prepared.extraction_error.into_iter().collect(),
            )
            .await?;

        if let DocumentSource::StoragePath(key) = &source {
            match self.fetcher.resolve_url(key).await {
                Ok(url) => outcome.document_url = Some(url),
                Err(e) => tracing::warn!(error = %e, "Could not resolve document URL"),
            }
        }

        Ok(outcome)
    }
}

fn scored_outcome(data: &ExtractedInsuranceData) -> Result<ScanOutcome> {
    let card = scoring::score(data, Utc::now().date_naive());
    let requires_manual_review =
        card.decision == VerificationDecision::PendingReview || data.needs_manual_review;

    let mut blob = serde_json::to_value(data)?;
    blob["fraudCheck"] = serde_json::to_value(&card.fraud)?;
    blob["fraudRiskScore"] = card.fraud.fraud_risk_score.into();
    blob["verificationDecision"] = card.decision.to_string().into();
    blob["validationScore"] = card.validation_score.into();
    blob["confidenceScore"] = card.confidence_score.into();
    blob["needsManualReview"] = requires_manual_review.into();

    Ok(ScanOutcome {
        extracted_data: blob,
        validation_score: card.validation_score,
        confidence_score: card.confidence_score,
        verification_decision: card.decision,
        fraud_risk_score: card.fraud.fraud_risk_score,
        requires_manual_review,
        document_url: None,
    })
}

/// Outcome for a reply with no usable extraction. Only a keyword rejection
/// decides automatically.
fn unscored_outcome(rejected: bool, raw: &str) -> ScanOutcome {
    let decision = if rejected {
        VerificationDecision::AutoRejected
    } else {
        VerificationDecision::PendingReview
    };
    let requires_manual_review = decision == VerificationDecision::PendingReview;

    ScanOutcome {
        extracted_data: json!({
            "needsManualReview": requires_manual_review,
            "verificationDecision": decision.to_string(),
            "fraudRiskScore": 0.0,
            "validationScore": 0.0,
            "confidenceScore": 0.0,
            "validationNotes": crate::prompts::truncate_chars(raw.trim(), 1_000),
        }),
        validation_score: 0.0,
        confidence_score: 0.0,
        verification_decision: decision,
        fraud_risk_score: 0.0,
        requires_manual_review,
        document_url: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::InlineImage;
    use crate::prompts::Prompt;
    use async_trait::async_trait;
    use rentguard_core::models::ScanStatus;
    use rentguard_core::DocumentSettings;
    use rentguard_db::InMemoryDatabase;
    use rentguard_storage::{LocalStorage, Storage};

    struct ScriptedModel {
        configured: bool,
        reply: Option<String>,
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn complete(&self, _prompt: &Prompt, _image: Option<&InlineImage>) -> Option<String> {
            self.reply.clone()
        }
    }

    async fn scanner(
        db: Arc<InMemoryDatabase>,
        model: ScriptedModel,
    ) -> (DocumentScanner, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "http://files.test".to_string())
            .await
            .unwrap();
        storage
            .store_object("docs/card.png", vec![0x89, 0x50, 0x4e, 0x47], "image/png")
            .await
            .unwrap();
        storage
            .store_object("docs/broken.pdf", b"%PDF-1.4 truncated".to_vec(), "application/pdf")
            .await
            .unwrap();
        let settings = DocumentSettings {
            url_allowlist: None,
            allow_private_urls: false,
            max_document_size_bytes: 1024 * 1024,
            download_timeout_secs: 5,
            scan_stale_after_secs: 600,
        };
        let fetcher = DocumentFetcher::new(
            Arc::new(storage),
            settings,
            std::time::Duration::from_secs(60),
        )
        .unwrap();
        let scanner = DocumentScanner::new(db, Arc::new(fetcher), Arc::new(model), Duration::minutes(10));
        (scanner, dir)
    }

    fn replying(reply: &str) -> ScriptedModel {
        ScriptedModel {
            configured: true,
            reply: Some(reply.to_string()),
        }
    }

    fn complete_reply() -> String {
        let next_year = Utc::now().date_naive() + Duration::days(365);
        json!({
            "provider": "Acme Insurance",
            "policyNumber": "ABC123",
            "policyholderName": "Jane Driver",
            "effectiveDate": "2024-01-01",
            "expirationDate": next_year.format("%Y-%m-%d").to_string(),
            "coverageType": "Full coverage",
            "liabilityLimit": "$100,000",
            "isValid": true,
            "needsManualReview": false
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_complete_extraction_is_auto_approved() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        let reply = format!("```json\n{}\n```", complete_reply());
        let (scanner, _dir) = scanner(db.clone(), replying(&reply)).await;

        let outcome = scanner.scan(id, None).await.unwrap();
        assert_eq!(outcome.verification_decision, VerificationDecision::AutoApproved);
        assert_eq!(outcome.validation_score, 1.0);
        assert_eq!(outcome.confidence_score, 1.0);
        assert_eq!(outcome.fraud_risk_score, 0.0);
        assert!(!outcome.requires_manual_review);
        assert_eq!(
            outcome.document_url.as_deref(),
            Some("http://files.test/docs/card.png")
        );

        let doc = db.document(id).unwrap();
        assert_eq!(doc.scan_status, ScanStatus::Completed);
        assert_eq!(doc.validation_score, Some(1.0));
        let blob = doc.extracted_data.unwrap();
        assert_eq!(blob["verificationDecision"], "auto_approved");
        assert_eq!(blob["coverageLimits"]["liability"], 100000.0);
        assert_eq!(blob["fraudCheck"]["hasInconsistentDates"], false);
    }

    #[tokio::test]
    async fn test_unreadable_pdf_completes_with_warning() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("broken.pdf", "application/pdf", Some("docs/broken.pdf"));
        let (scanner, _dir) = scanner(db.clone(), replying(&complete_reply())).await;

        let outcome = scanner.scan(id, None).await.unwrap();
        assert_eq!(outcome.verification_decision, VerificationDecision::AutoApproved);

        let doc = db.document(id).unwrap();
        assert_eq!(doc.scan_status, ScanStatus::Completed);
        assert_eq!(doc.scan_errors.len(), 1);
        assert!(doc.scan_errors[0].contains("PDF"));
    }

    #[tokio::test]
    async fn test_keyword_rejection_is_auto_rejected() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        let (scanner, _dir) =
            scanner(db.clone(), replying("This is not an insurance document.")).await;

        let outcome = scanner.scan(id, None).await.unwrap();
        assert_eq!(outcome.verification_decision, VerificationDecision::AutoRejected);
        assert_eq!(outcome.validation_score, 0.0);
        assert!(!outcome.requires_manual_review);
    }

    #[tokio::test]
    async fn test_inconclusive_reply_needs_review() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        let (scanner, _dir) = scanner(db.clone(), replying("I cannot tell.")).await;

        let outcome = scanner.scan(id, None).await.unwrap();
        assert_eq!(outcome.verification_decision, VerificationDecision::PendingReview);
        assert!(outcome.requires_manual_review);
        assert_eq!(db.document(id).unwrap().scan_status, ScanStatus::Completed);
    }

    #[tokio::test]
    async fn test_unavailable_model_fails_the_record() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        let model = ScriptedModel {
            configured: true,
            reply: None,
        };
        let (scanner, _dir) = scanner(db.clone(), model).await;

        let result = scanner.scan(id, None).await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        let doc = db.document(id).unwrap();
        assert_eq!(doc.scan_status, ScanStatus::Failed);
        assert_eq!(doc.scan_errors, vec!["Model service unavailable".to_string()]);
        assert_eq!(doc.extracted_data.unwrap()["needsManualReview"], true);
    }

    #[tokio::test]
    async fn test_missing_stored_file_is_a_storage_error() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("gone.png", "image/png", Some("docs/gone.png"));
        let (scanner, _dir) = scanner(db.clone(), replying(&complete_reply())).await;

        let result = scanner.scan(id, None).await;
        assert!(matches!(result, Err(AppError::Storage(_))));

        let doc = db.document(id).unwrap();
        assert_eq!(doc.scan_status, ScanStatus::Failed);
        assert!(doc.scan_errors[0].contains("docs/gone.png"));
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let db = Arc::new(InMemoryDatabase::new());
        let (scanner, _dir) = scanner(db, replying("{}")).await;
        let result = scanner.scan(Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_live_scan_conflicts() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        db.begin_scan(id, ScanStatus::Pending, None).await.unwrap();
        let (scanner, _dir) = scanner(db.clone(), replying(&complete_reply())).await;

        let result = scanner.scan(id, None).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(db.document(id).unwrap().scan_status, ScanStatus::Processing);
    }

    #[tokio::test]
    async fn test_unconfigured_model_touches_nothing() {
        let db = Arc::new(InMemoryDatabase::new());
        let id = db.insert_document("card.png", "image/png", Some("docs/card.png"));
        let model = ScriptedModel {
            configured: false,
            reply: None,
        };
        let (scanner, _dir) = scanner(db.clone(), model).await;

        let result = scanner.scan(id, None).await;
        assert!(matches!(result, Err(AppError::Configuration(_))));
        assert_eq!(db.document(id).unwrap().scan_status, ScanStatus::Pending);
    }

    #[test]
    fn test_top_level_liability_limit_is_hoisted() {
        let ParseResult::Structured(data) = parse_extraction(
            r#"{"policyNumber": "P-1", "liabilityLimit": 250000, "coverageLimits": null}"#,
            "doc.pdf",
        ) else {
            panic!("expected structured extraction");
        };
        assert_eq!(data.coverage_limits.liability, Some(250000.0));

        let ParseResult::Structured(data) = parse_extraction(
            r#"{"liabilityLimit": 1, "coverageLimits": {"liability": 500000}}"#,
            "doc.pdf",
        ) else {
            panic!("expected structured extraction");
        };
        assert_eq!(data.coverage_limits.liability, Some(500000.0));
    }
}
