use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

use super::transition::InvalidTransition;

/// Scan lifecycle of an uploaded insurance document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "scan_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Events that move a document through its scan lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// First scan of a freshly uploaded document
    Start,
    /// New processing cycle for a document that already finished
    Rescan,
    /// Take over a processing cycle whose owner stopped making progress
    ReclaimStale,
    Complete,
    Fail,
}

impl ScanStatus {
    pub fn transition(self, event: ScanEvent) -> Result<ScanStatus, InvalidTransition> {
        use ScanEvent::*;
        use ScanStatus::*;

        match (self, event) {
            (Pending, Start) => Ok(Processing),
            (Completed | Failed, Rescan) => Ok(Processing),
            (Processing, ReclaimStale) => Ok(Processing),
            (Processing, Complete) => Ok(Completed),
            (Processing, Fail) => Ok(Failed),
            (from, event) => Err(InvalidTransition::new(from, event)),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScanStatus::Pending => write!(f, "pending"),
            ScanStatus::Processing => write!(f, "processing"),
            ScanStatus::Completed => write!(f, "completed"),
            ScanStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScanStatus::Pending),
            "processing" => Ok(ScanStatus::Processing),
            "completed" => Ok(ScanStatus::Completed),
            "failed" => Ok(ScanStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid scan status: {}", s)),
        }
    }
}

impl Display for ScanEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScanEvent::Start => write!(f, "start"),
            ScanEvent::Rescan => write!(f, "rescan"),
            ScanEvent::ReclaimStale => write!(f, "reclaim_stale"),
            ScanEvent::Complete => write!(f, "complete"),
            ScanEvent::Fail => write!(f, "fail"),
        }
    }
}

/// Uploaded insurance document and its latest scan outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
#[serde(rename_all = "camelCase")]
pub struct InsuranceDocument {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub storage_path: Option<String>,
    pub file_name: String,
    pub mime_type: String,
    pub scan_status: ScanStatus,
    pub extracted_data: Option<JsonValue>,
    pub confidence_score: Option<f64>,
    pub validation_score: Option<f64>,
    pub scan_errors: Vec<String>,
    pub scan_started_at: Option<DateTime<Utc>>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InsuranceDocument {
    /// Event that would start a new processing cycle for this document at `now`.
    ///
    /// A `processing` record younger than `stale_after` belongs to a live scan
    /// and cannot be claimed.
    pub fn claim_event(
        &self,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<ScanEvent, InvalidTransition> {
        match self.scan_status {
            ScanStatus::Pending => Ok(ScanEvent::Start),
            ScanStatus::Completed | ScanStatus::Failed => Ok(ScanEvent::Rescan),
            ScanStatus::Processing => match self.scan_started_at {
                Some(started) if now - started < stale_after => {
                    Err(InvalidTransition::new(self.scan_status, ScanEvent::Start))
                }
                _ => Ok(ScanEvent::ReclaimStale),
            },
        }
    }
}

/// Terminal write for a processing cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanCompletion {
    Completed {
        extracted_data: JsonValue,
        confidence_score: f64,
        validation_score: f64,
        /// Non-fatal problems hit during the scan, such as a PDF without a
        /// readable text layer.
        warnings: Vec<String>,
    },
    Failed {
        error: String,
    },
}

impl ScanCompletion {
    pub fn failed(error: impl Into<String>) -> Self {
        ScanCompletion::Failed {
            error: error.into(),
        }
    }

    pub fn status(&self) -> ScanStatus {
        match self {
            ScanCompletion::Completed { .. } => ScanStatus::Completed,
            ScanCompletion::Failed { .. } => ScanStatus::Failed,
        }
    }

    /// Extracted-data blob written alongside the status.
    pub fn extracted_data(&self) -> JsonValue {
        match self {
            ScanCompletion::Completed { extracted_data, .. } => extracted_data.clone(),
            ScanCompletion::Failed { error } => serde_json::json!({
                "needsManualReview": true,
                "error": error,
            }),
        }
    }

    pub fn scan_errors(&self) -> Vec<String> {
        match self {
            ScanCompletion::Completed { warnings, .. } => warnings.clone(),
            ScanCompletion::Failed { error } => vec![error.clone()],
        }
    }

    pub fn scores(&self) -> (Option<f64>, Option<f64>) {
        match self {
            ScanCompletion::Completed {
                confidence_score,
                validation_score,
                ..
            } => (Some(*confidence_score), Some(*validation_score)),
            ScanCompletion::Failed { .. } => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(status: ScanStatus, started: Option<DateTime<Utc>>) -> InsuranceDocument {
        let now = Utc::now();
        InsuranceDocument {
            id: Uuid::new_v4(),
            tenant_id: None,
            customer_id: None,
            storage_path: Some("insurance/policy.pdf".to_string()),
            file_name: "policy.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            scan_status: status,
            extracted_data: None,
            confidence_score: None,
            validation_score: None,
            scan_errors: Vec::new(),
            scan_started_at: started,
            last_scanned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_scan_transitions_allowed() {
        assert_eq!(
            ScanStatus::Pending.transition(ScanEvent::Start),
            Ok(ScanStatus::Processing)
        );
        assert_eq!(
            ScanStatus::Completed.transition(ScanEvent::Rescan),
            Ok(ScanStatus::Processing)
        );
        assert_eq!(
            ScanStatus::Failed.transition(ScanEvent::Rescan),
            Ok(ScanStatus::Processing)
        );
        assert_eq!(
            ScanStatus::Processing.transition(ScanEvent::Complete),
            Ok(ScanStatus::Completed)
        );
        assert_eq!(
            ScanStatus::Processing.transition(ScanEvent::Fail),
            Ok(ScanStatus::Failed)
        );
    }

    #[test]
    fn test_scan_transitions_rejected() {
        assert!(ScanStatus::Completed
            .transition(ScanEvent::Start)
            .is_err());
        assert!(ScanStatus::Processing
            .transition(ScanEvent::Start)
            .is_err());
        assert!(ScanStatus::Pending
            .transition(ScanEvent::Complete)
            .is_err());
        assert!(ScanStatus::Completed
            .transition(ScanEvent::Fail)
            .is_err());
        assert!(ScanStatus::Pending.transition(ScanEvent::Rescan).is_err());
    }

    #[test]
    fn test_claim_event_for_fresh_and_finished_documents() {
        let now = Utc::now();
        let stale = Duration::seconds(600);
        assert_eq!(
            document(ScanStatus::Pending, None).claim_event(now, stale),
            Ok(ScanEvent::Start)
        );
        assert_eq!(
            document(ScanStatus::Failed, Some(now)).claim_event(now, stale),
            Ok(ScanEvent::Rescan)
        );
    }

    #[test]
    fn test_claim_event_respects_live_scan() {
        let now = Utc::now();
        let stale = Duration::seconds(600);
        let live = document(ScanStatus::Processing, Some(now - Duration::seconds(30)));
        assert!(live.claim_event(now, stale).is_err());

        let abandoned = document(ScanStatus::Processing, Some(now - Duration::seconds(900)));
        assert_eq!(
            abandoned.claim_event(now, stale),
            Ok(ScanEvent::ReclaimStale)
        );
    }

    #[test]
    fn test_failed_completion_flags_manual_review() {
        let completion = ScanCompletion::failed("model unavailable");
        assert_eq!(completion.status(), ScanStatus::Failed);
        assert_eq!(completion.scan_errors(), vec!["model unavailable".to_string()]);
        assert_eq!(completion.extracted_data()["needsManualReview"], true);
        assert_eq!(completion.scores(), (None, None));
    }

    #[test]
    fn test_completed_scan_keeps_warnings() {
        let completion = ScanCompletion::Completed {
            extracted_data: serde_json::json!({"policyNumber": "P-1"}),
            confidence_score: 0.8,
            validation_score: 0.9,
            warnings: vec!["PDF text extraction failed".to_string()],
        };
        assert_eq!(completion.status(), ScanStatus::Completed);
        assert_eq!(
            completion.scan_errors(),
            vec!["PDF text extraction failed".to_string()]
        );
    }
}
