//! Model reply parsing with a keyword fallback.
//!
//! A reply either parses into the requested shape, or is classified by
//! keyword heuristics, or is empty. The pipeline always ends up with one of
//! the three verification statuses.

use regex::Regex;
use rentguard_core::models::{
    present, CheckOutcome, ValidationChecks, VerificationResult, VerificationStatus,
    VerifiedPolicyFields,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

const REJECT_TEXT_SIGNALS: [&str; 5] = [
    "not an insurance",
    "invalid",
    "unrelated",
    "not a valid",
    "cannot be verified",
];

const REJECT_FILENAME_TOKENS: [&str; 6] = [
    "receipt",
    "selfie",
    "screenshot",
    "invoice",
    "photo_id",
    "passport",
];

const APPROVE_TEXT_SIGNALS: [&str; 5] = [
    "valid insurance",
    "insurance certificate",
    "insurance card",
    "proof of insurance",
    "declarations page",
];

pub const HEURISTIC_REJECT_CONFIDENCE: f64 = 0.7;
pub const HEURISTIC_APPROVE_CONFIDENCE: f64 = 0.75;
pub const HEURISTIC_DEFAULT_CONFIDENCE: f64 = 0.5;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("code fence pattern is valid")
});

/// Status inferred from free text when the reply carried no usable JSON.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusGuess {
    pub status: VerificationStatus,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    Structured(T),
    Heuristic(StatusGuess),
    Unparseable,
}

/// Keyword classification over an already lower-cased reply and file name.
///
/// Any reject signal wins, even when approve signals are also present.
pub fn classify(text: &str, file_name: &str) -> StatusGuess {
    let rejected = REJECT_TEXT_SIGNALS.iter().any(|s| text.contains(s))
        || REJECT_FILENAME_TOKENS.iter().any(|t| file_name.contains(t));
    if rejected {
        return StatusGuess {
            status: VerificationStatus::Rejected,
            confidence: HEURISTIC_REJECT_CONFIDENCE,
        };
    }

    if APPROVE_TEXT_SIGNALS.iter().any(|s| text.contains(s)) {
        return StatusGuess {
            status: VerificationStatus::Approved,
            confidence: HEURISTIC_APPROVE_CONFIDENCE,
        };
    }

    StatusGuess {
        status: VerificationStatus::PendingReview,
        confidence: HEURISTIC_DEFAULT_CONFIDENCE,
    }
}

/// The first `{` to the last `}` of the reply, after unwrapping a markdown fence.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let body = CODE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

pub fn parse_model_reply<T: DeserializeOwned>(raw: &str, file_name: &str) -> ParseResult<T> {
    if raw.trim().is_empty() {
        return ParseResult::Unparseable;
    }

    if let Some(object) = extract_json_object(raw) {
        match serde_json::from_str::<T>(object) {
            Ok(parsed) => return ParseResult::Structured(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "Model reply JSON did not match the expected shape")
            }
        }
    } else {
        tracing::warn!("Model reply contained no JSON object");
    }

    ParseResult::Heuristic(classify(&raw.to_lowercase(), &file_name.to_lowercase()))
}

fn lenient_confidence<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelValidationResults {
    #[serde(default)]
    pub has_required_fields: Option<bool>,
    #[serde(default)]
    pub is_expired: Option<bool>,
    #[serde(default)]
    pub dates_consistent: Option<bool>,
}

/// Reply shape of the verification call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelVerdict {
    #[serde(default)]
    pub is_insurance_document: Option<bool>,
    #[serde(default, deserialize_with = "lenient_confidence")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub extracted_data: Option<VerifiedPolicyFields>,
    #[serde(default)]
    pub validation_results: Option<ModelValidationResults>,
}

impl ModelVerdict {
    /// Only an explicit APPROVE approves.
    pub fn status(&self) -> VerificationStatus {
        match self
            .recommendation
            .as_deref()
            .map(|r| r.trim().to_uppercase())
            .as_deref()
        {
            Some("APPROVE") => VerificationStatus::Approved,
            Some("REJECT") => VerificationStatus::Rejected,
            _ => VerificationStatus::PendingReview,
        }
    }

    pub fn validation_checks(&self) -> ValidationChecks {
        let fields = self.extracted_data.clone().unwrap_or_default();
        let is_expired = self
            .validation_results
            .as_ref()
            .and_then(|results| results.is_expired);

        ValidationChecks {
            document_type: CheckOutcome::from_flag(self.is_insurance_document),
            policy_number: CheckOutcome::from_presence(&fields.policy_number),
            insurer: CheckOutcome::from_presence(&fields.insurer),
            expiration: CheckOutcome::from_flag(is_expired.map(|expired| !expired)),
        }
    }

    pub fn into_result(self) -> VerificationResult {
        let status = self.status();
        let confidence = self
            .confidence
            .map(|c| if c > 1.0 { c / 100.0 } else { c })
            .unwrap_or(HEURISTIC_DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        let validation_checks = self.validation_checks();
        let message = present(&self.message)
            .or_else(|| present(&self.rejection_reason))
            .map(String::from)
            .unwrap_or_else(|| default_message(status).to_string());

        VerificationResult {
            status,
            confidence,
            message,
            validation_checks,
            extracted_data: self.extracted_data,
        }
    }
}

fn default_message(status: VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Approved => "Insurance document verified.",
        VerificationStatus::Rejected => "The uploaded file does not appear to be an insurance document.",
        VerificationStatus::PendingReview => "The document requires manual review.",
    }
}

/// Result for a reply that could only be classified by keywords.
pub fn heuristic_result(guess: StatusGuess) -> VerificationResult {
    let message = match guess.status {
        VerificationStatus::Approved => {
            "Document appears to be valid insurance; automated field extraction was incomplete."
        }
        VerificationStatus::Rejected => {
            "The uploaded file does not appear to be a valid insurance document."
        }
        VerificationStatus::PendingReview => {
            "Automated analysis was inconclusive; the document requires manual review."
        }
    };

    VerificationResult {
        status: guess.status,
        confidence: guess.confidence,
        message: message.to_string(),
        validation_checks: ValidationChecks::unknown(),
        extracted_data: None,
    }
}

/// Result when no model answer is available at all.
pub fn manual_review_result(reason: &str) -> VerificationResult {
    VerificationResult {
        status: VerificationStatus::PendingReview,
        confidence: 0.0,
        message: format!("{} The document requires manual review.", reason),
        validation_checks: ValidationChecks::unknown(),
        extracted_data: None,
    }
}

/// Map any parse outcome of a verification reply onto a result.
pub fn verification_result(parsed: ParseResult<ModelVerdict>) -> VerificationResult {
    match parsed {
        ParseResult::Structured(verdict) => verdict.into_result(),
        ParseResult::Heuristic(guess) => heuristic_result(guess),
        ParseResult::Unparseable => manual_review_result("The automated check returned no answer."),
    }
}
