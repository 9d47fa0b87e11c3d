use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::fmt::{Display, Formatter, Result as FmtResult};
use utoipa::ToSchema;

/// Date format accepted for policy dates.
pub const POLICY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a policy date, accepting only `YYYY-MM-DD`.
pub fn parse_policy_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, POLICY_DATE_FORMAT).ok()
}

/// Coverage amounts as read from the document. Model replies are inconsistent
/// about numbers vs. formatted strings ("$100,000"), so both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverageLimits {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub liability: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub collision: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub comprehensive: Option<f64>,
}

impl CoverageLimits {
    pub fn any_present(&self) -> bool {
        self.liability.is_some() || self.collision.is_some() || self.comprehensive.is_some()
    }
}

/// Parse "$1,000,000.00", "100000" or 100000 into a number. Anything else is absent.
pub fn parse_amount(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_amount))
}

/// Structured fields read off an insurance document by the extraction model.
///
/// Every field is optional: partial extraction is the normal case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedInsuranceData {
    #[serde(default, alias = "insurer", alias = "insuranceProvider")]
    pub provider: Option<String>,
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(
        default,
        alias = "namedInsured",
        alias = "insuredName",
        alias = "policyHolder"
    )]
    pub policyholder_name: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default, alias = "policyType")]
    pub coverage_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coverage_limits: CoverageLimits,
    #[serde(default)]
    pub is_valid: Option<bool>,
    #[serde(default)]
    pub is_expired: Option<bool>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub validation_notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub needs_manual_review: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub review_reasons: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suspicious_indicators: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Treat empty strings from the model as missing values.
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ExtractedInsuranceData {
    pub fn effective_date(&self) -> Option<NaiveDate> {
        present(&self.effective_date).and_then(parse_policy_date)
    }

    pub fn expiration_date(&self) -> Option<NaiveDate> {
        present(&self.expiration_date).and_then(parse_policy_date)
    }
}

/// Rule-based fraud assessment. Computed, never stored on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FraudCheckResult {
    pub is_expired: bool,
    pub has_inconsistent_dates: bool,
    pub suspicious_indicators: Vec<String>,
    pub fraud_risk_score: f64,
}

/// Automated outcome of a document scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    AutoApproved,
    PendingReview,
    AutoRejected,
}

impl Display for VerificationDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VerificationDecision::AutoApproved => write!(f, "auto_approved"),
            VerificationDecision::PendingReview => write!(f, "pending_review"),
            VerificationDecision::AutoRejected => write!(f, "auto_rejected"),
        }
    }
}

/// All scores derived from one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    pub fraud: FraudCheckResult,
    pub validation_score: f64,
    pub confidence_score: f64,
    pub decision: VerificationDecision,
}

/// Result of a full document scan, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// Stored extraction blob, including the embedded scores and decision.
    #[schema(value_type = Object)]
    pub extracted_data: JsonValue,
    pub validation_score: f64,
    pub confidence_score: f64,
    pub verification_decision: VerificationDecision,
    pub fraud_risk_score: f64,
    pub requires_manual_review: bool,
    /// Temporary read URL for the scanned file, when it came from storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

/// Outcome of the synchronous verification call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Approved,
    Rejected,
    PendingReview,
}

impl Display for VerificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VerificationStatus::Approved => write!(f, "approved"),
            VerificationStatus::Rejected => write!(f, "rejected"),
            VerificationStatus::PendingReview => write!(f, "pending_review"),
        }
    }
}

/// Per-field check shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Unknown,
}

impl CheckOutcome {
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => CheckOutcome::Pass,
            Some(false) => CheckOutcome::Fail,
            None => CheckOutcome::Unknown,
        }
    }

    pub fn from_presence(value: &Option<String>) -> Self {
        if present(value).is_some() {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationChecks {
    pub document_type: CheckOutcome,
    pub policy_number: CheckOutcome,
    pub insurer: CheckOutcome,
    pub expiration: CheckOutcome,
}

impl ValidationChecks {
    pub fn unknown() -> Self {
        Self {
            document_type: CheckOutcome::Unknown,
            policy_number: CheckOutcome::Unknown,
            insurer: CheckOutcome::Unknown,
            expiration: CheckOutcome::Unknown,
        }
    }
}

/// Fields returned by the verification model, in its own vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPolicyFields {
    #[serde(default)]
    pub policy_number: Option<String>,
    #[serde(default, alias = "provider")]
    pub insurer: Option<String>,
    #[serde(default, alias = "policyholderName")]
    pub named_insured: Option<String>,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub liability_limit: Option<JsonValue>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub vehicle_info: Option<JsonValue>,
    #[serde(default)]
    pub document_type: Option<String>,
}

impl VerifiedPolicyFields {
    /// Project into the extraction shape stored on the document record.
    pub fn to_extracted(&self) -> ExtractedInsuranceData {
        ExtractedInsuranceData {
            provider: self.insurer.clone(),
            policy_number: self.policy_number.clone(),
            policyholder_name: self.named_insured.clone(),
            effective_date: self.effective_date.clone(),
            expiration_date: self.expiration_date.clone(),
            coverage_limits: CoverageLimits {
                liability: self.liability_limit.as_ref().and_then(parse_amount),
                ..CoverageLimits::default()
            },
            document_type: self.document_type.clone(),
            ..ExtractedInsuranceData::default()
        }
    }
}

/// Response of the synchronous verification endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub confidence: f64,
    pub message: String,
    pub validation_checks: ValidationChecks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<VerifiedPolicyFields>,
}
