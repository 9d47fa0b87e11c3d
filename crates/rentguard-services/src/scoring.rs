//! Rule-based scoring of extracted insurance data.
//!
//! Everything here is a pure function of the extraction and `today`.

use chrono::NaiveDate;
use rentguard_core::models::{
    present, ExtractedInsuranceData, FraudCheckResult, ScoreCard, VerificationDecision,
};

const EXPIRED_PENALTY: f64 = 0.3;
const INCONSISTENT_DATES_PENALTY: f64 = 0.4;
const MODEL_INVALID_PENALTY: f64 = 0.5;
const MISSING_IDENTIFIERS_PENALTY: f64 = 0.3;
const SUSPICIOUS_KEYWORD_PENALTY: f64 = 0.2;

const SUSPICIOUS_KEYWORDS: [&str; 5] = ["tamper", "alter", "suspicious", "fake", "invalid"];

const POLICY_NUMBER_WEIGHT: f64 = 0.25;
const PROVIDER_WEIGHT: f64 = 0.20;
const EFFECTIVE_DATE_WEIGHT: f64 = 0.15;
const EXPIRATION_DATE_WEIGHT: f64 = 0.25;
const COVERAGE_WEIGHT: f64 = 0.10;
const MODEL_VALID_WEIGHT: f64 = 0.05;
const FRAUD_PENALTY_FACTOR: f64 = 0.5;

const TRACKED_FIELDS: f64 = 7.0;
const MODEL_VALID_BONUS: f64 = 0.10;
const MANUAL_REVIEW_PENALTY: f64 = 0.15;

pub const AUTO_APPROVE_MIN_VALIDATION: f64 = 0.85;
pub const AUTO_APPROVE_MAX_FRAUD: f64 = 0.3;
pub const AUTO_REJECT_BELOW_VALIDATION: f64 = 0.60;
pub const AUTO_REJECT_MIN_FRAUD: f64 = 0.7;

/// Round to four decimals so stored scores do not carry float noise.
fn round_score(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub fn fraud_check(data: &ExtractedInsuranceData, today: NaiveDate) -> FraudCheckResult {
    let effective = data.effective_date();
    let expiration = data.expiration_date();
    let mut score = 0.0;
    let mut indicators = Vec::new();

    // Only a parsed expiration date counts; the model's own flag is not trusted.
    let is_expired = expiration.is_some_and(|date| date < today);
    if is_expired {
        score += EXPIRED_PENALTY;
        indicators.push("Policy is expired".to_string());
    }

    let has_inconsistent_dates = matches!(
        (effective, expiration),
        (Some(start), Some(end)) if end <= start
    );
    if has_inconsistent_dates {
        score += INCONSISTENT_DATES_PENALTY;
        indicators.push("Expiration date is not after the effective date".to_string());
    }

    if data.is_valid == Some(false) {
        score += MODEL_INVALID_PENALTY;
        indicators.push("Document flagged as invalid during extraction".to_string());
    }

    if present(&data.policy_number).is_none() && present(&data.provider).is_none() {
        score += MISSING_IDENTIFIERS_PENALTY;
        indicators.push("Missing both policy number and insurance provider".to_string());
    }

    if let Some(notes) = present(&data.validation_notes) {
        let notes = notes.to_lowercase();
        for keyword in SUSPICIOUS_KEYWORDS {
            if notes.contains(keyword) {
                score += SUSPICIOUS_KEYWORD_PENALTY;
                indicators.push(format!("Validation notes mention '{}'", keyword));
            }
        }
    }

    for reported in &data.suspicious_indicators {
        if !reported.trim().is_empty() && !indicators.contains(reported) {
            indicators.push(reported.clone());
        }
    }

    FraudCheckResult {
        is_expired,
        has_inconsistent_dates,
        suspicious_indicators: indicators,
        fraud_risk_score: round_score(f64::min(score, 1.0)),
    }
}

/// Weighted completeness score, penalised by fraud risk.
///
/// The expiration component only checks that the date is present,
/// well-formed and not in the past. Inconsistent ordering is penalised
/// through the fraud score alone.
pub fn validation_score(
    data: &ExtractedInsuranceData,
    fraud: &FraudCheckResult,
    today: NaiveDate,
) -> f64 {
    let mut score = 0.0;

    if present(&data.policy_number).is_some() {
        score += POLICY_NUMBER_WEIGHT;
    }
    if present(&data.provider).is_some() {
        score += PROVIDER_WEIGHT;
    }
    if data.effective_date().is_some() {
        score += EFFECTIVE_DATE_WEIGHT;
    }
    if data.expiration_date().is_some_and(|date| date >= today) {
        score += EXPIRATION_DATE_WEIGHT;
    }
    if data.coverage_limits.any_present() {
        score += COVERAGE_WEIGHT;
    }
    if data.is_valid == Some(true) {
        score += MODEL_VALID_WEIGHT;
    }

    let penalised = f64::min(score, 1.0) * (1.0 - fraud.fraud_risk_score * FRAUD_PENALTY_FACTOR);
    round_score(penalised.clamp(0.0, 1.0))
}

/// Share of the seven tracked fields that were extracted, adjusted by the
/// model's own validity and review flags.
pub fn confidence_score(data: &ExtractedInsuranceData) -> f64 {
    let tracked = [
        present(&data.provider).is_some(),
        present(&data.policy_number).is_some(),
        present(&data.policyholder_name).is_some(),
        present(&data.effective_date).is_some(),
        present(&data.expiration_date).is_some(),
        present(&data.coverage_type).is_some(),
        data.coverage_limits.any_present(),
    ];
    let found = tracked.iter().filter(|present| **present).count() as f64;

    let mut score = found / TRACKED_FIELDS;
    if data.is_valid == Some(true) {
        score += MODEL_VALID_BONUS;
    }
    if data.needs_manual_review {
        score -= MANUAL_REVIEW_PENALTY;
    }

    round_score(score.clamp(0.0, 1.0))
}

pub fn decide(
    validation_score: f64,
    fraud_risk_score: f64,
    needs_manual_review: bool,
) -> VerificationDecision {
    if validation_score >= AUTO_APPROVE_MIN_VALIDATION
        && !needs_manual_review
        && fraud_risk_score < AUTO_APPROVE_MAX_FRAUD
    {
        VerificationDecision::AutoApproved
    } else if validation_score < AUTO_REJECT_BELOW_VALIDATION
        || fraud_risk_score >= AUTO_REJECT_MIN_FRAUD
    {
        VerificationDecision::AutoRejected
    } else {
        VerificationDecision::PendingReview
    }
}

pub fn score(data: &ExtractedInsuranceData, today: NaiveDate) -> ScoreCard {
    let fraud = fraud_check(data, today);
    let validation_score = validation_score(data, &fraud, today);
    let confidence_score = confidence_score(data);
    let decision = decide(
        validation_score,
        fraud.fraud_risk_score,
        data.needs_manual_review,
    );

    ScoreCard {
        fraud,
        validation_score,
        confidence_score,
        decision,
    }
}
