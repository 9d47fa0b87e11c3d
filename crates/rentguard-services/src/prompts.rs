//! Prompt construction for the verification and extraction calls.
//!
//! Output depends only on the arguments, so identical inputs always produce
//! byte-identical prompts.

/// Text budget for the synchronous verification call.
pub const VERIFICATION_TEXT_BUDGET: usize = 4_000;
/// Text budget for the full extraction scan.
pub const EXTRACTION_TEXT_BUDGET: usize = 15_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Truncate on a character boundary.
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn document_section(text: Option<&str>, budget: usize) -> String {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => format!(
            "Extracted document text:\n---\n{}\n---",
            truncate_chars(text, budget)
        ),
        None => "No text could be extracted from this document. Read the attached document image visually and base your answer on what you can see.".to_string(),
    }
}

const VERIFICATION_SYSTEM: &str = "You are an insurance document verification assistant for a vehicle rental company. \
You decide whether an uploaded file is a legitimate vehicle insurance document and extract its key fields. \
Respond with a single JSON object and nothing else.";

const VERIFICATION_SCHEMA: &str = r#"{
  "isInsuranceDocument": boolean,
  "confidence": number between 0 and 1,
  "recommendation": "APPROVE" | "REJECT" | "MANUAL_REVIEW",
  "rejectionReason": string or null,
  "message": string,
  "extractedData": {
    "policyNumber": string or null,
    "insurer": string or null,
    "namedInsured": string or null,
    "effectiveDate": "YYYY-MM-DD" or null,
    "expirationDate": "YYYY-MM-DD" or null,
    "liabilityLimit": string or null,
    "vehicleInfo": string or null,
    "documentType": "insurance_card" | "declarations_page" | "certificate" | "binder" | "other"
  },
  "validationResults": {
    "hasRequiredFields": boolean,
    "isExpired": boolean,
    "datesConsistent": boolean
  }
}"#;

/// Prompt for the approve/reject/manual-review verification call.
pub fn verification_prompt(file_name: &str, mime_type: &str, text: Option<&str>) -> Prompt {
    let user = format!(
        "Verify the uploaded insurance document.\n\
         File name: {file_name}\n\
         File type: {mime_type}\n\n\
         {section}\n\n\
         Decision policy:\n\
         - APPROVE if this is a legitimate insurance document (card, certificate, declarations page or binder), even if it is expired.\n\
         - REJECT only if it is clearly not an insurance document (for example a receipt, a selfie, a screenshot of something unrelated, or an identity document).\n\
         - MANUAL_REVIEW when the document is ambiguous, unreadable, or you are not sure.\n\n\
         Return exactly this JSON shape as your entire response:\n{schema}",
        file_name = file_name,
        mime_type = mime_type,
        section = document_section(text, VERIFICATION_TEXT_BUDGET),
        schema = VERIFICATION_SCHEMA,
    );

    Prompt {
        system: VERIFICATION_SYSTEM.to_string(),
        user,
    }
}

const EXTRACTION_SYSTEM: &str = "You extract structured data from vehicle insurance documents. \
Copy values exactly as printed, use null for anything you cannot find, and never guess. \
Respond with a single JSON object and nothing else.";

const EXTRACTION_SCHEMA: &str = r#"{
  "provider": string or null,
  "policyNumber": string or null,
  "policyholderName": string or null,
  "effectiveDate": "YYYY-MM-DD" or null,
  "expirationDate": "YYYY-MM-DD" or null,
  "coverageType": string or null,
  "coverageLimits": {
    "liability": number or null,
    "collision": number or null,
    "comprehensive": number or null
  },
  "isValid": boolean,
  "isExpired": boolean,
  "documentType": "insurance_card" | "declarations_page" | "certificate" | "binder" | "other",
  "validationNotes": string,
  "needsManualReview": boolean,
  "reviewReasons": [string],
  "suspiciousIndicators": [string]
}"#;

/// Prompt for the full field extraction used by the scan pipeline.
pub fn extraction_prompt(file_name: &str, mime_type: &str, text: Option<&str>) -> Prompt {
    let user = format!(
        "Extract the policy details from this insurance document.\n\
         File name: {file_name}\n\
         File type: {mime_type}\n\n\
         {section}\n\n\
         Set isValid to false if the document does not look like a genuine insurance document. \
         List each concrete problem you actually observe, such as edited text or conflicting details, in suspiciousIndicators. \
         Keep validationNotes to a short summary of problems found and leave it empty when there are none; \
         do not describe checks that found nothing. \
         Set needsManualReview to true when any field is unclear.\n\n\
         Return exactly this JSON shape as your entire response:\n{schema}",
        file_name = file_name,
        mime_type = mime_type,
        section = document_section(text, EXTRACTION_TEXT_BUDGET),
        schema = EXTRACTION_SCHEMA,
    );

    Prompt {
        system: EXTRACTION_SYSTEM.to_string(),
        user,
    }
}
