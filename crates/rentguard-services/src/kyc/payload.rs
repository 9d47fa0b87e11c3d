//! Vendor callback payloads.
//!
//! The vendor sends two shapes to the same endpoint: lifecycle events
//! (`{id, action, vendorData}`) and decisions (`{verification: {...}}`).

use rentguard_core::models::ReviewResult;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Decision payload has no session id")]
    MissingSessionId,
    #[error("Unknown decision code {0}")]
    UnknownDecisionCode(i64),
    #[error("Unrecognized event: {0}")]
    UnrecognizedEvent(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorPerson {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorDocument {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default, rename = "type")]
    pub document_type: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorVerification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub person: Option<VendorPerson>,
    #[serde(default)]
    pub document: Option<VendorDocument>,
    #[serde(default)]
    pub vendor_data: Option<String>,
}

impl VendorVerification {
    pub fn document_number(&self) -> Option<&str> {
        self.document
            .as_ref()
            .and_then(|d| d.number.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycWebhookPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub vendor_data: Option<String>,
    #[serde(default)]
    pub verification: Option<VendorVerification>,
}

/// What a callback asks the pipeline to do.
#[derive(Debug, Clone)]
pub enum KycEvent {
    Started {
        session_id: Option<String>,
    },
    Submitted {
        session_id: String,
        customer_id: Option<Uuid>,
    },
    Decision {
        session_id: String,
        result: ReviewResult,
        customer_id: Option<Uuid>,
        verification: VendorVerification,
    },
}

/// Customer reference the booking flow put into `vendorData`.
fn parse_customer_ref(value: Option<&str>) -> Option<Uuid> {
    let value = value?.trim();
    match Uuid::parse_str(value) {
        Ok(id) => Some(id),
        Err(_) => {
            if !value.is_empty() {
                tracing::debug!(vendor_data = %value, "vendorData is not a customer id");
            }
            None
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl KycWebhookPayload {
    pub fn classify(self) -> Result<KycEvent, PayloadError> {
        if let Some(verification) = self.verification {
            if let Some(code) = verification.code {
                let result = ReviewResult::from_vendor_code(code)
                    .ok_or(PayloadError::UnknownDecisionCode(code))?;
                let session_id = non_empty(verification.id.as_ref())
                    .or_else(|| non_empty(self.id.as_ref()))
                    .ok_or(PayloadError::MissingSessionId)?;
                let customer_id = parse_customer_ref(
                    verification
                        .vendor_data
                        .as_deref()
                        .or(self.vendor_data.as_deref()),
                );
                return Ok(KycEvent::Decision {
                    session_id,
                    result,
                    customer_id,
                    verification,
                });
            }
        }

        let action = self
            .action
            .as_deref()
            .map(|a| a.trim().to_lowercase())
            .unwrap_or_default();
        match action.as_str() {
            "started" => Ok(KycEvent::Started {
                session_id: non_empty(self.id.as_ref()),
            }),
            "submitted" => Ok(KycEvent::Submitted {
                session_id: non_empty(self.id.as_ref()).ok_or(PayloadError::MissingSessionId)?,
                customer_id: parse_customer_ref(self.vendor_data.as_deref()),
            }),
            "" => Err(PayloadError::UnrecognizedEvent(
                "payload has neither an action nor a decision".to_string(),
            )),
            other => Err(PayloadError::UnrecognizedEvent(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<KycEvent, PayloadError> {
        serde_json::from_value::<KycWebhookPayload>(value)
            .unwrap()
            .classify()
    }

    #[test]
    fn test_started_event() {
        let event = parse(json!({"id": "sess-1", "action": "started", "code": 7001})).unwrap();
        assert!(matches!(event, KycEvent::Started { session_id: Some(id) } if id == "sess-1"));
    }

    #[test]
    fn test_submitted_event_reads_customer_ref() {
        let customer = Uuid::new_v4();
        let event = parse(json!({
            "id": "sess-1",
            "action": "submitted",
            "vendorData": customer.to_string()
        }))
        .unwrap();
        match event {
            KycEvent::Submitted {
                session_id,
                customer_id,
            } => {
                assert_eq!(session_id, "sess-1");
                assert_eq!(customer_id, Some(customer));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decision_event() {
        let event = parse(json!({
            "status": "success",
            "verification": {
                "id": "sess-2",
                "code": 9102,
                "status": "declined",
                "reason": "Document expired",
                "vendorData": "not-a-uuid",
                "document": {"number": " AB 123 ", "type": "PASSPORT", "country": "EE"},
                "person": {"firstName": "Jane", "lastName": "Driver"}
            }
        }))
        .unwrap();
        match event {
            KycEvent::Decision {
                session_id,
                result,
                customer_id,
                verification,
            } => {
                assert_eq!(session_id, "sess-2");
                assert_eq!(result, ReviewResult::Red);
                assert_eq!(customer_id, None);
                assert_eq!(verification.document_number(), Some("AB 123"));
                assert_eq!(
                    verification.document.unwrap().document_type.as_deref(),
                    Some("PASSPORT")
                );
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_decision_code_is_rejected() {
        let err = parse(json!({"verification": {"id": "sess-3", "code": 9104}})).unwrap_err();
        assert_eq!(err, PayloadError::UnknownDecisionCode(9104));
    }

    #[test]
    fn test_decision_without_session_is_rejected() {
        let err = parse(json!({"verification": {"code": 9001}})).unwrap_err();
        assert_eq!(err, PayloadError::MissingSessionId);
    }

    #[test]
    fn test_unrecognized_payloads() {
        assert!(matches!(
            parse(json!({"id": "sess-4", "action": "exploded"})),
            Err(PayloadError::UnrecognizedEvent(_))
        ));
        assert!(matches!(
            parse(json!({"verification": {"id": "sess-4"}})),
            Err(PayloadError::UnrecognizedEvent(_))
        ));
    }
}
