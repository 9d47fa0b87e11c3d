/// Rejected state machine step. Carries the textual state and event so the
/// message survives conversion into `AppError::Conflict`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition from '{from}' on '{event}'")]
pub struct InvalidTransition {
    pub from: String,
    pub event: String,
}

impl InvalidTransition {
    pub fn new(from: impl ToString, event: impl ToString) -> Self {
        Self {
            from: from.to_string(),
            event: event.to_string(),
        }
    }
}
