use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Payload is not a JSON object")]
    NotAnObject,
    #[error("Invalid field: {0}")]
    Field(#[source] serde_json::Error),
    #[error("Invalid readings: expected an object, got {0}")]
    Readings(&'static str),
    #[error("Invalid {field}: {reason}")]
    Constraint {
        field: &'static str,
        reason: std::string::String,
    },
}

impl ValidationError {
    pub(crate) fn constraint(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Constraint {
            field,
            reason: reason.into(),
        }
    }
}
