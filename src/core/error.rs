use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoanError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },
}

impl LoanError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        LoanError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistoryError {
    #[error("Calculation history unavailable: {0}")]
    Storage(String),
}
