use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    /// No usable base revenue, or no BASE scenario could be computed.
    #[error("Insufficient data: {0}")]
    DataInsufficiency(String),

    /// A value that leaves the closed-form valuation undefined.
    #[error("Invalid parameter: {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    /// A single valuation method failed; callers renormalize over the rest.
    #[error("Method unavailable: {method}: {reason}")]
    MethodUnavailable { method: String, reason: String },

    #[error("No valuation method produced a positive value")]
    NoSurvivingMethod,

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ValuationError {
    pub fn invalid_parameter(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValuationError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn method_unavailable(method: impl Into<String>, reason: impl Into<String>) -> Self {
        ValuationError::MethodUnavailable {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only remove one method or scenario from a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ValuationError::InvalidParameter { .. } | ValuationError::MethodUnavailable { .. }
        )
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::Serialization(e.to_string())
    }
}
