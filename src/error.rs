//! Error taxonomy shared by every engine operation.
//!
//! Every failing operation leaves the stored records exactly as they were before
//! the call; callers can tell from the variant whether a retry makes sense.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or semantically invalid input. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// The transaction is not in a state that permits the operation. Re-fetch before retrying.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Optimistic concurrency conflict. Safe to retry after re-querying candidates.
    #[error("stale state: {0}")]
    StaleState(String),

    /// The caller is not authorized for this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    /// Stable snake_case name of the variant, used in API bodies and audit outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::StaleState(_) => "stale_state",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::NotFound(_) => "not_found",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StaleState(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let e = EngineError::Validation("amount must be positive".into());
        assert_eq!(e.to_string(), "validation error: amount must be positive");
    }

    #[test]
    fn only_stale_state_is_retryable() {
        assert!(EngineError::StaleState("x".into()).is_retryable());
        assert!(!EngineError::InvalidState("x".into()).is_retryable());
        assert!(!EngineError::Forbidden("x".into()).is_retryable());
    }
}
