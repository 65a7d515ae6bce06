//! Error types for the reconciliation service.

use crate::domain::{Currency, TransactionStatus};

/// Domain-level errors (business logic violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Transaction already finalized as {from}, cannot move to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Errors raised while turning a provider payload into [`WebhookData`](crate::WebhookData).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Payload is missing {0}")]
    MissingField(&'static str),

    #[error("Unrecognised status: {0}")]
    UnknownStatus(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(DomainError::ValidationError(msg)) => AppError::BadRequest(msg),
            RepoError::Domain(DomainError::UnknownProvider(code)) => {
                AppError::NotFound(format!("Unknown provider: {}", code))
            }
            RepoError::Domain(e @ DomainError::InvalidTransition { .. }) => {
                AppError::Unprocessable(e.to_string())
            }
            RepoError::Domain(e) => AppError::BadRequest(e.to_string()),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Unprocessable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_maps_to_unprocessable() {
        let err = RepoError::Domain(DomainError::InvalidTransition {
            from: TransactionStatus::Successful,
            to: TransactionStatus::Failed,
        });
        let app: AppError = err.into();
        assert!(matches!(app, AppError::Unprocessable(msg) if msg.contains("successful")));
    }

    #[test]
    fn test_database_error_maps_to_internal() {
        let app: AppError = RepoError::Database("disk full".into()).into();
        assert!(matches!(app, AppError::Internal(_)));
    }
}
