use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors returned by registry and membership operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested team, user or member does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation clashes with existing state (taken name, pending invite, ...).
    #[error("conflict: {0}")]
    Conflict(String),
    /// Actor lacks the role required for the operation.
    #[error("not allowed: {0}")]
    AuthorizationDenied(String),
    /// Caller supplied an unusable argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Storage backend failed or refused the write.
    #[error("persistence failure")]
    Persistence(#[source] StorageError),
    /// Registry indices disagree with each other.
    #[error("registry invariant violated: {0}")]
    InvariantViolation(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Build an [`ServiceError::InvariantViolation`], logging it at error level.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(%message, "registry invariant violated");
        ServiceError::InvariantViolation(message)
    }

    /// Short feedback suitable for the player who issued the command.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::NotFound(message)
            | ServiceError::Conflict(message)
            | ServiceError::AuthorizationDenied(message)
            | ServiceError::InvalidInput(message) => message.clone(),
            ServiceError::Persistence(_) | ServiceError::Timeout => {
                "Something went wrong while saving, please try again later.".into()
            }
            ServiceError::InvariantViolation(_) => {
                "Something went wrong, please contact an administrator.".into()
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Persistence(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}
