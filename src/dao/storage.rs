use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed while serving the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable summary of the failure.
        message: String,
        /// Backend specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// No document exists for the requested identity.
    #[error("document `{id}` not found in `{collection}`")]
    NotFound {
        /// Collection that was queried.
        collection: &'static str,
        /// Identity that had no match.
        id: String,
    },
    /// A stored document could not be turned back into an aggregate.
    #[error("document `{id}` is corrupted: {reason}")]
    Corrupted {
        /// Identity of the faulty document.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The backend answered but neither matched nor upserted the document.
    #[error("write for `{id}` was not acknowledged by the backend")]
    Rejected {
        /// Identity of the document that was written.
        id: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corruption error for the document `id`.
    pub fn corrupted(id: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
