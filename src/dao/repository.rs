use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};

use crate::dao::storage::StorageResult;

/// A persisted document with a string identity stored in a named collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// Name of the collection documents of this type live in.
    const COLLECTION: &'static str;

    /// Identity used as the document `_id`.
    fn id(&self) -> &str;
}

/// Result of an upsert as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Number of existing documents that matched the identity.
    pub matched: u64,
    /// Number of matched documents whose content changed.
    pub modified: u64,
    /// Whether a new document was created.
    pub upserted: bool,
}

impl UpsertOutcome {
    /// An identical document already existed: nothing was written and nothing created.
    pub fn is_conflict(&self) -> bool {
        self.matched > 0 && self.modified == 0 && !self.upserted
    }

    /// The backend neither matched nor created anything.
    pub fn is_unacknowledged(&self) -> bool {
        self.matched == 0 && !self.upserted
    }
}

/// Result of a delete as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of documents removed.
    pub deleted: u64,
}

/// Persistence port used by the registries. Implementations never touch in-memory state.
pub trait Repository<E: Entity>: Send + Sync {
    /// Insert or replace `value` by its identity.
    fn insert(&self, value: E) -> BoxFuture<'static, StorageResult<UpsertOutcome>>;
    /// Remove the document with identity `id`.
    fn delete(&self, id: String) -> BoxFuture<'static, StorageResult<DeleteOutcome>>;
    /// Fetch one document, failing with [`StorageError::NotFound`](crate::dao::storage::StorageError::NotFound) when absent.
    fn find_one(&self, id: String) -> BoxFuture<'static, StorageResult<E>>;
    /// Fetch every document whose top-level field `key` equals `value`.
    fn find_many(&self, key: String, value: String) -> BoxFuture<'static, StorageResult<Vec<E>>>;
    /// Fetch the whole collection.
    fn find_all(&self) -> BoxFuture<'static, StorageResult<Vec<E>>>;
    /// Cheap round-trip proving the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_match_is_a_conflict() {
        let outcome = UpsertOutcome {
            matched: 1,
            modified: 0,
            upserted: false,
        };
        assert!(outcome.is_conflict());
        assert!(!outcome.is_unacknowledged());
    }

    #[test]
    fn fresh_upsert_is_neither_conflict_nor_unacknowledged() {
        let outcome = UpsertOutcome {
            matched: 0,
            modified: 0,
            upserted: true,
        };
        assert!(!outcome.is_conflict());
        assert!(!outcome.is_unacknowledged());
        assert!(UpsertOutcome::default().is_unacknowledged());
    }
}
