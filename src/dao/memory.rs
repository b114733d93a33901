//! In-process document store backing the [`Repository`] port.
//!
//! Documents are kept as JSON values so the store behaves like a schemaless collection:
//! secondary-key scans compare raw fields and decoding failures surface as corruption.

use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{BoxFuture, ready};
use serde_json::Value;
use thiserror::Error;

use crate::dao::{
    repository::{DeleteOutcome, Entity, Repository, UpsertOutcome},
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Error)]
#[error("in-memory store is offline")]
struct Offline;

/// [`Repository`] implementation holding documents in a concurrent map.
pub struct MemoryRepository<E> {
    inner: Arc<MemoryInner>,
    _entity: PhantomData<fn() -> E>,
}

struct MemoryInner {
    documents: DashMap<String, Value>,
    available: AtomicBool,
}

impl<E> Clone for MemoryRepository<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> MemoryRepository<E> {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                documents: DashMap::new(),
                available: AtomicBool::new(true),
            }),
            _entity: PhantomData,
        }
    }

    /// Toggle availability; while offline every call fails with [`StorageError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.documents.len()
    }

    /// Whether the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.inner.documents.is_empty()
    }

    /// Whether a document with identity `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.inner.documents.contains_key(id)
    }

    /// Store a raw document bypassing encoding, for seeding malformed data.
    pub fn insert_raw(&self, id: impl Into<String>, document: Value) {
        self.inner.documents.insert(id.into(), document);
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                format!("collection `{}` is offline", E::COLLECTION),
                Offline,
            ))
        }
    }

    fn decode(id: &str, document: Value) -> StorageResult<E> {
        serde_json::from_value(document).map_err(|err| StorageError::corrupted(id, err.to_string()))
    }

    fn insert_now(&self, value: E) -> StorageResult<UpsertOutcome> {
        self.ensure_available()?;
        let id = value.id().to_owned();
        let document = serde_json::to_value(&value).map_err(|err| {
            StorageError::unavailable(format!("failed to encode document `{id}`"), err)
        })?;

        let outcome = match self.inner.documents.entry(id) {
            Entry::Occupied(mut entry) => {
                let modified = entry.get() != &document;
                if modified {
                    entry.insert(document);
                }
                UpsertOutcome {
                    matched: 1,
                    modified: u64::from(modified),
                    upserted: false,
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(document);
                UpsertOutcome {
                    matched: 0,
                    modified: 0,
                    upserted: true,
                }
            }
        };
        Ok(outcome)
    }

    fn delete_now(&self, id: &str) -> StorageResult<DeleteOutcome> {
        self.ensure_available()?;
        let deleted = u64::from(self.inner.documents.remove(id).is_some());
        Ok(DeleteOutcome { deleted })
    }

    fn find_one_now(&self, id: &str) -> StorageResult<E> {
        self.ensure_available()?;
        let document = self
            .inner
            .documents
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound {
                collection: E::COLLECTION,
                id: id.to_owned(),
            })?;
        Self::decode(id, document)
    }

    fn scan(&self, predicate: impl Fn(&Value) -> bool) -> StorageResult<Vec<E>> {
        self.ensure_available()?;
        let matches: Vec<(String, Value)> = self
            .inner
            .documents
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        matches
            .into_iter()
            .map(|(id, document)| Self::decode(&id, document))
            .collect()
    }
}

impl<E: Entity> Repository<E> for MemoryRepository<E> {
    fn insert(&self, value: E) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        Box::pin(ready(self.insert_now(value)))
    }

    fn delete(&self, id: String) -> BoxFuture<'static, StorageResult<DeleteOutcome>> {
        Box::pin(ready(self.delete_now(&id)))
    }

    fn find_one(&self, id: String) -> BoxFuture<'static, StorageResult<E>> {
        Box::pin(ready(self.find_one_now(&id)))
    }

    fn find_many(&self, key: String, value: String) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        let result = self.scan(|document| {
            document.get(&key).and_then(Value::as_str) == Some(value.as_str())
        });
        Box::pin(ready(result))
    }

    fn find_all(&self) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        Box::pin(ready(self.scan(|_| true)))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(ready(self.ensure_available()))
    }
}
