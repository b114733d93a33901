use std::marker::PhantomData;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection,
    bson::{Document, doc},
    options::IndexOptions,
};
use tracing::warn;

use super::{
    connection::MongoConnection,
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    repository::{DeleteOutcome, Entity, Repository, UpsertOutcome},
    storage::{StorageError, StorageResult},
};

/// MongoDB-backed [`Repository`] for one entity collection.
pub struct MongoRepository<E> {
    connection: MongoConnection,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for MongoRepository<E> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> MongoRepository<E> {
    /// Bind a repository for `E::COLLECTION` on the shared connection.
    pub fn new(connection: MongoConnection) -> Self {
        Self {
            connection,
            _entity: PhantomData,
        }
    }

    /// Create a non-unique index on `field`, used for secondary-key scans.
    pub async fn ensure_index(&self, field: &'static str) -> MongoResult<()> {
        let mut keys = Document::new();
        keys.insert(field, 1);
        let index = mongodb::IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(Some(format!("{}_{field}_idx", E::COLLECTION)))
                    .build(),
            )
            .build();

        self.collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: E::COLLECTION,
                index: field,
                source,
            })?;
        Ok(())
    }

    async fn collection(&self) -> Collection<E> {
        self.connection
            .database()
            .await
            .collection::<E>(E::COLLECTION)
    }

    async fn insert_document(&self, value: E) -> MongoResult<UpsertOutcome> {
        let id = value.id().to_owned();
        let result = self
            .collection()
            .await
            .replace_one(doc_id(&id), &value)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Save {
                collection: E::COLLECTION,
                id,
                source,
            })?;

        Ok(UpsertOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_document(&self, id: String) -> MongoResult<DeleteOutcome> {
        let result = self
            .collection()
            .await
            .delete_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::Delete {
                collection: E::COLLECTION,
                id,
                source,
            })?;

        Ok(DeleteOutcome {
            deleted: result.deleted_count,
        })
    }

    async fn find_document(&self, id: String) -> StorageResult<E> {
        let found = self
            .collection()
            .await
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection: E::COLLECTION,
                id: id.clone(),
                source,
            })?;

        found.ok_or(StorageError::NotFound {
            collection: E::COLLECTION,
            id,
        })
    }

    async fn find_documents(&self, filter: Document) -> MongoResult<Vec<E>> {
        self.collection()
            .await
            .find(filter)
            .await
            .map_err(|source| MongoDaoError::Scan {
                collection: E::COLLECTION,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Scan {
                collection: E::COLLECTION,
                source,
            })
    }
}

impl<E: Entity> Repository<E> for MongoRepository<E> {
    fn insert(&self, value: E) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_document(value).await.map_err(Into::into) })
    }

    fn delete(&self, id: String) -> BoxFuture<'static, StorageResult<DeleteOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.delete_document(id).await.map_err(Into::into) })
    }

    fn find_one(&self, id: String) -> BoxFuture<'static, StorageResult<E>> {
        let store = self.clone();
        Box::pin(async move { store.find_document(id).await })
    }

    fn find_many(&self, key: String, value: String) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut filter = Document::new();
            filter.insert(key, value);
            store.find_documents(filter).await.map_err(Into::into)
        })
    }

    fn find_all(&self) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        let store = self.clone();
        Box::pin(async move { store.find_documents(doc! {}).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let connection = self.connection.clone();
        Box::pin(async move {
            if let Err(err) = connection.ping().await {
                warn!(error = %err, "MongoDB ping failed; reconnecting");
                connection.reconnect().await?;
            }
            Ok::<_, StorageError>(())
        })
    }
}

fn doc_id(id: &str) -> Document {
    doc! { "_id": id }
}
