//! Fakes of the game-server collaborators shared by unit tests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::{
    config::AppConfig,
    dao::{
        memory::MemoryRepository,
        models::TeamEntity,
        repository::{DeleteOutcome, Entity, Repository, UpsertOutcome},
        storage::StorageResult,
    },
    services::team_service::TeamService,
    team::territory::{Region, Vec3},
    world::{Broadcaster, PlayerSession, Spatial},
};

#[derive(Default)]
pub(crate) struct FakeSpatial {
    positions: Mutex<HashMap<String, (String, Vec3)>>,
}

impl FakeSpatial {
    pub(crate) fn place(&self, xuid: &str, world: &str, position: Vec3) {
        self.positions
            .lock()
            .insert(xuid.to_owned(), (world.to_owned(), position));
    }

    pub(crate) fn remove(&self, xuid: &str) {
        self.positions.lock().remove(xuid);
    }
}

impl Spatial for FakeSpatial {
    fn location(&self, xuid: &str) -> Option<(String, Vec3)> {
        self.positions.lock().get(xuid).cloned()
    }

    fn players_within(&self, world: &str, region: &Region) -> Vec<String> {
        let mut inside: Vec<String> = self
            .positions
            .lock()
            .iter()
            .filter(|(_, (at, position))| at == world && region.contains(*position))
            .map(|(xuid, _)| xuid.clone())
            .collect();
        inside.sort();
        inside
    }
}

#[derive(Default)]
pub(crate) struct RecordingBroadcaster {
    sent: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingBroadcaster {
    /// Messages received by `xuid`, oldest first.
    pub(crate) fn received(&self, xuid: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.iter().any(|recipient| recipient == xuid))
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(&self, xuids: &[String], message: &str) {
        self.sent.lock().push((xuids.to_vec(), message.to_owned()));
    }
}

/// Memory store whose writes take `delay` to land.
pub(crate) struct SlowInserts<E> {
    inner: MemoryRepository<E>,
    delay: Duration,
}

impl<E: Entity> SlowInserts<E> {
    pub(crate) fn new(inner: MemoryRepository<E>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<E: Entity> Repository<E> for SlowInserts<E> {
    fn insert(&self, value: E) -> BoxFuture<'static, StorageResult<UpsertOutcome>> {
        let (inner, delay) = (self.inner.clone(), self.delay);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            inner.insert(value).await
        })
    }

    fn delete(&self, id: String) -> BoxFuture<'static, StorageResult<DeleteOutcome>> {
        self.inner.delete(id)
    }

    fn find_one(&self, id: String) -> BoxFuture<'static, StorageResult<E>> {
        self.inner.find_one(id)
    }

    fn find_many(&self, key: String, value: String) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        self.inner.find_many(key, value)
    }

    fn find_all(&self) -> BoxFuture<'static, StorageResult<Vec<E>>> {
        self.inner.find_all()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }
}

pub(crate) fn session(xuid: &str, name: &str) -> PlayerSession {
    PlayerSession {
        xuid: xuid.into(),
        name: name.into(),
    }
}

pub(crate) struct Harness {
    pub(crate) store: MemoryRepository<TeamEntity>,
    pub(crate) chat: Arc<RecordingBroadcaster>,
    pub(crate) service: Arc<TeamService>,
}

pub(crate) fn harness() -> Harness {
    let store = MemoryRepository::<TeamEntity>::new();
    let chat = Arc::new(RecordingBroadcaster::default());
    let service = Arc::new(TeamService::new(
        Arc::new(store.clone()),
        Arc::new(AppConfig::default()),
        chat.clone(),
    ));
    Harness {
        store,
        chat,
        service,
    }
}
