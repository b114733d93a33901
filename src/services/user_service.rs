//! Cache of player profiles over the user collection.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dao::{models::UserEntity, repository::Repository, storage::StorageError},
    error::ServiceError,
    services::team_service::TeamService,
    user::User,
    world::PlayerSession,
};

/// Online and recently loaded players, keyed by XUID and by lowercase name.
pub struct UserService {
    repository: Arc<dyn Repository<UserEntity>>,
    config: Arc<AppConfig>,
    users: DashMap<String, Arc<User>>,
    names: DashMap<String, String>,
}

impl UserService {
    /// Empty cache over `repository`.
    pub fn new(repository: Arc<dyn Repository<UserEntity>>, config: Arc<AppConfig>) -> Self {
        Self {
            repository,
            config,
            users: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Load every stored profile into the cache.
    pub async fn hook(&self) -> Result<usize, ServiceError> {
        let entities = tokio::time::timeout(self.config.load_timeout(), self.repository.find_all())
            .await
            .map_err(|_| {
                error!(timeout_ms = self.config.load_timeout_ms, "timed out loading users");
                ServiceError::Timeout
            })?
            .map_err(|err| {
                error!(error = %err, "failed to load users");
                ServiceError::Persistence(err)
            })?;

        let count = entities.len();
        for entity in entities {
            self.cache(Arc::new(User::from(entity)));
        }
        info!(count, "loaded users");
        Ok(count)
    }

    fn cache(&self, user: Arc<User>) {
        self.names
            .insert(user.name().to_lowercase(), user.xuid().to_owned());
        self.users.insert(user.xuid().to_owned(), user);
    }

    /// Cached profile of `xuid`.
    pub fn lookup_by_xuid(&self, xuid: &str) -> Option<Arc<User>> {
        self.users.get(xuid).map(|user| user.clone())
    }

    /// Cached profile named `name`, compared case-insensitively.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<User>> {
        let xuid = self.names.get(&name.to_lowercase())?.clone();
        self.lookup_by_xuid(&xuid)
    }

    /// Persist a fresh profile, then cache it. Players with a cached or stored profile are
    /// refused with `Conflict`.
    pub async fn create(&self, xuid: &str, name: &str) -> Result<Arc<User>, ServiceError> {
        if self.users.contains_key(xuid) {
            return Err(ServiceError::Conflict(format!("{name} already has a profile.")));
        }
        match self.repository.find_one(xuid.to_owned()).await {
            Ok(_) => {
                return Err(ServiceError::Conflict(format!("{name} already has a profile.")));
            }
            Err(StorageError::NotFound { .. }) => {}
            Err(err) => return Err(ServiceError::Persistence(err)),
        }

        let user = User::new(xuid, name);
        let outcome = self.repository.insert(user.to_entity()).await?;
        if outcome.is_conflict() {
            return Err(ServiceError::Conflict(format!("{name} already has a profile.")));
        }
        if outcome.is_unacknowledged() {
            return Err(ServiceError::Persistence(StorageError::Rejected {
                id: xuid.to_owned(),
            }));
        }

        let user = Arc::new(user);
        match self.users.entry(xuid.to_owned()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::Conflict(format!("{name} already has a profile.")));
            }
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
            }
        }
        self.names.insert(name.to_lowercase(), xuid.to_owned());
        info!(xuid, name, "user created");
        Ok(user)
    }

    /// Profile of a joining player: from the cache, else from storage, else freshly created.
    pub async fn handle_join(&self, session: &PlayerSession) -> Result<Arc<User>, ServiceError> {
        if let Some(user) = self.lookup_by_xuid(&session.xuid) {
            return Ok(user);
        }

        match self.repository.find_one(session.xuid.clone()).await {
            Ok(entity) => {
                let user = Arc::new(User::from(entity));
                self.cache(user.clone());
                debug!(xuid = %session.xuid, "user loaded from storage");
                Ok(user)
            }
            Err(StorageError::NotFound { .. }) => {
                match self.create(&session.xuid, &session.name).await {
                    Err(ServiceError::Conflict(_)) => self
                        .lookup_by_xuid(&session.xuid)
                        .ok_or_else(|| ServiceError::invariant("user vanished after a join race")),
                    other => other,
                }
            }
            Err(err) => Err(ServiceError::Persistence(err)),
        }
    }

    /// Save the profile of a leaving player, then drop it from the cache.
    ///
    /// When the save fails the profile stays cached so a later save or shutdown can retry it.
    pub async fn handle_quit(&self, xuid: &str) -> Result<Option<Arc<User>>, ServiceError> {
        let Some(user) = self.lookup_by_xuid(xuid) else {
            return Ok(None);
        };
        if let Err(err) = self.save(&user).await {
            warn!(xuid, error = %err, "failed to save user on quit");
            return Err(err);
        }

        self.users
            .remove_if(xuid, |_, cached| Arc::ptr_eq(cached, &user));
        self.names
            .remove_if(&user.name().to_lowercase(), |_, owner| owner == xuid);
        debug!(xuid, "user unloaded");
        Ok(Some(user))
    }

    /// Count a death for `victim` and a kill for `killer`, and freeze the victim's team DTR.
    pub fn handle_death(
        &self,
        teams: &TeamService,
        victim: &str,
        killer: Option<&str>,
    ) -> Result<(), ServiceError> {
        if let Some(user) = self.lookup_by_xuid(victim) {
            user.tracker().inc_deaths();
        }
        if let Some(user) = killer.and_then(|killer| self.lookup_by_xuid(killer)) {
            user.tracker().inc_kills();
        }
        teams.freeze_dtr_for(victim)?;
        Ok(())
    }

    /// Stored profiles whose recorded name is exactly `name`, including offline players.
    pub async fn find_stored_by_name(&self, name: &str) -> Result<Vec<User>, ServiceError> {
        let entities = self
            .repository
            .find_many("name".into(), name.to_owned())
            .await?;
        Ok(entities.into_iter().map(User::from).collect())
    }

    /// Write `user` to storage.
    pub async fn save(&self, user: &User) -> Result<(), ServiceError> {
        let outcome = self.repository.insert(user.to_entity()).await?;
        if outcome.is_unacknowledged() {
            return Err(ServiceError::Persistence(StorageError::Rejected {
                id: user.xuid().to_owned(),
            }));
        }
        Ok(())
    }

    /// Save every cached profile. All are attempted; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let users: Vec<Arc<User>> = self.users.iter().map(|user| user.clone()).collect();
        let mut saved = 0;
        let mut first_error = None;
        for user in users {
            match self.save(&user).await {
                Ok(()) => saved += 1,
                Err(err) => {
                    warn!(xuid = %user.xuid(), error = %err, "failed to save user on shutdown");
                    first_error.get_or_insert(err);
                }
            }
        }
        info!(count = saved, "saved users");
        first_error.map_or(Ok(()), Err)
    }

    /// Number of cached profiles.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no profile is cached.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
