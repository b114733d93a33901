//! In-memory team registry kept in sync with the team collection.
//!
//! Four indices live behind their own lock: `teams` (id to team), `team_ids` (lowercase name to
//! id), `members` (xuid to id) and `chunks` (world to chunk to ids). Whenever more than one is
//! taken they are acquired in that order, then the create reservations, then any aggregate lock.
//! No index lock is ever held across repository I/O.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    dao::{models::TeamEntity, repository::Repository, storage::StorageError},
    error::ServiceError,
    team::{
        PlayerTeam, Role, SystemTeam, Team, TeamKind,
        territory::{ChunkPos, Region, Vec3},
        tickable::{KothEvent, KothTick},
    },
    world::{Broadcaster, Spatial},
};

mod display;
mod membership;

type ChunkIndex = HashMap<String, HashMap<ChunkPos, IndexSet<String>>>;

/// Something the tick loop observed while advancing timed mechanics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    /// A DTR freeze ran out and was cleared.
    DtrThawed {
        /// Team whose freeze ended.
        team_id: String,
    },
    /// A KoTH objective changed state.
    Koth {
        /// System team owning the objective.
        team_id: String,
        /// Name of that team.
        team_name: String,
        /// What happened.
        event: KothEvent,
    },
}

#[derive(Debug, Default)]
struct Reservations {
    names: HashSet<String>,
    founders: HashSet<String>,
}

/// Claim on a name (and founder) held while a create is being persisted.
struct Reservation<'a> {
    reservations: &'a Mutex<Reservations>,
    name: String,
    founder: Option<String>,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut reservations = self.reservations.lock();
        reservations.names.remove(&self.name);
        if let Some(founder) = &self.founder {
            reservations.founders.remove(founder);
        }
    }
}

/// Every index write-locked at once, in lock order.
struct IndexWriter<'a> {
    teams: RwLockWriteGuard<'a, HashMap<String, Team>>,
    team_ids: RwLockWriteGuard<'a, HashMap<String, String>>,
    members: RwLockWriteGuard<'a, HashMap<String, String>>,
    chunks: RwLockWriteGuard<'a, ChunkIndex>,
}

impl IndexWriter<'_> {
    /// Register `team` in every index. Nothing is touched when any key is already taken.
    fn insert(&mut self, team: &Team) -> Result<(), ServiceError> {
        let id = team.id();
        let key = team.name().to_lowercase();
        if self.teams.contains_key(id) {
            return Err(ServiceError::invariant(format!("team id {id} is cached twice")));
        }
        if let Some(other) = self.team_ids.get(&key) {
            return Err(ServiceError::invariant(format!(
                "team name {key} is used by both {other} and {id}"
            )));
        }

        let members: Vec<String> = team
            .as_player()
            .map(|player| player.members().into_keys().collect())
            .unwrap_or_default();
        if let Some((xuid, other)) = members
            .iter()
            .find_map(|xuid| self.members.get(xuid).map(|other| (xuid, other)))
        {
            return Err(ServiceError::invariant(format!(
                "player {xuid} is a member of both {other} and {id}"
            )));
        }

        self.teams.insert(id.to_owned(), team.clone());
        self.team_ids.insert(key, id.to_owned());
        for xuid in members {
            self.members.insert(xuid, id.to_owned());
        }
        for (world, chunk) in team.tracker().territory().chunks() {
            self.chunks
                .entry(world)
                .or_default()
                .entry(chunk)
                .or_default()
                .insert(id.to_owned());
        }
        Ok(())
    }

    /// Drop every index entry pointing at `id`, returning the evicted members.
    fn remove(&mut self, id: &str) -> Vec<String> {
        self.teams.remove(id);
        self.team_ids.retain(|_, team_id| team_id != id);

        let mut evicted = Vec::new();
        self.members.retain(|xuid, team_id| {
            let keep = team_id != id;
            if !keep {
                evicted.push(xuid.clone());
            }
            keep
        });

        for chunks in self.chunks.values_mut() {
            chunks.retain(|_, ids| {
                ids.shift_remove(id);
                !ids.is_empty()
            });
        }
        self.chunks.retain(|_, chunks| !chunks.is_empty());
        evicted
    }
}

/// Registry of every team, indexed by id, name, member and chunk.
pub struct TeamService {
    repository: Arc<dyn Repository<TeamEntity>>,
    config: Arc<AppConfig>,
    broadcaster: Arc<dyn Broadcaster>,
    teams: RwLock<HashMap<String, Team>>,
    team_ids: RwLock<HashMap<String, String>>,
    members: RwLock<HashMap<String, String>>,
    chunks: RwLock<ChunkIndex>,
    reservations: Mutex<Reservations>,
}

impl TeamService {
    /// Empty registry over `repository`. Call [`TeamService::hook`] to load stored teams.
    pub fn new(
        repository: Arc<dyn Repository<TeamEntity>>,
        config: Arc<AppConfig>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            repository,
            config,
            broadcaster,
            teams: RwLock::new(HashMap::new()),
            team_ids: RwLock::new(HashMap::new()),
            members: RwLock::new(HashMap::new()),
            chunks: RwLock::new(HashMap::new()),
            reservations: Mutex::new(Reservations::default()),
        }
    }

    /// Configuration the registry was built with.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn write_indices(&self) -> IndexWriter<'_> {
        IndexWriter {
            teams: self.teams.write(),
            team_ids: self.team_ids.write(),
            members: self.members.write(),
            chunks: self.chunks.write(),
        }
    }

    /// Load every stored team into the indices. Any failure is fatal for the registry.
    pub async fn hook(&self) -> Result<usize, ServiceError> {
        let entities = tokio::time::timeout(self.config.load_timeout(), self.repository.find_all())
            .await
            .map_err(|_| {
                error!(timeout_ms = self.config.load_timeout_ms, "timed out loading teams");
                ServiceError::Timeout
            })?
            .map_err(|err| {
                error!(error = %err, "failed to load teams");
                ServiceError::Persistence(err)
            })?;

        let teams = entities
            .into_iter()
            .map(Team::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                error!(error = %err, "stored team could not be decoded");
                ServiceError::Persistence(err)
            })?;

        let mut indices = self.write_indices();
        for team in &teams {
            indices.insert(team)?;
        }
        drop(indices);

        info!(count = teams.len(), "loaded teams");
        Ok(teams.len())
    }

    /// Team with identifier `id`.
    pub fn lookup_by_id(&self, id: &str) -> Option<Team> {
        self.teams.read().get(id).cloned()
    }

    /// Team named `name`, compared case-insensitively.
    pub fn lookup_by_name(&self, name: &str) -> Result<Option<Team>, ServiceError> {
        let teams = self.teams.read();
        let team_ids = self.team_ids.read();
        let Some(id) = team_ids.get(&name.to_lowercase()) else {
            return Ok(None);
        };
        match teams.get(id) {
            Some(team) => Ok(Some(team.clone())),
            None => Err(ServiceError::invariant(format!(
                "name {name} points at missing team {id}"
            ))),
        }
    }

    /// Player team `xuid` belongs to.
    pub fn lookup_by_member(&self, xuid: &str) -> Result<Option<Arc<PlayerTeam>>, ServiceError> {
        let teams = self.teams.read();
        let members = self.members.read();
        let Some(id) = members.get(xuid) else {
            return Ok(None);
        };
        match teams.get(id) {
            Some(Team::Player(team)) => Ok(Some(team.clone())),
            Some(Team::System(_)) => Err(ServiceError::invariant(format!(
                "member {xuid} points at system team {id}"
            ))),
            None => Err(ServiceError::invariant(format!(
                "member {xuid} points at missing team {id}"
            ))),
        }
    }

    /// Teams with a claim in the chunk containing `point`.
    pub fn lookup_by_chunk(&self, world: &str, point: Vec3) -> Vec<Team> {
        let teams = self.teams.read();
        let chunks = self.chunks.read();
        let Some(ids) = chunks
            .get(world)
            .and_then(|chunks| chunks.get(&ChunkPos::of(point)))
        else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| {
                let team = teams.get(id).cloned();
                if team.is_none() {
                    error!(team = %id, world, "chunk index points at missing team");
                }
                team
            })
            .collect()
    }

    /// Team whose claim contains `point`.
    pub fn lookup_at(&self, world: &str, point: Vec3) -> Option<Team> {
        self.lookup_by_chunk(world, point)
            .into_iter()
            .find(|team| team.tracker().inside(world, point))
    }

    /// Point `xuid` at `team_id` in the member index.
    pub fn cache_member(&self, xuid: &str, team_id: &str) {
        self.members
            .write()
            .insert(xuid.to_owned(), team_id.to_owned());
    }

    /// Forget `xuid` in the member index.
    pub fn delete_member(&self, xuid: &str) {
        self.members.write().remove(xuid);
    }

    fn validate_name(&self, name: &str) -> Result<(), ServiceError> {
        let bounds = &self.config.name;
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("Team name cannot be empty.".into()));
        }
        if name.trim() != name {
            return Err(ServiceError::InvalidInput(
                "Team name cannot start or end with spaces.".into(),
            ));
        }
        let length = name.chars().count();
        if length < bounds.min_length {
            return Err(ServiceError::InvalidInput(format!(
                "Team name cannot be shorter than {} characters.",
                bounds.min_length
            )));
        }
        if length > bounds.max_length {
            return Err(ServiceError::InvalidInput(format!(
                "Team name cannot be longer than {} characters.",
                bounds.max_length
            )));
        }
        Ok(())
    }

    fn reserve(&self, name: &str, founder: Option<&str>) -> Result<Reservation<'_>, ServiceError> {
        let key = name.to_lowercase();
        let team_ids = self.team_ids.read();
        let members = self.members.read();
        let mut reservations = self.reservations.lock();

        if team_ids.contains_key(&key) || reservations.names.contains(&key) {
            return Err(ServiceError::Conflict(format!(
                "A team named {name} already exists."
            )));
        }
        if let Some(founder) = founder {
            if members.contains_key(founder) || reservations.founders.contains(founder) {
                return Err(ServiceError::Conflict("You are already in a team.".into()));
            }
            reservations.founders.insert(founder.to_owned());
        }
        reservations.names.insert(key.clone());

        Ok(Reservation {
            reservations: &self.reservations,
            name: key,
            founder: founder.map(str::to_owned),
        })
    }

    /// Validate, persist, then index a new team.
    ///
    /// The name and founder stay reserved while the insert is in flight so a concurrent create
    /// cannot claim either. Indices are only touched once the store acknowledged the insert.
    pub async fn create(&self, team: Team) -> Result<Team, ServiceError> {
        self.validate_name(team.name())?;
        let founder = team.as_player().map(|player| player.ownership().to_owned());
        let reservation = self.reserve(team.name(), founder.as_deref())?;

        let outcome = self
            .repository
            .insert(team.to_entity())
            .await
            .map_err(|err| {
                warn!(team = %team.name(), error = %err, "failed to persist new team");
                ServiceError::Persistence(err)
            })?;
        if outcome.is_conflict() {
            return Err(ServiceError::Conflict(format!(
                "A team named {} already exists.",
                team.name()
            )));
        }
        if outcome.is_unacknowledged() {
            warn!(team = %team.name(), "store did not acknowledge new team");
            return Err(ServiceError::Persistence(StorageError::Rejected {
                id: team.id().to_owned(),
            }));
        }

        self.write_indices().insert(&team)?;
        drop(reservation);
        team.tracker().take_dirty();

        info!(team = %team.name(), id = %team.id(), kind = %team.kind(), "team created");
        Ok(team)
    }

    /// Found a player team led by `owner` and announce it to them.
    pub async fn create_player_team(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Arc<PlayerTeam>, ServiceError> {
        let team = self.create(PlayerTeam::new(owner, name).into()).await?;
        self.broadcaster.broadcast(
            &[owner.to_owned()],
            &format!("You have created the team {}.", team.name()),
        );
        team.as_player()
            .cloned()
            .ok_or_else(|| ServiceError::invariant("created player team came back as system team"))
    }

    /// Register a server-owned team.
    pub async fn create_system_team(&self, name: &str) -> Result<Arc<SystemTeam>, ServiceError> {
        let team = self.create(SystemTeam::new(name).into()).await?;
        team.as_system()
            .cloned()
            .ok_or_else(|| ServiceError::invariant("created system team came back as player team"))
    }

    /// Run [`TeamService::create`] on its own task.
    pub fn spawn_create(self: &Arc<Self>, team: Team) -> JoinHandle<Result<Team, ServiceError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.create(team).await })
    }

    /// Delete `id` from storage, then evict it from every index.
    ///
    /// Waits for any save of the team already in flight; saves issued afterwards see the team
    /// retired and skip it. Returns the members that were evicted from the member index. When
    /// the store deletes nothing the indices are left untouched and `NotFound` is returned.
    pub async fn delete(&self, id: &str) -> Result<Vec<String>, ServiceError> {
        let cached = self.lookup_by_id(id);
        let _persisting = match &cached {
            Some(team) => Some(team.tracker().persist_lock().await),
            None => None,
        };
        if let Some(team) = &cached {
            team.tracker().set_retired(true);
        }
        let restore = || {
            if let Some(team) = &cached {
                team.tracker().set_retired(false);
            }
        };

        let outcome = match self.repository.delete(id.to_owned()).await {
            Ok(outcome) => outcome,
            Err(err) => {
                restore();
                warn!(team = %id, error = %err, "failed to delete team");
                return Err(ServiceError::Persistence(err));
            }
        };
        if outcome.deleted == 0 {
            restore();
            return Err(ServiceError::NotFound(format!("Team {id} does not exist.")));
        }

        let evicted = self.write_indices().remove(id);
        info!(team = %id, members = evicted.len(), "team deleted");
        Ok(evicted)
    }

    /// Add `region` in `world` to the claims of `team_id`.
    pub fn claim(&self, team_id: &str, world: &str, region: Region) -> Result<(), ServiceError> {
        let teams = self.teams.read();
        let mut chunks = self.chunks.write();
        let team = teams
            .get(team_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Team {team_id} does not exist.")))?;

        let world_chunks = chunks.entry(world.to_owned()).or_default();
        let overlapping = region
            .chunks()
            .filter_map(|chunk| world_chunks.get(&chunk))
            .flatten()
            .filter(|id| id.as_str() != team_id)
            .filter_map(|id| teams.get(id))
            .find(|other| {
                other
                    .tracker()
                    .territory()
                    .regions(world)
                    .iter()
                    .any(|claimed| claimed.intersects(&region))
            });
        if let Some(other) = overlapping {
            return Err(ServiceError::Conflict(format!(
                "That land overlaps the claim of {}.",
                other.name()
            )));
        }

        team.tracker().claim(world, region);
        for chunk in region.chunks() {
            world_chunks
                .entry(chunk)
                .or_default()
                .insert(team_id.to_owned());
        }
        info!(team = %team.name(), world, "territory claimed");
        Ok(())
    }

    fn system_team(&self, team_id: &str) -> Result<Arc<SystemTeam>, ServiceError> {
        match self.lookup_by_id(team_id) {
            Some(Team::System(team)) => Ok(team),
            Some(Team::Player(_)) => Err(ServiceError::InvalidInput(
                "KoTH objectives belong to system teams.".into(),
            )),
            None => Err(ServiceError::NotFound(format!("Team {team_id} does not exist."))),
        }
    }

    /// Attach a capture objective to a system team.
    pub fn attach_koth(&self, team_id: &str, koth: KothTick) -> Result<(), ServiceError> {
        let team = self.system_team(team_id)?;
        team.set_koth(koth);
        info!(team = %team.tracker().name(), "KoTH attached");
        Ok(())
    }

    /// Put a system team's objective back to idle.
    pub fn reset_koth(&self, team_id: &str) -> Result<(), ServiceError> {
        let team = self.system_team(team_id)?;
        if !team.reset_koth() {
            return Err(ServiceError::NotFound(format!(
                "{} has no KoTH objective.",
                team.tracker().name()
            )));
        }
        Ok(())
    }

    /// Freeze the DTR of the team `xuid` belongs to. Returns the freeze applied, if any.
    pub fn freeze_dtr_for(&self, xuid: &str) -> Result<Option<Duration>, ServiceError> {
        let Some(team) = self.lookup_by_member(xuid)? else {
            return Ok(None);
        };
        team.update_dtr_remaining(self.config.dtr_freeze_secs);
        debug!(team = %team.tracker().name(), xuid, "DTR frozen");
        Ok(Some(self.config.dtr_freeze()))
    }

    /// Advance every timed mechanic by one tick.
    pub fn do_tick(&self, spatial: &dyn Spatial) -> Vec<TickEvent> {
        self.do_tick_at(SystemTime::now(), Instant::now(), spatial)
    }

    /// [`TeamService::do_tick`] with explicit clocks.
    ///
    /// Tickable teams are collected under the id read lock, which is released before any of them
    /// is advanced.
    pub fn do_tick_at(
        &self,
        wall: SystemTime,
        now: Instant,
        spatial: &dyn Spatial,
    ) -> Vec<TickEvent> {
        let (frozen, objectives, eligible) = {
            let teams = self.teams.read();
            let mut frozen = Vec::new();
            let mut objectives = Vec::new();
            for team in teams.values() {
                match team {
                    Team::Player(player) if player.is_frozen() => frozen.push(player.clone()),
                    Team::System(system) if system.has_active_koth() => {
                        objectives.push(system.clone())
                    }
                    _ => {}
                }
            }
            let eligible: HashSet<String> = if objectives.is_empty() {
                HashSet::new()
            } else {
                self.members.read().keys().cloned().collect()
            };
            (frozen, objectives, eligible)
        };

        let mut events = Vec::new();
        for team in frozen {
            if team.thaw_at(wall) {
                debug!(team = %team.tracker().name(), "DTR freeze ended");
                events.push(TickEvent::DtrThawed {
                    team_id: team.tracker().id().to_owned(),
                });
            }
        }
        for team in objectives {
            if let Some(event) = team.tick_koth(now, spatial, |xuid| eligible.contains(xuid)) {
                events.push(TickEvent::Koth {
                    team_id: team.tracker().id().to_owned(),
                    team_name: team.tracker().name().to_owned(),
                    event,
                });
            }
        }
        events
    }

    /// Tell every team member about a tick event worth announcing.
    pub fn announce(&self, event: &TickEvent) {
        let TickEvent::Koth {
            team_name, event, ..
        } = event
        else {
            return;
        };
        let message = match event {
            KothEvent::CaptureStarted { .. } => format!("Someone is capturing {team_name}."),
            KothEvent::CaptureLost { .. } => format!("{team_name} is no longer being captured."),
            KothEvent::Captured { by } => {
                let winner = self
                    .lookup_by_member(by)
                    .ok()
                    .flatten()
                    .map(|team| team.tracker().name().to_owned())
                    .unwrap_or_else(|| by.clone());
                format!("{team_name} has been captured by {winner}.")
            }
        };
        let recipients: Vec<String> = self.members.read().keys().cloned().collect();
        self.broadcaster.broadcast(&recipients, &message);
    }

    /// Write `team` to storage. Retired teams are skipped.
    pub async fn save(&self, team: &Team) -> Result<(), ServiceError> {
        let _persisting = team.tracker().persist_lock().await;
        if team.tracker().is_retired() {
            debug!(team = %team.name(), "skipping save of deleted team");
            return Ok(());
        }
        let outcome = self
            .repository
            .insert(team.to_entity())
            .await
            .map_err(ServiceError::Persistence)?;
        if outcome.is_unacknowledged() {
            return Err(ServiceError::Persistence(StorageError::Rejected {
                id: team.id().to_owned(),
            }));
        }
        Ok(())
    }

    fn snapshot(&self) -> Vec<Team> {
        self.teams.read().values().cloned().collect()
    }

    /// Save every team changed since its last save. Returns how many were written.
    pub async fn flush_dirty(&self) -> usize {
        let mut saved = 0;
        for team in self.snapshot() {
            if !team.tracker().take_dirty() {
                continue;
            }
            match self.save(&team).await {
                Ok(()) => saved += 1,
                Err(err) => {
                    team.tracker().mark_dirty();
                    warn!(team = %team.name(), error = %err, "autosave failed");
                }
            }
        }
        if saved > 0 {
            debug!(saved, "autosaved teams");
        }
        saved
    }

    /// Save every cached team. All teams are attempted; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let mut players = 0;
        let mut systems = 0;
        let mut first_error = None;

        for team in self.snapshot() {
            match self.save(&team).await {
                Ok(()) => match team.kind() {
                    TeamKind::Player => players += 1,
                    TeamKind::System => systems += 1,
                },
                Err(err) => {
                    error!(team = %team.name(), error = %err, "failed to save team on shutdown");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(count = players, "saved player teams");
        info!(count = systems, "saved system teams");
        first_error.map_or(Ok(()), Err)
    }

    /// Round-trip to the team collection.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.repository
            .health_check()
            .await
            .map_err(ServiceError::Persistence)
    }

    /// Number of cached teams.
    pub fn len(&self) -> usize {
        self.teams.read().len()
    }

    /// Whether no team is cached.
    pub fn is_empty(&self) -> bool {
        self.teams.read().is_empty()
    }

    /// Cross-check every index against the id index and the rosters.
    pub fn check_consistency(&self) -> Result<(), ServiceError> {
        let teams = self.teams.read();
        let team_ids = self.team_ids.read();
        let members = self.members.read();
        let chunks = self.chunks.read();

        for (id, team) in teams.iter() {
            if team_ids.get(&team.name().to_lowercase()) != Some(id) {
                return Err(ServiceError::invariant(format!(
                    "team {id} is not reachable by its name"
                )));
            }
            if let Team::Player(player) = team {
                for xuid in player.members().keys() {
                    if members.get(xuid) != Some(id) {
                        return Err(ServiceError::invariant(format!(
                            "member {xuid} of {id} is not indexed to it"
                        )));
                    }
                }
            }
        }
        for (name, id) in team_ids.iter() {
            if !teams.contains_key(id) {
                return Err(ServiceError::invariant(format!(
                    "name {name} points at missing team {id}"
                )));
            }
        }
        for (xuid, id) in members.iter() {
            match teams.get(id) {
                Some(Team::Player(player)) if player.member(xuid) != Role::Undefined => {}
                _ => {
                    return Err(ServiceError::invariant(format!(
                        "member index entry {xuid} -> {id} has no matching roster"
                    )));
                }
            }
        }
        for ids in chunks.values().flat_map(HashMap::values) {
            if let Some(id) = ids.iter().find(|id| !teams.contains_key(*id)) {
                return Err(ServiceError::invariant(format!(
                    "chunk index points at missing team {id}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::{
        dao::{memory::MemoryRepository, repository::UpsertOutcome},
        team::tracker::DISPLAY_NAME,
        testing::{FakeSpatial, RecordingBroadcaster, SlowInserts, harness},
    };

    fn region(a: (f64, f64, f64), b: (f64, f64, f64)) -> Region {
        Region::new(Vec3::new(a.0, a.1, a.2), Vec3::new(b.0, b.1, b.2))
    }

    #[tokio::test]
    async fn created_team_is_reachable_from_every_index() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();

        let by_name = h.service.lookup_by_name("alpha").unwrap().unwrap();
        let by_member = h.service.lookup_by_member("P1").unwrap().unwrap();
        assert_eq!(by_name.id(), id);
        assert_eq!(by_member.tracker().id(), id);
        assert!(h.service.lookup_by_id(&id).is_some());
        assert!(h.store.contains(&id));
        assert!(h.service.check_consistency().is_ok());
        assert_eq!(
            h.chat.received("P1"),
            vec!["You have created the team Alpha.".to_owned()]
        );
    }

    #[tokio::test]
    async fn unknown_identifiers_are_absent_not_errors() {
        let h = harness();
        assert!(h.service.lookup_by_id("nope").is_none());
        assert!(h.service.lookup_by_name("nope").unwrap().is_none());
        assert!(h.service.lookup_by_member("P9").unwrap().is_none());
    }

    #[tokio::test]
    async fn names_are_unique_ignoring_case() {
        let h = harness();
        h.service.create_player_team("P1", "Alpha").await.unwrap();
        let err = h.service.create_player_team("P2", "ALPHA").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(h.service.len(), 1);
    }

    #[tokio::test]
    async fn founder_cannot_create_a_second_team() {
        let h = harness();
        h.service.create_player_team("P1", "Alpha").await.unwrap();
        let err = h.service.create_player_team("P1", "Beta").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(h.service.lookup_by_name("beta").unwrap().is_none());
    }

    #[tokio::test]
    async fn names_outside_bounds_are_rejected() {
        let h = harness();
        for name in ["", "   ", "ab", "ThisNameIsFarTooLong", " Alpha"] {
            let err = h.service.create_player_team("P1", name).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)), "{name:?}");
        }
        assert!(h.service.create_player_team("P1", "Ünïcødé").await.is_ok());
        assert!(h.store.len() == 1);
    }

    #[tokio::test]
    async fn failed_persist_leaves_indices_untouched() {
        let h = harness();
        h.store.set_available(false);
        let err = h.service.create_player_team("P1", "Alpha").await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(h.service.is_empty());
        assert!(h.service.lookup_by_member("P1").unwrap().is_none());

        h.store.set_available(true);
        assert!(h.service.create_player_team("P1", "Alpha").await.is_ok());
    }

    #[tokio::test]
    async fn matched_but_unmodified_insert_is_a_conflict() {
        let h = harness();
        let team: Team = PlayerTeam::new("P1", "Alpha").into();
        h.store.insert(team.to_entity()).await.unwrap();

        let err = h.service.create(team).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(h.service.is_empty());
    }

    #[test]
    fn conflict_outcome_shape() {
        let outcome = UpsertOutcome {
            matched: 1,
            modified: 0,
            upserted: false,
        };
        assert!(outcome.is_conflict());
    }

    #[tokio::test]
    async fn spawned_create_reports_its_result() {
        let h = harness();
        let handle = h.service.spawn_create(SystemTeam::new("Spawn").into());
        let team = handle.await.unwrap().unwrap();
        assert_eq!(team.kind(), TeamKind::System);

        let handle = h.service.spawn_create(SystemTeam::new("spawn").into());
        assert!(matches!(handle.await.unwrap(), Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn concurrent_creates_of_one_name_admit_exactly_one() {
        let h = harness();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                h.service
                    .spawn_create(PlayerTeam::new(format!("P{i}"), "Alpha").into())
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(h.store.len(), 1);
        assert!(h.service.check_consistency().is_ok());
    }

    #[tokio::test]
    async fn delete_evicts_team_and_every_member() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();
        alpha.roster_mut().add_member("P2", Role::Member);
        h.service.cache_member("P2", &id);
        h.service
            .claim(&id, "overworld", region((0.0, 0.0, 0.0), (20.0, 100.0, 20.0)))
            .unwrap();

        let mut evicted = h.service.delete(&id).await.unwrap();
        evicted.sort();
        assert_eq!(evicted, vec!["P1", "P2"]);
        assert!(h.service.lookup_by_id(&id).is_none());
        assert!(h.service.lookup_by_name("alpha").unwrap().is_none());
        assert!(h.service.lookup_by_member("P1").unwrap().is_none());
        assert!(h.service.lookup_by_member("P2").unwrap().is_none());
        assert!(h.service.lookup_by_chunk("overworld", Vec3::new(1.0, 1.0, 1.0)).is_empty());
        assert!(!h.store.contains(&id));
        assert!(alpha.tracker().is_retired());
    }

    #[tokio::test]
    async fn delete_of_unstored_team_changes_nothing() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();
        h.store.delete(id.clone()).await.unwrap();

        let err = h.service.delete(&id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(h.service.lookup_by_id(&id).is_some());
        assert!(h.service.lookup_by_member("P1").unwrap().is_some());
        assert!(!alpha.tracker().is_retired());
    }

    #[tokio::test]
    async fn delete_during_outage_changes_nothing() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.store.set_available(false);
        let err = h.service.delete(alpha.tracker().id()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Persistence(_)));
        assert!(h.service.lookup_by_name("Alpha").unwrap().is_some());
    }

    #[tokio::test]
    async fn dangling_member_entry_is_an_invariant_violation() {
        let h = harness();
        h.service.cache_member("P7", "ghost");
        assert!(matches!(
            h.service.lookup_by_member("P7"),
            Err(ServiceError::InvariantViolation(_))
        ));
        assert!(h.service.check_consistency().is_err());
    }

    #[tokio::test]
    async fn member_entry_pointing_at_system_team_is_an_invariant_violation() {
        let h = harness();
        let spawn = h.service.create_system_team("Spawn").await.unwrap();
        h.service.cache_member("P1", spawn.tracker().id());
        assert!(matches!(
            h.service.lookup_by_member("P1"),
            Err(ServiceError::InvariantViolation(_))
        ));

        h.service.delete_member("P1");
        assert!(h.service.lookup_by_member("P1").unwrap().is_none());
    }

    #[tokio::test]
    async fn spatial_lookups_resolve_claims() {
        let h = harness();
        let spawn = h.service.create_system_team("Spawn").await.unwrap();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.service
            .claim(spawn.tracker().id(), "overworld", region((0.0, 0.0, 0.0), (8.0, 256.0, 8.0)))
            .unwrap();
        h.service
            .claim(alpha.tracker().id(), "overworld", region((8.0, 0.0, 0.0), (15.0, 256.0, 8.0)))
            .unwrap();

        let same_chunk = h.service.lookup_by_chunk("overworld", Vec3::new(12.0, 64.0, 4.0));
        assert_eq!(same_chunk.len(), 2);
        let at = h.service.lookup_at("overworld", Vec3::new(12.0, 64.0, 4.0)).unwrap();
        assert_eq!(at.id(), alpha.tracker().id());
        assert!(h.service.lookup_at("nether", Vec3::new(12.0, 64.0, 4.0)).is_none());
        assert!(h.service.lookup_at("overworld", Vec3::new(100.0, 64.0, 4.0)).is_none());
    }

    #[tokio::test]
    async fn overlapping_claims_are_refused() {
        let h = harness();
        let spawn = h.service.create_system_team("Spawn").await.unwrap();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.service
            .claim(spawn.tracker().id(), "overworld", region((0.0, 0.0, 0.0), (20.0, 256.0, 20.0)))
            .unwrap();

        let err = h
            .service
            .claim(alpha.tracker().id(), "overworld", region((10.0, 0.0, 10.0), (30.0, 256.0, 30.0)))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert!(alpha.tracker().territory().is_empty());
    }

    #[tokio::test]
    async fn hook_rebuilds_every_index() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        alpha.roster_mut().add_member("P2", Role::Officer);
        h.service.cache_member("P2", alpha.tracker().id());
        h.service
            .claim(alpha.tracker().id(), "overworld", region((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)))
            .unwrap();
        h.service.create_system_team("Spawn").await.unwrap();
        h.service.shutdown().await.unwrap();

        let reloaded = TeamService::new(
            Arc::new(h.store.clone()),
            Arc::new(AppConfig::default()),
            h.chat.clone(),
        );
        assert_eq!(reloaded.hook().await.unwrap(), 2);
        let team = reloaded.lookup_by_member("P2").unwrap().unwrap();
        assert_eq!(team.member("P2"), Role::Officer);
        assert!(reloaded.lookup_at("overworld", Vec3::new(5.0, 5.0, 5.0)).is_some());
        assert!(reloaded.check_consistency().is_ok());
    }

    #[tokio::test]
    async fn hook_fails_on_outage_or_corruption() {
        let store = MemoryRepository::<TeamEntity>::new();
        let service = TeamService::new(
            Arc::new(store.clone()),
            Arc::new(AppConfig::default()),
            Arc::new(crate::world::Headless),
        );
        store.set_available(false);
        assert!(matches!(service.hook().await, Err(ServiceError::Persistence(_))));

        store.set_available(true);
        store.insert_raw("t-1", json!({ "_id": "t-1", "name": "Alpha", "type": "Player" }));
        assert!(matches!(
            service.hook().await,
            Err(ServiceError::Persistence(StorageError::Corrupted { .. }))
        ));
        assert!(service.is_empty());
    }

    #[tokio::test]
    async fn save_skips_retired_teams() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();
        h.service.delete(&id).await.unwrap();

        h.service.save(&Team::Player(alpha)).await.unwrap();
        assert!(!h.store.contains(&id));
    }

    #[tokio::test]
    async fn delete_waits_for_an_in_flight_save() {
        let store = MemoryRepository::<TeamEntity>::new();
        let service = Arc::new(TeamService::new(
            Arc::new(SlowInserts::new(store.clone(), Duration::from_millis(50))),
            Arc::new(AppConfig::default()),
            Arc::new(RecordingBroadcaster::default()),
        ));
        let alpha = service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();
        alpha.tracker().add_points(1);

        let flushing = {
            let service = service.clone();
            tokio::spawn(async move { service.flush_dirty().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        service.delete(&id).await.unwrap();
        flushing.await.unwrap();

        assert!(service.lookup_by_id(&id).is_none());
        assert!(!store.contains(&id));

        let restarted = TeamService::new(
            Arc::new(store.clone()),
            Arc::new(AppConfig::default()),
            Arc::new(RecordingBroadcaster::default()),
        );
        assert_eq!(restarted.hook().await.unwrap(), 0);
        assert!(restarted.lookup_by_name("alpha").unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_dirty_writes_only_changed_teams() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.service.create_player_team("P2", "Beta").await.unwrap();
        assert_eq!(h.service.flush_dirty().await, 0);

        alpha.tracker().set_option(DISPLAY_NAME, json!("§6Alpha"));
        assert_eq!(h.service.flush_dirty().await, 1);
        let stored = h.store.find_one(alpha.tracker().id().to_owned()).await.unwrap();
        assert_eq!(stored.options[DISPLAY_NAME], json!("§6Alpha"));
    }

    #[tokio::test]
    async fn failed_autosave_keeps_the_team_dirty() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        alpha.tracker().add_points(5);

        h.store.set_available(false);
        assert_eq!(h.service.flush_dirty().await, 0);
        assert!(h.service.shutdown().await.is_err());

        h.store.set_available(true);
        assert_eq!(h.service.flush_dirty().await, 1);
    }

    #[tokio::test]
    async fn tick_thaws_expired_freezes() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        assert_eq!(h.service.freeze_dtr_for("P1").unwrap(), Some(Duration::from_secs(120)));
        assert_eq!(h.service.freeze_dtr_for("P9").unwrap(), None);

        let spatial = FakeSpatial::default();
        let now = SystemTime::now();
        assert!(h.service.do_tick_at(now, Instant::now(), &spatial).is_empty());

        let events = h.service.do_tick_at(
            now + Duration::from_secs(121),
            Instant::now(),
            &spatial,
        );
        assert_eq!(
            events,
            vec![TickEvent::DtrThawed {
                team_id: alpha.tracker().id().to_owned()
            }]
        );
        assert!(!alpha.is_frozen());
    }

    #[tokio::test]
    async fn tick_drives_koth_for_team_members_only() {
        let h = harness();
        let citadel = h.service.create_system_team("Citadel").await.unwrap();
        h.service.create_player_team("P1", "Alpha").await.unwrap();
        h.service
            .attach_koth(
                citadel.tracker().id(),
                KothTick::new(
                    "overworld",
                    region((0.0, 0.0, 0.0), (10.0, 10.0, 10.0)),
                    Duration::from_secs(60),
                ),
            )
            .unwrap();

        let spatial = FakeSpatial::default();
        spatial.place("P9", "overworld", Vec3::new(5.0, 5.0, 5.0));
        let start = Instant::now();
        let wall = SystemTime::now();
        assert!(h.service.do_tick_at(wall, start, &spatial).is_empty());

        spatial.place("P1", "overworld", Vec3::new(5.0, 5.0, 5.0));
        let events = h.service.do_tick_at(wall, start, &spatial);
        assert!(matches!(
            events.as_slice(),
            [TickEvent::Koth { event: KothEvent::CaptureStarted { by }, .. }] if by == "P1"
        ));

        let events = h
            .service
            .do_tick_at(wall, start + Duration::from_secs(60), &spatial);
        assert!(matches!(
            events.as_slice(),
            [TickEvent::Koth { event: KothEvent::Captured { .. }, .. }]
        ));
        h.service.announce(&events[0]);
        assert_eq!(
            h.chat.received("P1").last().map(String::as_str),
            Some("Citadel has been captured by Alpha.")
        );

        assert!(h.service.do_tick_at(wall, start + Duration::from_secs(61), &spatial).is_empty());
        h.service.reset_koth(citadel.tracker().id()).unwrap();
        assert!(citadel.has_active_koth());
    }

    #[tokio::test]
    async fn koth_only_attaches_to_system_teams() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let koth = KothTick::new(
            "overworld",
            region((0.0, 0.0, 0.0), (1.0, 1.0, 1.0)),
            Duration::from_secs(1),
        );
        assert!(matches!(
            h.service.attach_koth(alpha.tracker().id(), koth),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            h.service.reset_koth("ghost"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn lookups_stay_consistent_under_concurrent_churn() {
        let h = harness();
        let alpha = h.service.create_player_team("P1", "Alpha").await.unwrap();
        let id = alpha.tracker().id().to_owned();

        thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    let xuid = format!("X{}", i % 10);
                    if alpha.member(&xuid) == Role::Undefined {
                        alpha.roster_mut().add_member(&xuid, Role::Member);
                        h.service.cache_member(&xuid, &id);
                    } else {
                        h.service.delete_member(&xuid);
                        alpha.roster_mut().remove_member(&xuid);
                    }
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        assert!(h.service.lookup_by_member("P1").unwrap().is_some());
                        assert!(h.service.lookup_by_name("ALPHA").unwrap().is_some());
                        let _ = h.service.do_tick(&crate::world::Headless);
                    }
                });
            }
        });
    }
}
