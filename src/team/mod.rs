//! Team aggregates and their persisted shape.

use std::{fmt, sync::Arc};

use indexmap::{IndexMap, IndexSet};

use crate::dao::{
    models::{TeamEntity, TeamKindEntity},
    storage::StorageError,
};

/// Player-founded teams and their roster.
pub mod player;
/// Membership ranks.
pub mod role;
/// Server-owned teams.
pub mod system;
/// Claimed land and home locations.
pub mod territory;
pub mod tickable;
/// State shared by every team kind.
pub mod tracker;

pub use player::{PlayerTeam, Roster};
pub use role::Role;
pub use system::SystemTeam;
pub use tracker::TeamTracker;

use territory::Territory;
use tickable::DtrTick;

/// Kind of a team, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamKind {
    /// Founded by a player.
    Player,
    /// Owned by the server.
    System,
}

impl fmt::Display for TeamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamKind::Player => f.write_str("player"),
            TeamKind::System => f.write_str("system"),
        }
    }
}

impl From<TeamKindEntity> for TeamKind {
    fn from(value: TeamKindEntity) -> Self {
        match value {
            TeamKindEntity::Player => TeamKind::Player,
            TeamKindEntity::System => TeamKind::System,
        }
    }
}

impl From<TeamKind> for TeamKindEntity {
    fn from(value: TeamKind) -> Self {
        match value {
            TeamKind::Player => TeamKindEntity::Player,
            TeamKind::System => TeamKindEntity::System,
        }
    }
}

/// Shared handle to a team of either kind.
#[derive(Debug, Clone)]
pub enum Team {
    /// Player-run team.
    Player(Arc<PlayerTeam>),
    /// Server-owned team.
    System(Arc<SystemTeam>),
}

impl Team {
    /// Shared state of the team.
    pub fn tracker(&self) -> &TeamTracker {
        match self {
            Team::Player(team) => team.tracker(),
            Team::System(team) => team.tracker(),
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> &str {
        self.tracker().id()
    }

    /// Name given at creation.
    pub fn name(&self) -> &str {
        self.tracker().name()
    }

    /// Player or system.
    pub fn kind(&self) -> TeamKind {
        self.tracker().kind()
    }

    /// The player team, if this is one.
    pub fn as_player(&self) -> Option<&Arc<PlayerTeam>> {
        match self {
            Team::Player(team) => Some(team),
            Team::System(_) => None,
        }
    }

    /// The system team, if this is one.
    pub fn as_system(&self) -> Option<&Arc<SystemTeam>> {
        match self {
            Team::System(team) => Some(team),
            Team::Player(_) => None,
        }
    }

    /// Whether both handles point at the same aggregate.
    pub fn ptr_eq(&self, other: &Team) -> bool {
        match (self, other) {
            (Team::Player(a), Team::Player(b)) => Arc::ptr_eq(a, b),
            (Team::System(a), Team::System(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Snapshot the team into its stored document.
    pub fn to_entity(&self) -> TeamEntity {
        let tracker = self.tracker();
        let mut entity = TeamEntity {
            id: tracker.id().to_owned(),
            name: tracker.name().to_owned(),
            kind: tracker.kind().into(),
            ownership: None,
            members: IndexMap::new(),
            invites: Vec::new(),
            dtr: None,
            territory: (&tracker.territory()).into(),
            options: tracker.options(),
            balance: tracker.balance(),
            points: tracker.points(),
            hq: None,
            koth: None,
        };

        match self {
            Team::Player(team) => {
                let roster = team.roster();
                entity.ownership = Some(team.ownership().to_owned());
                entity.members = roster
                    .members()
                    .iter()
                    .map(|(xuid, role)| (xuid.clone(), role.name().to_owned()))
                    .collect();
                entity.invites = roster.invites().iter().cloned().collect();
                entity.dtr = Some((&team.dtr()).into());
                entity.hq = team.hq().as_ref().map(Into::into);
            }
            Team::System(team) => {
                entity.koth = team.koth().as_ref().map(Into::into);
            }
        }
        entity
    }
}

impl From<PlayerTeam> for Team {
    fn from(value: PlayerTeam) -> Self {
        Team::Player(Arc::new(value))
    }
}

impl From<SystemTeam> for Team {
    fn from(value: SystemTeam) -> Self {
        Team::System(Arc::new(value))
    }
}

impl TryFrom<TeamEntity> for Team {
    type Error = StorageError;

    fn try_from(value: TeamEntity) -> Result<Self, Self::Error> {
        let kind = TeamKind::from(value.kind);
        let tracker = TeamTracker::restore(
            value.id.clone(),
            value.name,
            kind,
            (value.balance, value.points),
            value.options,
            Territory::from(value.territory),
        );

        match kind {
            TeamKind::System => Ok(SystemTeam::restore(tracker, value.koth.map(Into::into)).into()),
            TeamKind::Player => {
                let ownership = value
                    .ownership
                    .ok_or_else(|| StorageError::corrupted(&value.id, "player team without owner"))?;
                let dtr = value
                    .dtr
                    .ok_or_else(|| StorageError::corrupted(&value.id, "player team without DTR"))?;
                let members: IndexMap<String, Role> = value
                    .members
                    .into_iter()
                    .map(|(xuid, role)| (xuid, Role::from_name(&role)))
                    .collect();
                if members.get(&ownership) != Some(&Role::Leader) {
                    return Err(StorageError::corrupted(
                        &value.id,
                        format!("owner {ownership} is not the team leader"),
                    ));
                }
                let invites: IndexSet<String> = value
                    .invites
                    .into_iter()
                    .filter(|xuid| !members.contains_key(xuid))
                    .collect();

                Ok(PlayerTeam::restore(
                    tracker,
                    ownership,
                    members,
                    invites,
                    DtrTick::from(dtr),
                    value.hq.map(Into::into),
                )
                .into())
            }
        }
    }
}
