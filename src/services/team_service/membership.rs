//! Role and invitation state machine.
//!
//! Every change that touches both a roster and the member index happens under the member index
//! write lock, so lookups never observe one without the other. Notices are sent after every lock
//! has been released.

use std::sync::Arc;

use tracing::info;

use super::TeamService;
use crate::{
    error::ServiceError,
    team::{PlayerTeam, Role, Team, territory::Hq},
    world::PlayerSession,
};

fn not_in_team() -> ServiceError {
    ServiceError::NotFound("You are not in a team.".into())
}

impl TeamService {
    fn team_of(&self, xuid: &str) -> Result<Arc<PlayerTeam>, ServiceError> {
        self.lookup_by_member(xuid)?.ok_or_else(not_in_team)
    }

    fn notify_team(&self, team: &PlayerTeam, message: &str) {
        let members: Vec<String> = team.members().into_keys().collect();
        self.broadcaster.broadcast(&members, message);
    }

    fn notify(&self, xuid: &str, message: &str) {
        self.broadcaster.broadcast(&[xuid.to_owned()], message);
    }

    /// Invite `target` into the team of `actor`. Requires `Officer` or higher.
    pub fn invite(&self, actor: &PlayerSession, target: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.member(&actor.xuid).lowest_than(Role::Officer) {
            return Err(ServiceError::AuthorizationDenied(
                "You must be at least an officer to invite players.".into(),
            ));
        }
        if self.lookup_by_member(&target.xuid)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "{} is already in a team.",
                target.name
            )));
        }
        if !team.add_invite(&target.xuid) {
            return Err(ServiceError::Conflict(format!(
                "{} has already been invited.",
                target.name
            )));
        }

        let name = team.tracker().name();
        info!(team = %name, actor = %actor.xuid, target = %target.xuid, "player invited");
        self.notify_team(
            &team,
            &format!("{} has been invited to the team by {}.", target.name, actor.name),
        );
        self.notify(
            &target.xuid,
            &format!("{} invited you to join {name}.", actor.name),
        );
        Ok(())
    }

    /// Withdraw a pending invitation. Requires `Officer` or higher.
    pub fn uninvite(&self, actor: &PlayerSession, target: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.member(&actor.xuid).lowest_than(Role::Officer) {
            return Err(ServiceError::AuthorizationDenied(
                "You must be at least an officer to revoke invitations.".into(),
            ));
        }
        if !team.remove_invite(&target.xuid) {
            return Err(ServiceError::NotFound(format!(
                "{} has no pending invitation.",
                target.name
            )));
        }
        Ok(())
    }

    /// Join `team_name` using a pending invitation.
    ///
    /// The invite is consumed, the roster entry added and the member index updated in one step.
    pub fn accept(
        &self,
        player: &PlayerSession,
        team_name: &str,
    ) -> Result<Arc<PlayerTeam>, ServiceError> {
        let team = {
            let teams = self.teams.read();
            let team_ids = self.team_ids.read();
            let mut members = self.members.write();
            let reservations = self.reservations.lock();

            if members.contains_key(&player.xuid) || reservations.founders.contains(&player.xuid) {
                return Err(ServiceError::Conflict("You are already in a team.".into()));
            }
            let id = team_ids
                .get(&team_name.to_lowercase())
                .ok_or_else(|| ServiceError::NotFound(format!("Team {team_name} does not exist.")))?;
            let team = match teams.get(id) {
                Some(Team::Player(team)) => team.clone(),
                Some(Team::System(_)) => {
                    return Err(ServiceError::InvalidInput(format!(
                        "{team_name} cannot be joined."
                    )));
                }
                None => {
                    return Err(ServiceError::invariant(format!(
                        "name {team_name} points at missing team {id}"
                    )));
                }
            };

            let mut roster = team.roster_mut();
            if !roster.has_invite(&player.xuid) {
                return Err(ServiceError::AuthorizationDenied(format!(
                    "You have not been invited to {}.",
                    team.tracker().name()
                )));
            }
            roster.add_member(&player.xuid, Role::Member);
            members.insert(player.xuid.clone(), id.clone());
            drop(roster);
            team
        };
        team.tracker().mark_dirty();

        info!(team = %team.tracker().name(), xuid = %player.xuid, "player joined team");
        self.notify_team(&team, &format!("{} has joined the team.", player.name));
        Ok(team)
    }

    fn evict(&self, team: &PlayerTeam, xuid: &str) -> bool {
        let mut members = self.members.write();
        let removed = team.roster_mut().remove_member(xuid).is_some();
        if removed && members.get(xuid).map(String::as_str) == Some(team.tracker().id()) {
            members.remove(xuid);
        }
        if removed {
            team.tracker().mark_dirty();
        }
        removed
    }

    /// Leave the current team. Leaders must disband instead.
    pub fn leave(&self, player: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.team_of(&player.xuid)?;
        if team.member(&player.xuid) == Role::Leader {
            return Err(ServiceError::AuthorizationDenied(
                "You are the leader of the team, disband it instead.".into(),
            ));
        }
        if !self.evict(&team, &player.xuid) {
            return Err(not_in_team());
        }

        info!(team = %team.tracker().name(), xuid = %player.xuid, "player left team");
        self.notify_team(&team, &format!("{} has left the team.", player.name));
        self.notify(
            &player.xuid,
            &format!("You have left {}.", team.tracker().name()),
        );
        Ok(())
    }

    /// Remove `target` from the team of `actor`. Requires `Officer` or higher; leaders cannot
    /// be kicked.
    pub fn kick(&self, actor: &PlayerSession, target: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.member(&actor.xuid).lowest_than(Role::Officer) {
            return Err(ServiceError::AuthorizationDenied(
                "You must be at least an officer to kick members.".into(),
            ));
        }
        if actor.xuid == target.xuid {
            return Err(ServiceError::InvalidInput(
                "You cannot use this on yourself.".into(),
            ));
        }
        match team.member(&target.xuid) {
            Role::Undefined => {
                return Err(ServiceError::NotFound(format!(
                    "{} is not a member of your team.",
                    target.name
                )));
            }
            Role::Leader => {
                return Err(ServiceError::AuthorizationDenied(format!(
                    "{} holds the highest role.",
                    target.name
                )));
            }
            Role::Officer | Role::Member => {}
        }
        if !self.evict(&team, &target.xuid) {
            return Err(ServiceError::NotFound(format!(
                "{} is not a member of your team.",
                target.name
            )));
        }

        info!(team = %team.tracker().name(), actor = %actor.xuid, target = %target.xuid, "member kicked");
        self.notify_team(
            &team,
            &format!("{} has been kicked by {}.", target.name, actor.name),
        );
        self.notify(
            &target.xuid,
            &format!("You have been kicked from {} by {}.", team.tracker().name(), actor.name),
        );
        Ok(())
    }

    fn change_role(
        &self,
        actor: &PlayerSession,
        target: &PlayerSession,
        from: Role,
        to: Role,
    ) -> Result<Arc<PlayerTeam>, ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.member(&actor.xuid) != Role::Leader {
            return Err(ServiceError::AuthorizationDenied(
                "Only the leader can change roles.".into(),
            ));
        }

        let mut roster = team.roster_mut();
        let current = roster.role(&target.xuid);
        if current == Role::Undefined {
            return Err(ServiceError::NotFound(format!(
                "{} is not a member of your team.",
                target.name
            )));
        }
        if current != from || !roster.set_role(&target.xuid, to) {
            return Err(ServiceError::Conflict(format!(
                "{} is already {current}.",
                target.name
            )));
        }
        drop(roster);
        team.tracker().mark_dirty();

        info!(team = %team.tracker().name(), target = %target.xuid, role = %to, "role changed");
        Ok(team)
    }

    /// Raise a `Member` to `Officer`. Leader only.
    pub fn promote(&self, actor: &PlayerSession, target: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.change_role(actor, target, Role::Member, Role::Officer)?;
        self.notify_team(&team, &format!("{} has been promoted to officer.", target.name));
        Ok(())
    }

    /// Lower an `Officer` to `Member`. Leader only.
    pub fn demote(&self, actor: &PlayerSession, target: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.change_role(actor, target, Role::Officer, Role::Member)?;
        self.notify_team(&team, &format!("{} has been demoted to member.", target.name));
        Ok(())
    }

    /// Delete the team owned by `actor` and release every member.
    pub async fn disband(&self, actor: &PlayerSession) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.ownership() != actor.xuid {
            return Err(ServiceError::AuthorizationDenied(
                "Only the leader can disband the team.".into(),
            ));
        }

        let former = self.delete(team.tracker().id()).await?;
        info!(team = %team.tracker().name(), actor = %actor.xuid, "team disbanded");
        self.broadcaster.broadcast(
            &former,
            &format!("{} has disbanded {}.", actor.name, team.tracker().name()),
        );
        Ok(())
    }

    /// Set the team home to where the leader stands. The spot must be inside the territory.
    pub fn set_home(&self, actor: &PlayerSession, hq: Hq) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        if team.member(&actor.xuid).lowest_than(Role::Leader) {
            return Err(ServiceError::AuthorizationDenied(
                "Only the leader can set the home.".into(),
            ));
        }
        if !team.tracker().inside(&hq.world, hq.position) {
            return Err(ServiceError::InvalidInput(
                "You must be inside the team's territory to set the home.".into(),
            ));
        }

        team.set_hq(hq);
        self.notify_team(&team, &format!("{} has updated the team home.", actor.name));
        Ok(())
    }

    /// Send `message` to every member of the sender's team.
    pub fn broadcast_team_chat(
        &self,
        actor: &PlayerSession,
        message: &str,
    ) -> Result<(), ServiceError> {
        let team = self.team_of(&actor.xuid)?;
        self.notify_team(&team, &format!("[Team] {}: {message}", actor.name));
        Ok(())
    }
}
