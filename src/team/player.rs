use std::time::{Duration, SystemTime};

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::team::{
    TeamKind,
    role::Role,
    territory::Hq,
    tickable::DtrTick,
    tracker::TeamTracker,
};

/// Members and pending invitations of a player team.
///
/// A player is never both a member and invited: admitting a member drops their invite and an
/// invite is refused for someone already on the roster. The owner always stays `Leader`.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    owner: String,
    members: IndexMap<String, Role>,
    invites: IndexSet<String>,
}

impl Roster {
    fn founded_by(owner: &str) -> Self {
        Self {
            owner: owner.to_owned(),
            members: IndexMap::from([(owner.to_owned(), Role::Leader)]),
            invites: IndexSet::new(),
        }
    }

    /// Role of `xuid`, [`Role::Undefined`] when not a member.
    pub fn role(&self, xuid: &str) -> Role {
        self.members.get(xuid).copied().unwrap_or(Role::Undefined)
    }

    /// Whether `xuid` is on the roster.
    pub fn is_member(&self, xuid: &str) -> bool {
        self.members.contains_key(xuid)
    }

    /// Member XUIDs with their role, in join order.
    pub fn members(&self) -> &IndexMap<String, Role> {
        &self.members
    }

    /// Pending invitations, oldest first.
    pub fn invites(&self) -> &IndexSet<String> {
        &self.invites
    }

    /// Whether `xuid` holds an invitation.
    pub fn has_invite(&self, xuid: &str) -> bool {
        self.invites.contains(xuid)
    }

    /// Record an invitation. Returns `false` if `xuid` is a member or already invited.
    pub fn add_invite(&mut self, xuid: &str) -> bool {
        !self.is_member(xuid) && self.invites.insert(xuid.to_owned())
    }

    /// Withdraw an invitation. Returns whether one existed.
    pub fn remove_invite(&mut self, xuid: &str) -> bool {
        self.invites.shift_remove(xuid)
    }

    /// Admit `xuid` with `role`, consuming any invitation. Returns `false` if already a member.
    pub fn add_member(&mut self, xuid: &str, role: Role) -> bool {
        if self.is_member(xuid) || role == Role::Undefined {
            return false;
        }
        self.invites.shift_remove(xuid);
        self.members.insert(xuid.to_owned(), role);
        true
    }

    /// Drop `xuid` from the roster. The owner cannot be removed.
    pub fn remove_member(&mut self, xuid: &str) -> Option<Role> {
        if xuid == self.owner {
            return None;
        }
        self.members.shift_remove(xuid)
    }

    /// Change the role of an existing member. The owner's role is fixed and nobody else may
    /// become `Leader`.
    pub fn set_role(&mut self, xuid: &str, role: Role) -> bool {
        if xuid == self.owner || matches!(role, Role::Leader | Role::Undefined) {
            return false;
        }
        match self.members.get_mut(xuid) {
            Some(current) => {
                *current = role;
                true
            }
            None => false,
        }
    }
}

/// Team founded and run by players.
#[derive(Debug)]
pub struct PlayerTeam {
    tracker: TeamTracker,
    ownership: String,
    hq: RwLock<Option<Hq>>,
    roster: RwLock<Roster>,
    dtr: Mutex<DtrTick>,
}

impl PlayerTeam {
    /// New team named `name` with `owner` as its only member.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            tracker: TeamTracker::empty(name, TeamKind::Player),
            roster: RwLock::new(Roster::founded_by(&owner)),
            ownership: owner,
            hq: RwLock::new(None),
            dtr: Mutex::new(DtrTick::default()),
        }
    }

    pub(crate) fn restore(
        tracker: TeamTracker,
        ownership: String,
        members: IndexMap<String, Role>,
        invites: IndexSet<String>,
        dtr: DtrTick,
        hq: Option<Hq>,
    ) -> Self {
        Self {
            tracker,
            roster: RwLock::new(Roster {
                owner: ownership.clone(),
                members,
                invites,
            }),
            ownership,
            hq: RwLock::new(hq),
            dtr: Mutex::new(dtr),
        }
    }

    /// Identity, counters, options and territory.
    pub fn tracker(&self) -> &TeamTracker {
        &self.tracker
    }

    /// XUID of the founder.
    pub fn ownership(&self) -> &str {
        &self.ownership
    }

    /// Copy of the roster.
    pub fn roster(&self) -> Roster {
        self.roster.read().clone()
    }

    pub(crate) fn roster_mut(&self) -> RwLockWriteGuard<'_, Roster> {
        self.roster.write()
    }

    /// Member XUIDs with their role.
    pub fn members(&self) -> IndexMap<String, Role> {
        self.roster.read().members.clone()
    }

    /// Role of `xuid` in this team.
    pub fn member(&self, xuid: &str) -> Role {
        self.roster.read().role(xuid)
    }

    /// Whether `xuid` holds an invitation.
    pub fn has_invite(&self, xuid: &str) -> bool {
        self.roster.read().has_invite(xuid)
    }

    /// See [`Roster::add_invite`].
    pub fn add_invite(&self, xuid: &str) -> bool {
        let added = self.roster.write().add_invite(xuid);
        if added {
            self.tracker.mark_dirty();
        }
        added
    }

    /// See [`Roster::remove_invite`].
    pub fn remove_invite(&self, xuid: &str) -> bool {
        let removed = self.roster.write().remove_invite(xuid);
        if removed {
            self.tracker.mark_dirty();
        }
        removed
    }

    /// Home location, if set.
    pub fn hq(&self) -> Option<Hq> {
        self.hq.read().clone()
    }

    /// Replace the home location.
    pub fn set_hq(&self, hq: Hq) {
        *self.hq.write() = Some(hq);
        self.tracker.mark_dirty();
    }

    /// Copy of the freeze timer.
    pub fn dtr(&self) -> DtrTick {
        self.dtr.lock().clone()
    }

    /// Freeze DTR regeneration for `seconds` from now.
    pub fn update_dtr_remaining(&self, seconds: u64) {
        self.dtr.lock().update_remaining(seconds);
        self.tracker.mark_dirty();
    }

    /// Time left on the freeze.
    pub fn dtr_remaining(&self) -> Duration {
        self.dtr.lock().remaining()
    }

    /// Whether a freeze deadline is set, elapsed or not.
    pub fn is_frozen(&self) -> bool {
        self.dtr.lock().is_armed()
    }

    /// Clear an elapsed freeze. Returns whether anything changed.
    pub fn thaw_at(&self, now: SystemTime) -> bool {
        let thawed = self.dtr.lock().thaw_at(now);
        if thawed {
            self.tracker.mark_dirty();
        }
        thawed
    }
}
