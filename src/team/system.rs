use std::time::Instant;

use parking_lot::Mutex;

use crate::{
    team::{
        TeamKind,
        tickable::{KothEvent, KothTick},
        tracker::TeamTracker,
    },
    world::Spatial,
};

/// Server-owned team such as spawn, roads or a KoTH objective.
#[derive(Debug)]
pub struct SystemTeam {
    tracker: TeamTracker,
    koth: Mutex<Option<KothTick>>,
}

impl SystemTeam {
    /// New system team without an objective.
    pub fn new(name: impl Into<String>) -> Self {
        Self::restore(TeamTracker::empty(name, TeamKind::System), None)
    }

    pub(crate) fn restore(tracker: TeamTracker, koth: Option<KothTick>) -> Self {
        Self {
            tracker,
            koth: Mutex::new(koth),
        }
    }

    /// Identity, counters, options and territory.
    pub fn tracker(&self) -> &TeamTracker {
        &self.tracker
    }

    /// Copy of the capture objective.
    pub fn koth(&self) -> Option<KothTick> {
        self.koth.lock().clone()
    }

    /// Whether an objective is attached and not yet held.
    pub fn has_active_koth(&self) -> bool {
        self.koth.lock().as_ref().is_some_and(KothTick::is_active)
    }

    /// Attach or replace the capture objective.
    pub fn set_koth(&self, koth: KothTick) {
        *self.koth.lock() = Some(koth);
        self.tracker.mark_dirty();
    }

    /// Put the objective back to idle. Returns `false` when none is attached.
    pub fn reset_koth(&self) -> bool {
        match self.koth.lock().as_mut() {
            Some(koth) => {
                koth.reset();
                true
            }
            None => false,
        }
    }

    /// Advance the objective, if any.
    pub fn tick_koth(
        &self,
        now: Instant,
        spatial: &dyn Spatial,
        eligible: impl Fn(&str) -> bool,
    ) -> Option<KothEvent> {
        self.koth.lock().as_mut()?.tick(now, spatial, eligible)
    }
}
