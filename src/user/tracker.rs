use std::sync::atomic::{AtomicI64, Ordering};

use crate::dao::models::UserTrackerEntity;

/// Combat counters of a player. Counters only ever go up.
#[derive(Debug, Default)]
pub struct UserTracker {
    kills: AtomicI64,
    deaths: AtomicI64,
    assists: AtomicI64,
}

impl UserTracker {
    /// Players killed.
    pub fn kills(&self) -> i64 {
        self.kills.load(Ordering::SeqCst)
    }

    /// Count one more kill.
    pub fn inc_kills(&self) -> i64 {
        self.kills.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Times died.
    pub fn deaths(&self) -> i64 {
        self.deaths.load(Ordering::SeqCst)
    }

    /// Count one more death.
    pub fn inc_deaths(&self) -> i64 {
        self.deaths.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Kills assisted.
    pub fn assists(&self) -> i64 {
        self.assists.load(Ordering::SeqCst)
    }

    /// Count one more assist.
    pub fn inc_assists(&self) -> i64 {
        self.assists.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl From<UserTrackerEntity> for UserTracker {
    fn from(value: UserTrackerEntity) -> Self {
        Self {
            kills: AtomicI64::new(value.kills),
            deaths: AtomicI64::new(value.deaths),
            assists: AtomicI64::new(value.assists),
        }
    }
}

impl From<&UserTracker> for UserTrackerEntity {
    fn from(value: &UserTracker) -> Self {
        Self {
            kills: value.kills(),
            deaths: value.deaths(),
            assists: value.assists(),
        }
    }
}
