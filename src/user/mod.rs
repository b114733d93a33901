//! Player profiles.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::dao::models::UserEntity;

/// Combat counters.
pub mod tracker;

pub use tracker::UserTracker;

/// Persistent profile of a player.
#[derive(Debug)]
pub struct User {
    xuid: String,
    name: String,
    tracker: UserTracker,
    team_chat: AtomicBool,
}

impl User {
    /// Profile with zeroed counters.
    pub fn new(xuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            xuid: xuid.into(),
            name: name.into(),
            tracker: UserTracker::default(),
            team_chat: AtomicBool::new(false),
        }
    }

    /// Xbox user id.
    pub fn xuid(&self) -> &str {
        &self.xuid
    }

    /// Gamertag recorded when the profile was created.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Combat counters.
    pub fn tracker(&self) -> &UserTracker {
        &self.tracker
    }

    /// Whether chat messages go to the team instead of everyone.
    pub fn team_chat(&self) -> bool {
        self.team_chat.load(Ordering::SeqCst)
    }

    /// Flip team chat, returning the new state. Not persisted.
    pub fn toggle_team_chat(&self) -> bool {
        !self.team_chat.fetch_xor(true, Ordering::SeqCst)
    }

    /// Snapshot into the stored document.
    pub fn to_entity(&self) -> UserEntity {
        UserEntity {
            xuid: self.xuid.clone(),
            name: self.name.clone(),
            tracker: (&self.tracker).into(),
        }
    }
}

impl From<UserEntity> for User {
    fn from(value: UserEntity) -> Self {
        Self {
            xuid: value.xuid,
            name: value.name,
            tracker: value.tracker.into(),
            team_chat: AtomicBool::new(false),
        }
    }
}
