//! Narrow views onto the game server the registry depends on.
//!
//! The registry never talks to the engine directly; the host implements these traits and hands
//! them in. [`Headless`] is used when running without a game server attached.

use tracing::debug;

use crate::{
    error::ServiceError,
    team::territory::{Region, Vec3},
};

/// Online player as seen by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    /// Stable Xbox user id.
    pub xuid: String,
    /// Current gamertag.
    pub name: String,
}

/// Resolves command selectors to online players.
pub trait Sessions: Send + Sync {
    /// Every online player matched by `selector` (a name or an engine selector).
    fn resolve(&self, selector: &str) -> Vec<PlayerSession>;

    /// Resolve `selector` to exactly one player.
    fn resolve_target(&self, selector: &str) -> Result<PlayerSession, ServiceError> {
        let mut matches = self.resolve(selector);
        match matches.len() {
            0 => Err(ServiceError::NotFound(format!("player {selector} is not online"))),
            1 => Ok(matches.remove(0)),
            count => Err(ServiceError::InvalidInput(format!(
                "{selector} matches {count} players, expected exactly one"
            ))),
        }
    }
}

/// Delivers chat text to players.
pub trait Broadcaster: Send + Sync {
    /// Send `message` to every player in `xuids` that is online.
    fn broadcast(&self, xuids: &[String], message: &str);
}

/// Player positions and region queries.
pub trait Spatial: Send + Sync {
    /// World name and position of an online player.
    fn location(&self, xuid: &str) -> Option<(String, Vec3)>;

    /// XUIDs of the players currently inside `region` of `world`.
    fn players_within(&self, world: &str, region: &Region) -> Vec<String>;
}

/// Stand-in used when no game server is attached: nobody is online and chat goes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl Sessions for Headless {
    fn resolve(&self, _selector: &str) -> Vec<PlayerSession> {
        Vec::new()
    }
}

impl Broadcaster for Headless {
    fn broadcast(&self, xuids: &[String], message: &str) {
        debug!(recipients = xuids.len(), %message, "broadcast without game server");
    }
}

impl Spatial for Headless {
    fn location(&self, _xuid: &str) -> Option<(String, Vec3)> {
        None
    }

    fn players_within(&self, _world: &str, _region: &Region) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Roster(Vec<PlayerSession>);

    impl Sessions for Roster {
        fn resolve(&self, selector: &str) -> Vec<PlayerSession> {
            self.0
                .iter()
                .filter(|session| selector == "@a" || session.name.eq_ignore_ascii_case(selector))
                .cloned()
                .collect()
        }
    }

    fn roster() -> Roster {
        Roster(vec![
            PlayerSession {
                xuid: "P1".into(),
                name: "Steve".into(),
            },
            PlayerSession {
                xuid: "P2".into(),
                name: "Alex".into(),
            },
        ])
    }

    #[test]
    fn resolve_target_accepts_a_single_match() {
        let session = roster().resolve_target("steve").unwrap();
        assert_eq!(session.xuid, "P1");
    }

    #[test]
    fn resolve_target_rejects_missing_and_ambiguous_selectors() {
        assert!(matches!(
            roster().resolve_target("Notch"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            roster().resolve_target("@a"),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn headless_has_nobody_online() {
        assert!(Headless.resolve("@a").is_empty());
        assert!(Headless.location("P1").is_none());
    }
}
