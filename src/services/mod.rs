/// Background tick and autosave drivers.
pub mod tick;
/// Team registry, membership state machine and timed mechanics.
pub mod team_service;
/// Player profile cache.
pub mod user_service;
