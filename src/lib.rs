//! Library crate for hcteams, exposing the team and user registries for binaries and integration
//! tests.

pub mod config;
/// Persistence port and its backends.
pub mod dao;
/// Domain error taxonomy.
pub mod error;
/// Registries and background loops.
pub mod services;
pub mod team;
#[cfg(test)]
pub(crate) mod testing;
pub mod user;
pub mod world;
