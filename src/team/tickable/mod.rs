//! Time-driven team mechanics advanced by the tick loop.

pub mod dtr;
pub mod koth;

pub use dtr::{DEFAULT_DTR, DtrTick, MAX_FREEZE};
pub use koth::{KothEvent, KothState, KothTick};
