use std::time::{Duration, Instant};

use crate::{
    dao::models::KothEntity,
    team::territory::Region,
    world::Spatial,
};

/// Progress of a capture objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KothState {
    /// Nobody is capturing.
    Idle,
    /// A player stands in the zone and the clock runs.
    Capturing {
        /// XUID of the capturer.
        by: String,
        /// When the capture started.
        since: Instant,
    },
    /// The objective was captured and stays held until reset.
    Held {
        /// XUID of the player who captured it.
        by: String,
        /// When the capture completed.
        at: Instant,
    },
}

/// Transition reported by [`KothTick::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KothEvent {
    /// A player entered the zone and started the clock.
    CaptureStarted {
        /// XUID of the capturer.
        by: String,
    },
    /// The capturer left before the clock ran out.
    CaptureLost {
        /// XUID of the former capturer.
        by: String,
    },
    /// The capturer stayed for the whole duration.
    Captured {
        /// XUID of the winner.
        by: String,
    },
}

/// King-of-the-hill objective owned by a system team.
#[derive(Debug, Clone, PartialEq)]
pub struct KothTick {
    world: String,
    region: Region,
    duration: Duration,
    state: KothState,
}

impl KothTick {
    /// Idle objective over `region` in `world`.
    pub fn new(world: impl Into<String>, region: Region, duration: Duration) -> Self {
        Self {
            world: world.into(),
            region,
            duration,
            state: KothState::Idle,
        }
    }

    /// World the zone lives in.
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Capture zone.
    pub fn region(&self) -> &Region {
        &self.region
    }

    /// Presence needed to capture.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Current progress.
    pub fn state(&self) -> &KothState {
        &self.state
    }

    /// Whether the objective still needs ticking.
    pub fn is_active(&self) -> bool {
        !matches!(self.state, KothState::Held { .. })
    }

    /// Time left before the current capturer wins; `None` unless capturing.
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        match &self.state {
            KothState::Capturing { since, .. } => {
                Some(self.duration.saturating_sub(now.saturating_duration_since(*since)))
            }
            _ => None,
        }
    }

    /// Drop any progress and go back to idle.
    pub fn reset(&mut self) {
        self.state = KothState::Idle;
    }

    fn inside(&self, spatial: &dyn Spatial, xuid: &str) -> bool {
        spatial
            .location(xuid)
            .is_some_and(|(world, position)| world == self.world && self.region.contains(position))
    }

    /// Advance the objective by one tick.
    ///
    /// `eligible` decides whether a player standing in the zone may start a capture.
    pub fn tick(
        &mut self,
        now: Instant,
        spatial: &dyn Spatial,
        eligible: impl Fn(&str) -> bool,
    ) -> Option<KothEvent> {
        match &self.state {
            KothState::Held { .. } => None,
            KothState::Capturing { by, .. } if self.inside(spatial, by) => {
                let by = by.clone();
                if self.remaining_at(now).is_some_and(|left| left.is_zero()) {
                    self.state = KothState::Held {
                        by: by.clone(),
                        at: now,
                    };
                    return Some(KothEvent::Captured { by });
                }
                None
            }
            KothState::Capturing { by, .. } => {
                let event = KothEvent::CaptureLost { by: by.clone() };
                self.state = KothState::Idle;
                Some(event)
            }
            KothState::Idle => {
                let by = spatial
                    .players_within(&self.world, &self.region)
                    .into_iter()
                    .find(|xuid| eligible(xuid.as_str()))?;
                self.state = KothState::Capturing {
                    by: by.clone(),
                    since: now,
                };
                Some(KothEvent::CaptureStarted { by })
            }
        }
    }
}

impl From<KothEntity> for KothTick {
    fn from(value: KothEntity) -> Self {
        KothTick::new(value.world, value.region.into(), value.duration)
    }
}

impl From<&KothTick> for KothEntity {
    fn from(value: &KothTick) -> Self {
        Self {
            world: value.world.clone(),
            region: (&value.region).into(),
            duration: value.duration,
        }
    }
}
