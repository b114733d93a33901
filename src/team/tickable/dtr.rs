use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::dao::models::DtrEntity;

/// DTR value given to freshly founded teams.
pub const DEFAULT_DTR: f32 = 1.01;
/// Longest freeze a single death can apply.
pub const MAX_FREEZE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Freeze timer of a player team.
///
/// While frozen the team's DTR does not regenerate. Timestamps use wall-clock time since they
/// are persisted and must survive restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct DtrTick {
    value: f32,
    last_updated: Option<SystemTime>,
    frozen_until: Option<SystemTime>,
}

impl Default for DtrTick {
    fn default() -> Self {
        Self::new(DEFAULT_DTR)
    }
}

impl DtrTick {
    /// Unfrozen timer holding `value`.
    pub fn new(value: f32) -> Self {
        Self {
            value,
            last_updated: None,
            frozen_until: None,
        }
    }

    /// Current DTR value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Last time the freeze was (re)armed.
    pub fn last_updated(&self) -> Option<SystemTime> {
        self.last_updated
    }

    /// Freeze the timer for `seconds` from now.
    pub fn update_remaining(&mut self, seconds: u64) {
        self.update_remaining_at(SystemTime::now(), seconds);
    }

    /// Freeze the timer for `seconds` counted from `now`, capped at [`MAX_FREEZE`].
    pub fn update_remaining_at(&mut self, now: SystemTime, seconds: u64) {
        let freeze = Duration::from_secs(seconds).min(MAX_FREEZE);
        self.frozen_until = Some(now.checked_add(freeze).unwrap_or(now));
        self.last_updated = Some(now);
    }

    /// Time left before the freeze ends.
    pub fn remaining(&self) -> Duration {
        self.remaining_at(SystemTime::now())
    }

    /// Time left before the freeze ends, as seen at `now`. Zero when never frozen.
    pub fn remaining_at(&self, now: SystemTime) -> Duration {
        self.frozen_until
            .and_then(|until| until.duration_since(now).ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Whether a freeze deadline is armed, elapsed or not.
    pub fn is_armed(&self) -> bool {
        self.frozen_until.is_some()
    }

    /// Clear an elapsed freeze. Returns whether anything changed.
    pub fn thaw_at(&mut self, now: SystemTime) -> bool {
        if self.is_armed() && self.remaining_at(now).is_zero() {
            self.frozen_until = None;
            return true;
        }
        false
    }
}

fn to_millis(time: Option<SystemTime>) -> i64 {
    time.and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn from_millis(millis: i64) -> Option<SystemTime> {
    let millis = u64::try_from(millis).ok().filter(|millis| *millis > 0)?;
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

impl From<DtrEntity> for DtrTick {
    fn from(value: DtrEntity) -> Self {
        Self {
            value: value.value,
            last_updated: from_millis(value.last_updated),
            frozen_until: from_millis(value.frozen_until),
        }
    }
}

impl From<&DtrTick> for DtrEntity {
    fn from(value: &DtrTick) -> Self {
        Self {
            value: value.value,
            last_updated: to_millis(value.last_updated),
            frozen_until: to_millis(value.frozen_until),
        }
    }
}
