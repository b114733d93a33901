use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::dao::repository::Entity;

/// Discriminant stored in the `type` field of a team document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TeamKindEntity {
    /// Team founded and run by players.
    Player,
    /// Server-owned team (spawn, roads, KoTH objectives).
    System,
}

/// Representation of a team stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeamEntity {
    /// Stable identifier for the team.
    #[serde(rename = "_id")]
    pub id: String,
    /// Display name chosen at creation.
    pub name: String,
    /// Player or system team.
    #[serde(rename = "type")]
    pub kind: TeamKindEntity,
    /// XUID of the founding leader (player teams only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<String>,
    /// Member XUID to role name.
    #[serde(default)]
    pub members: IndexMap<String, String>,
    /// XUIDs holding a pending invitation.
    #[serde(default)]
    pub invites: Vec<String>,
    /// Freeze timer (player teams only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtr: Option<DtrEntity>,
    /// World name to claimed regions.
    #[serde(default)]
    pub territory: IndexMap<String, Vec<RegionEntity>>,
    /// Free-form options keyed by name.
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
    /// Team bank balance.
    #[serde(default)]
    pub balance: i32,
    /// Team points.
    #[serde(default)]
    pub points: i32,
    /// Home location, if one was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hq: Option<HqEntity>,
    /// Capture objective definition (system teams only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub koth: Option<KothEntity>,
}

/// Persisted freeze timer; timestamps are unix milliseconds, `0` meaning unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DtrEntity {
    /// Current DTR value.
    pub value: f32,
    /// Last time the timer was touched.
    pub last_updated: i64,
    /// Instant the freeze ends.
    pub frozen_until: i64,
}

/// Axis-aligned box stored as two corners.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionEntity {
    /// Lowest corner.
    pub min: [f64; 3],
    /// Highest corner.
    pub max: [f64; 3],
}

/// Persisted team home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HqEntity {
    /// World the home lives in.
    pub world: String,
    /// Position inside that world.
    pub position: [f64; 3],
    /// Horizontal facing.
    pub yaw: f64,
    /// Vertical facing.
    pub pitch: f64,
}

/// Persisted KoTH objective. Capture progress is runtime-only.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KothEntity {
    /// World the objective lives in.
    pub world: String,
    /// Capture zone.
    pub region: RegionEntity,
    /// Uninterrupted presence required to capture.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub duration: Duration,
}

impl Entity for TeamEntity {
    const COLLECTION: &'static str = "teams";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Representation of a user stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntity {
    /// Player XUID.
    #[serde(rename = "_id")]
    pub xuid: String,
    /// Gamertag at creation time.
    pub name: String,
    /// Combat counters.
    #[serde(default)]
    pub tracker: UserTrackerEntity,
}

/// Persisted combat counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTrackerEntity {
    /// Players killed.
    pub kills: i64,
    /// Times died.
    pub deaths: i64,
    /// Kills assisted.
    pub assists: i64,
}

impl Entity for UserEntity {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.xuid
    }
}
