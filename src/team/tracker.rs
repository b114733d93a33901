use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::team::{
    TeamKind,
    territory::{Region, Territory, Vec3},
};

/// Option overriding the coloured team name shown to players.
pub const DISPLAY_NAME: &str = "display_name";
/// Option marking claimed land as a no-combat area.
pub const SAFE_ZONE: &str = "safe_zone";
/// Option allowing members to damage each other.
pub const FRIENDLY_FIRE: &str = "friendly_fire";
/// Option allowing outsiders to break blocks in the territory.
pub const BLOCK_BREAKABLE: &str = "block_breakable";
/// Option allowing outsiders to place blocks in the territory.
pub const BLOCK_PLACEABLE: &str = "block_placeable";

/// State shared by both team kinds: identity, counters, options and claimed land.
#[derive(Debug)]
pub struct TeamTracker {
    id: String,
    name: String,
    kind: TeamKind,
    balance: AtomicI32,
    points: AtomicI32,
    options: RwLock<IndexMap<String, Value>>,
    territory: RwLock<Territory>,
    dirty: AtomicBool,
    retired: AtomicBool,
    persisting: Mutex<()>,
}

impl TeamTracker {
    /// Fresh tracker with a new random id.
    pub fn empty(name: impl Into<String>, kind: TeamKind) -> Self {
        Self::restore(
            uuid::Uuid::new_v4().to_string(),
            name,
            kind,
            (0, 0),
            IndexMap::new(),
            Territory::default(),
        )
    }

    /// Tracker rebuilt from stored state.
    pub fn restore(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: TeamKind,
        (balance, points): (i32, i32),
        options: IndexMap<String, Value>,
        territory: Territory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            balance: AtomicI32::new(balance),
            points: AtomicI32::new(points),
            options: RwLock::new(options),
            territory: RwLock::new(territory),
            dirty: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            persisting: Mutex::new(()),
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Player or system team.
    pub fn kind(&self) -> TeamKind {
        self.kind
    }

    /// Bank balance.
    pub fn balance(&self) -> i32 {
        self.balance.load(Ordering::SeqCst)
    }

    /// Add `amount` (possibly negative) to the balance, returning the new value. Saturates at
    /// the `i32` bounds.
    pub fn add_balance(&self, amount: i32) -> i32 {
        self.mark_dirty();
        saturating_add(&self.balance, amount)
    }

    /// Team points.
    pub fn points(&self) -> i32 {
        self.points.load(Ordering::SeqCst)
    }

    /// Add `amount` (possibly negative) to the points, returning the new value. Saturates at
    /// the `i32` bounds.
    pub fn add_points(&self, amount: i32) -> i32 {
        self.mark_dirty();
        saturating_add(&self.points, amount)
    }

    /// Raw option value, `None` when unset.
    pub fn option(&self, key: &str) -> Option<Value> {
        self.options.read().get(key).cloned()
    }

    /// Set an option.
    pub fn set_option(&self, key: impl Into<String>, value: Value) {
        self.options.write().insert(key.into(), value);
        self.mark_dirty();
    }

    /// Copy of every set option.
    pub fn options(&self) -> IndexMap<String, Value> {
        self.options.read().clone()
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.options
            .read()
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// Display name override.
    pub fn display_name(&self) -> Option<String> {
        self.options
            .read()
            .get(DISPLAY_NAME)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    /// Whether the territory is a no-combat area. Defaults to `false`.
    pub fn safe_zone(&self) -> bool {
        self.flag(SAFE_ZONE, false)
    }

    /// Whether members may hurt each other. Defaults to `false`.
    pub fn friendly_fire(&self) -> bool {
        self.flag(FRIENDLY_FIRE, false)
    }

    /// Whether outsiders may break blocks in the territory. Defaults to `true`.
    pub fn block_breakable(&self) -> bool {
        self.flag(BLOCK_BREAKABLE, true)
    }

    /// Whether outsiders may place blocks in the territory. Defaults to `true`.
    pub fn block_placeable(&self) -> bool {
        self.flag(BLOCK_PLACEABLE, true)
    }

    /// Copy of the claimed land.
    pub fn territory(&self) -> Territory {
        self.territory.read().clone()
    }

    /// Whether `point` in `world` lies inside a claim.
    pub fn inside(&self, world: &str, point: Vec3) -> bool {
        self.territory.read().contains(world, point)
    }

    pub(crate) fn claim(&self, world: &str, region: Region) {
        self.territory.write().claim(world, region);
        self.mark_dirty();
    }

    /// Flag the team as changed since the last save.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Clear the dirty flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    /// Whether the team has been removed from the registry. Retired teams are never saved.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub(crate) fn set_retired(&self, retired: bool) {
        self.retired.store(retired, Ordering::SeqCst);
    }

    /// Held across every repository write or delete of this team, so they reach storage one at
    /// a time.
    pub(crate) async fn persist_lock(&self) -> MutexGuard<'_, ()> {
        self.persisting.lock().await
    }
}

fn saturating_add(counter: &AtomicI32, amount: i32) -> i32 {
    let previous = counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(amount))
        })
        .unwrap_or_else(|current| current);
    previous.saturating_add(amount)
}
