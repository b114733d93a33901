//! Background drivers: the fixed-cadence tick loop, the autosave loop and the storage health
//! monitor.
//!
//! All of them stop when the shutdown channel flips to `true`. The tick loop never touches storage;
//! saving is left to the autosave loop.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    services::team_service::{TeamService, TickEvent},
    world::Spatial,
};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Advance timed mechanics every configured tick until shutdown.
pub async fn run_tick_loop(
    teams: Arc<TeamService>,
    spatial: Arc<dyn Spatial>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(teams.config().tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval_ms = teams.config().tick_interval_ms, "tick loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for event in teams.do_tick(spatial.as_ref()) {
                    match &event {
                        TickEvent::DtrThawed { team_id } => debug!(team = %team_id, "DTR thawed"),
                        TickEvent::Koth { team_name, event, .. } => {
                            info!(team = %team_name, ?event, "KoTH update");
                        }
                    }
                    teams.announce(&event);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("tick loop stopped");
}

/// Save changed teams every autosave interval until shutdown.
pub async fn run_autosave_loop(teams: Arc<TeamService>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(teams.config().autosave_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                teams.flush_dirty().await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("autosave loop stopped");
}

/// Poll the team collection and log when storage goes away or comes back.
pub async fn run_health_monitor(teams: Arc<TeamService>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(HEALTH_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut degraded = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match teams.health_check().await {
                    Ok(()) if degraded => {
                        info!("storage healthy again; leaving degraded mode");
                        degraded = false;
                    }
                    Ok(()) => {}
                    Err(err) if !degraded => {
                        warn!(error = %err, "storage health check failed; entering degraded mode");
                        degraded = true;
                    }
                    Err(err) => debug!(error = %err, "storage still unavailable"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
