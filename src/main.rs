//! hcteams binary entrypoint wiring configuration, storage, registries and background loops.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hcteams::{
    config::AppConfig,
    dao::{
        memory::MemoryRepository,
        models::{TeamEntity, UserEntity},
        repository::Repository,
    },
    services::{team_service::TeamService, tick, user_service::UserService},
    world::Headless,
};

type Repositories = (
    Arc<dyn Repository<TeamEntity>>,
    Arc<dyn Repository<UserEntity>>,
);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load());
    let (team_store, user_store) = open_repositories().await?;

    let teams = Arc::new(TeamService::new(
        team_store,
        config.clone(),
        Arc::new(Headless),
    ));
    let users = Arc::new(UserService::new(user_store, config.clone()));
    teams.hook().await.context("loading teams")?;
    users.hook().await.context("loading users")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tokio::spawn(tick::run_tick_loop(
        teams.clone(),
        Arc::new(Headless),
        shutdown_rx.clone(),
    ));
    let autosave = tokio::spawn(tick::run_autosave_loop(teams.clone(), shutdown_rx.clone()));
    let monitor = tokio::spawn(tick::run_health_monitor(teams.clone(), shutdown_rx));

    shutdown_signal().await;
    info!("shutting down");
    // Receivers may already be gone if a loop panicked.
    let _ = shutdown_tx.send(true);
    for (name, handle) in [
        ("tick", ticker),
        ("autosave", autosave),
        ("health", monitor),
    ] {
        if let Err(err) = handle.await {
            error!(task = name, error = %err, "background loop ended abnormally");
        }
    }

    let teams_saved = teams.shutdown().await;
    let users_saved = users.shutdown().await;
    teams_saved.context("saving teams")?;
    users_saved.context("saving users")?;
    Ok(())
}

/// Pick the storage backend: MongoDB when `MONGO_URI` is set, the in-memory store otherwise.
#[cfg(feature = "mongo-store")]
async fn open_repositories() -> anyhow::Result<Repositories> {
    use hcteams::dao::mongodb::{MongoConfig, MongoConnection, MongoRepository};

    if std::env::var_os("MONGO_URI").is_none() {
        return Ok(memory_repositories());
    }

    let config = MongoConfig::from_env()
        .await
        .context("reading MongoDB settings")?;
    let connection = MongoConnection::connect(config)
        .await
        .context("connecting to MongoDB")?;

    let users = MongoRepository::<UserEntity>::new(connection.clone());
    users
        .ensure_index("name")
        .await
        .context("creating user name index")?;
    let teams = MongoRepository::<TeamEntity>::new(connection);
    Ok((Arc::new(teams), Arc::new(users)))
}

#[cfg(not(feature = "mongo-store"))]
async fn open_repositories() -> anyhow::Result<Repositories> {
    Ok(memory_repositories())
}

fn memory_repositories() -> Repositories {
    warn!("no MongoDB configured; teams and users will not outlive the process");
    (
        Arc::new(MemoryRepository::<TeamEntity>::new()),
        Arc::new(MemoryRepository::<UserEntity>::new()),
    )
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
