use std::{sync::Arc, time::Duration};

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::{sync::RwLock, time::sleep};
use tracing::{info, warn};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

struct RetryPolicy;

impl RetryPolicy {
    const MAX_ATTEMPTS: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 250;

    fn initial_delay() -> Duration {
        Duration::from_millis(Self::INITIAL_DELAY_MS)
    }

    fn next_delay(current: Duration) -> Duration {
        (current * 2).min(Duration::from_secs(5))
    }
}

/// Shared handle to a MongoDB database, cloned into every repository.
#[derive(Clone)]
pub struct MongoConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    state: RwLock<ConnectionState>,
    config: MongoConfig,
}

struct ConnectionState {
    client: Client,
    database: Database,
}

impl MongoConnection {
    /// Connect, retrying the initial ping with exponential backoff.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;
        info!(database = %config.database_name, "connected to MongoDB");

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                state: RwLock::new(ConnectionState { client, database }),
                config,
            }),
        })
    }

    /// Clone the current database handle.
    pub async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    /// Issue a ping against the current connection.
    pub async fn ping(&self) -> MongoResult<()> {
        self.database()
            .await
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    /// Replace the client with a freshly established one.
    pub async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.inner.config.options, &self.inner.config.database_name)
                .await?;
        let mut guard = self.inner.state.write().await;
        guard.client = client;
        guard.database = database;
        info!("MongoDB connection re-established");
        Ok(())
    }
}

async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempts = 0;
    let mut delay = RetryPolicy::initial_delay();

    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => {
                attempts += 1;
                if attempts >= RetryPolicy::MAX_ATTEMPTS {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                warn!(
                    attempts,
                    wait_ms = delay.as_millis(),
                    error = %err,
                    "MongoDB ping failed during initial connection; retrying"
                );
                sleep(delay).await;
                delay = RetryPolicy::next_delay(delay);
            }
        }
    }

    Ok((client, database))
}
