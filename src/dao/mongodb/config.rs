use std::fmt;

use mongodb::options::ClientOptions;
use tracing::info;

use super::error::{MongoDaoError, MongoResult};

const URI_VAR: &str = "MONGO_URI";
const DATABASE_VAR: &str = "MONGO_DB";
const DEFAULT_DATABASE: &str = "hcteams";
const APP_NAME: &str = "hcteams";
const MAX_DATABASE_NAME_LEN: usize = 63;
const FORBIDDEN_DATABASE_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Parsed connection settings for the MongoDB backend.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the URI.
    pub options: ClientOptions,
    /// Database holding the `teams` and `users` collections.
    pub database_name: String,
    redacted_uri: String,
}

impl MongoConfig {
    /// Parse `uri` and pick the database: `database` when given, else the one named in the URI
    /// path, else `hcteams`.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let redacted_uri = redact_uri(uri);
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: redacted_uri.clone(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());

        let database_name = database
            .map(str::to_owned)
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        validate_database_name(&database_name)?;

        Ok(Self {
            options,
            database_name,
            redacted_uri,
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional) from the environment.
    pub async fn from_env() -> MongoResult<Self> {
        Self::from_vars(|var| std::env::var(var).ok()).await
    }

    async fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> MongoResult<Self> {
        let uri = lookup(URI_VAR).ok_or(MongoDaoError::MissingEnvVar { var: URI_VAR })?;
        let database = lookup(DATABASE_VAR).filter(|name| !name.trim().is_empty());
        let config = Self::from_uri(&uri, database.as_deref()).await?;
        info!(
            uri = %config.redacted_uri,
            database = %config.database_name,
            "MongoDB settings read"
        );
        Ok(config)
    }

    /// Connection URI with any password replaced by `***`, safe to log.
    pub fn redacted_uri(&self) -> &str {
        &self.redacted_uri
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("uri", &self.redacted_uri)
            .field("database_name", &self.database_name)
            .field("app_name", &self.options.app_name)
            .finish()
    }
}

fn validate_database_name(name: &str) -> MongoResult<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_DATABASE_NAME_LEN {
        "must be at most 63 bytes"
    } else if name.contains(FORBIDDEN_DATABASE_CHARS) {
        "must not contain / \\ . space \" $ or NUL"
    } else {
        return Ok(());
    };
    Err(MongoDaoError::InvalidDatabaseName {
        name: name.to_owned(),
        reason,
    })
}

/// Mask the password in the authority part of `uri`, keeping the user name.
fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|at| at + 3) else {
        return uri.to_owned();
    };
    let rest = &uri[scheme_end..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return uri.to_owned();
    };

    let user = match rest[..at].split_once(':') {
        Some((user, _)) => format!("{user}:***"),
        None => rest[..at].to_owned(),
    };
    format!("{}{user}{}", &uri[..scheme_end], &rest[at..])
}
