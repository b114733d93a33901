//! Application-level configuration loading: name rules, display colours and timings.

use std::{
    env, fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::team::tickable::MAX_FREEZE;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HCTEAMS_CONFIG_PATH";

/// Why a configuration file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read `{path}`")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// File is not valid JSON for [`AppConfig`].
    #[error("failed to parse `{path}`")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
    /// File parsed but holds unusable values.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
}

/// Bounds on team name length, counted in characters.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default, rename_all = "kebab-case")]
pub struct NameConfig {
    /// Shortest accepted name.
    #[validate(range(min = 1))]
    pub min_length: usize,
    /// Longest accepted name.
    #[validate(range(min = 1, max = 64))]
    pub max_length: usize,
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            min_length: 3,
            max_length: 16,
        }
    }
}

/// Colour codes prefixed to team names depending on the viewer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DisplayConfig {
    /// Viewer is a member.
    pub friendly_colour: String,
    /// Viewer holds an invitation.
    pub invited_colour: String,
    /// Viewer is an outsider.
    pub enemy_colour: String,
    /// Server-owned teams.
    pub system_colour: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            friendly_colour: "§a".into(),
            invited_colour: "§e".into(),
            enemy_colour: "§c".into(),
            system_colour: "§c".into(),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    /// Team name rules.
    pub name: NameConfig,
    /// Name colours.
    pub display: DisplayConfig,
    /// How long a death freezes the team's DTR.
    pub dtr_freeze_secs: u64,
    /// Cadence of the tick loop.
    pub tick_interval_ms: u64,
    /// Cadence of the autosave loop.
    pub autosave_interval_secs: u64,
    /// Upper bound for loading every document at startup.
    pub load_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: NameConfig::default(),
            display: DisplayConfig::default(),
            dtr_freeze_secs: 120,
            tick_interval_ms: 50,
            autosave_interval_secs: 60,
            load_timeout_ms: 1_000,
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(name_errors) = self.name.validate() {
            errors.merge_self("name", Err(name_errors));
        } else if self.name.min_length > self.name.max_length {
            let mut err = ValidationError::new("name_bounds");
            err.message = Some(
                format!(
                    "min-length ({}) exceeds max-length ({})",
                    self.name.min_length, self.name.max_length
                )
                .into(),
            );
            errors.add("name", err);
        }

        if self.dtr_freeze() > MAX_FREEZE {
            let mut err = ValidationError::new("dtr_freeze_too_long");
            err.message = Some(
                format!("must be at most {} seconds", MAX_FREEZE.as_secs()).into(),
            );
            errors.add("dtr_freeze_secs", err);
        }

        for (field, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("autosave_interval_secs", self.autosave_interval_secs),
            ("load_timeout_ms", self.load_timeout_ms),
        ] {
            if value == 0 {
                let mut err = ValidationError::new("zero_interval");
                err.message = Some("must be greater than zero".into());
                errors.add(field, err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults when the file is
    /// missing or unusable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match Self::load_from(&path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    min_name = config.name.min_length,
                    max_name = config.name.max_length,
                    "loaded configuration"
                );
                config
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "unusable config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Read and validate the configuration stored at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// DTR freeze applied on death.
    pub fn dtr_freeze(&self) -> Duration {
        Duration::from_secs(self.dtr_freeze_secs)
    }

    /// Tick loop period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Autosave loop period.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    /// Startup load deadline.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
