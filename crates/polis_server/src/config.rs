//! Server configuration and data file loading.

use std::path::{Path, PathBuf};

use polis_core::data::GameData;
use polis_core::error::GameError;
use polis_core::store::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration and data files.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Parsed but unusable.
    #[error("Invalid config: {0}")]
    Invalid(String),
    /// Game data or world seeding was rejected by the core.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Server configuration, read from a RON file.
///
/// Every field has a default, so `()` is a valid config file.
///
/// # Example RON
///
/// ```ron
/// (
///     queue_tick_ms: 1000,
///     movement_tick_ms: 5000,
///     retry: (max_attempts: 5, base_backoff_ms: 10, max_backoff_ms: 200),
///     cache_ttl_ms: 2000,
///     data_path: "data/game_data.ron",
///     world_path: Some("data/world.ron"),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interval between queue completion ticks.
    pub queue_tick_ms: u64,
    /// Interval between movement arrival ticks.
    pub movement_tick_ms: u64,
    /// Retry budget for conflicting store commits.
    pub retry: RetryPolicy,
    /// Lifetime of cached city views.
    pub cache_ttl_ms: u64,
    /// Buffered events per subscriber before it lags.
    pub event_capacity: usize,
    /// Game data file.
    pub data_path: PathBuf,
    /// World seed file, if the world should be seeded at startup.
    pub world_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            queue_tick_ms: 1_000,
            movement_tick_ms: 5_000,
            retry: RetryPolicy::default(),
            cache_ttl_ms: 2_000,
            event_capacity: 256,
            data_path: PathBuf::from("data/game_data.ron"),
            world_path: Some(PathBuf::from("data/world.ron")),
        }
    }
}

impl ServerConfig {
    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = read_file(path.as_ref())?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_tick_ms == 0 || self.movement_tick_ms == 0 {
            return Err(ConfigError::Invalid("tick intervals must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        Ok(())
    }
}

/// Load and validate the game data file.
pub fn load_game_data<P: AsRef<Path>>(path: P) -> Result<GameData, ConfigError> {
    let contents = read_file(path.as_ref())?;
    Ok(GameData::from_ron_str(&contents)?)
}

pub(crate) fn read_file(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}
