//! Environment-driven service configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use match_core::config::{EngineConfig, MatchingConfig, ReaperConfig, StrategyKind, WorkerConfig};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error(transparent)]
    Engine(#[from] match_core::config::ConfigError),
}

/// Everything the binary needs to start: listener, engine tuning and seed data.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    pub matching: MatchingConfig,
    pub workers: WorkerConfig,
    pub reaper: ReaperConfig,
    /// JSON array of drivers loaded into the pool at start.
    pub driver_seed: Option<PathBuf>,
    /// Comma-separated CORS origins; empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            matching: MatchingConfig::default(),
            workers: WorkerConfig::default(),
            reaper: ReaperConfig::default(),
            driver_seed: None,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Read the process environment. Call after `dotenv()` so `.env` values apply.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(port) = parse_var(&var, "PORT", "port number")? {
            config.port = port;
        }
        if let Some(algorithm) = var("MATCHING_ALGORITHM") {
            config.matching.strategy = StrategyKind::from_str(&algorithm)?;
        }
        if let Some(max_results) = parse_var(&var, "MATCHING_MAX_RESULTS", "result count")? {
            config.matching.max_results = max_results;
        }
        if let Some(radius) = parse_var(&var, "MATCHING_SEARCH_RADIUS_KM", "distance in km")? {
            config.matching.search_radius_km = radius;
        }
        if let Some(rating) = parse_var(&var, "MATCHING_MIN_RATING", "rating")? {
            config.matching.min_driver_rating = rating;
        }
        if let Some(secs) = parse_var(&var, "MATCHING_MAX_WAIT_LIMIT_SECS", "number of seconds")? {
            config.matching.max_wait_limit = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_var(&var, "MATCHING_WORKERS", "worker count")? {
            config.workers.worker_count = workers;
        }
        if let Some(capacity) = parse_var(&var, "MATCHING_QUEUE_CAPACITY", "queue capacity")? {
            config.workers.queue_capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64, _>(&var, "REAPER_INTERVAL_SECS", "number of seconds")? {
            // 0 turns the sweep off.
            config.reaper.enabled = secs > 0;
            config.reaper.interval = Duration::from_secs(secs);
        }
        config.driver_seed = var("MATCHING_DRIVER_SEED").map(PathBuf::from);
        if let Some(origins) = var("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }

        config.to_engine_config().validate()?;
        Ok(config)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            matching: self.matching.clone(),
            workers: self.workers,
            reaper: self.reaper,
            ..EngineConfig::default()
        }
    }
}

fn parse_var<T, V>(var: &V, key: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value, expected })
        })
        .transpose()
}
