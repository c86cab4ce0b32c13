use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::PricingConfig;
use crate::model::RequestDefaults;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("unknown scoring strategy '{0}' (expected nearest, weighted, ml or hybrid)")]
    UnknownStrategy(String),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Which ranking strategy the orchestrator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Nearest,
    #[default]
    Weighted,
    #[serde(rename = "ml", alias = "feature")]
    Feature,
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Weighted => "weighted",
            Self::Feature => "ml",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "weighted" => Ok(Self::Weighted),
            "ml" | "feature" => Ok(Self::Feature),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Signal weights shared by the weighted and feature-based strategies.
///
/// Defaults sum to 1.0; the sum is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub distance: f64,
    pub rating: f64,
    pub time: f64,
    pub price: f64,
    pub experience: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            distance: 0.4,
            rating: 0.2,
            time: 0.2,
            price: 0.1,
            experience: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.distance + self.rating + self.time + self.price + self.experience
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            self.distance,
            self.rating,
            self.time,
            self.price,
            self.experience,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "weights",
                "every weight must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Matching behaviour: strategy selection, candidate limits and eligibility filters.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    pub strategy: StrategyKind,
    /// Results kept per request after ranking.
    pub max_results: usize,
    /// Drivers fetched from the pool before filtering.
    pub candidate_cap: usize,
    pub search_radius_km: f64,
    pub min_driver_rating: f64,
    /// Drivers inactive for longer than this are not eligible.
    pub freshness_window: Duration,
    pub weights: ScoringWeights,
    pub pricing: PricingConfig,
    pub default_max_wait: Duration,
    /// Requests asking to wait longer than this are rejected.
    pub max_wait_limit: Duration,
    pub default_max_distance_km: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            max_results: 10,
            candidate_cap: 50,
            search_radius_km: 15.0,
            min_driver_rating: 3.0,
            freshness_window: Duration::from_secs(5 * 60),
            weights: ScoringWeights::default(),
            pricing: PricingConfig::default(),
            default_max_wait: Duration::from_secs(10 * 60),
            max_wait_limit: Duration::from_secs(2 * 60 * 60),
            default_max_distance_km: 15.0,
        }
    }
}

impl MatchingConfig {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_candidate_cap(mut self, candidate_cap: usize) -> Self {
        self.candidate_cap = candidate_cap;
        self
    }

    pub fn with_search_radius_km(mut self, km: f64) -> Self {
        self.search_radius_km = km;
        self
    }

    pub fn with_min_driver_rating(mut self, rating: f64) -> Self {
        self.min_driver_rating = rating;
        self
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_wait_limit(mut self, limit: Duration) -> Self {
        self.max_wait_limit = limit;
        self
    }

    pub fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            max_wait: self.default_max_wait,
            max_wait_limit: self.max_wait_limit,
            max_distance_km: self.default_max_distance_km,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_results == 0 {
            return Err(ConfigError::invalid("max_results", "must be at least 1"));
        }
        if self.candidate_cap == 0 {
            return Err(ConfigError::invalid("candidate_cap", "must be at least 1"));
        }
        if !(self.search_radius_km > 0.0 && self.search_radius_km.is_finite()) {
            return Err(ConfigError::invalid(
                "search_radius_km",
                format!("must be positive, got {}", self.search_radius_km),
            ));
        }
        if !(0.0..=5.0).contains(&self.min_driver_rating) {
            return Err(ConfigError::invalid(
                "min_driver_rating",
                format!("must lie in [0, 5], got {}", self.min_driver_rating),
            ));
        }
        if self.pricing.average_speed_kmh <= 0.0 {
            return Err(ConfigError::invalid("average_speed_kmh", "must be positive"));
        }
        if self.default_max_wait.is_zero() {
            return Err(ConfigError::invalid("default_max_wait", "must be positive"));
        }
        if self.default_max_wait > self.max_wait_limit {
            return Err(ConfigError::invalid(
                "max_wait_limit",
                format!(
                    "must be at least the default max wait of {}s",
                    self.default_max_wait.as_secs()
                ),
            ));
        }
        self.weights.validate()
    }
}

/// Background scoring pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub worker_count: usize,
    /// Jobs that may wait for a worker before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub driver_location_ttl: Duration,
    pub match_result_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            driver_location_ttl: Duration::from_secs(5 * 60),
            match_result_ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Periodic sweep of requests that outlived their `max_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Requests examined per status per sweep.
    pub batch_limit: usize,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(30),
            batch_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub workers: WorkerConfig,
    pub cache: CacheConfig,
    pub reaper: ReaperConfig,
}

impl EngineConfig {
    pub fn with_matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_workers(mut self, worker_count: usize, queue_capacity: usize) -> Self {
        self.workers = WorkerConfig {
            worker_count,
            queue_capacity,
        };
        self
    }

    pub fn with_reaper(mut self, reaper: ReaperConfig) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.matching.validate()?;
        if self.workers.worker_count == 0 {
            return Err(ConfigError::invalid("worker_count", "must be at least 1"));
        }
        if self.workers.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be at least 1"));
        }
        if self.reaper.enabled && self.reaper.interval.is_zero() {
            return Err(ConfigError::invalid("reaper.interval", "must be positive"));
        }
        Ok(())
    }
}
