//! Startup driver pool loading.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use match_core::pool::CandidatePool;
use match_core::MatchError;
use thiserror::Error;

use crate::dto::RegisterDriver;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read driver seed {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse driver seed {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("driver seed entry {index}: {source}")]
    Entry { index: usize, source: MatchError },
}

/// Parse a JSON array of drivers, in the same shape the register endpoint accepts.
pub fn read_seed(path: &Path) -> Result<Vec<RegisterDriver>, SeedError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| SeedError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SeedError::Parse {
        path: display,
        source,
    })
}

/// Register every entry. Returns the number of drivers added.
pub async fn seed_pool(
    pool: &CandidatePool,
    entries: Vec<RegisterDriver>,
    now: DateTime<Utc>,
) -> Result<usize, SeedError> {
    let count = entries.len();
    for (index, entry) in entries.into_iter().enumerate() {
        let driver = entry
            .into_driver(now)
            .map_err(|source| SeedError::Entry { index, source })?;
        pool.register(driver)
            .await
            .map_err(|source| SeedError::Entry { index, source })?;
    }
    Ok(count)
}
