//! Non-authoritative TTL cache fronting driver locations and match results.
//!
//! Entries live in an LRU bounded by `CacheConfig::capacity` and expire on
//! read once their TTL has passed. Every failure is reported as a miss so the
//! caller falls through to the store.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::warn;
use lru::LruCache;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::model::{GeoPoint, MatchResult};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct TtlCache<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) if Instant::now() < entry.expires_at => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => true,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.put(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    pub fn invalidate(&self, key: &K) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.pop(key);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read accelerator for the driver-location and match-result stores.
#[derive(Debug)]
pub struct MatchCache {
    driver_locations: TtlCache<Uuid, GeoPoint>,
    results: TtlCache<Uuid, MatchResult>,
}

impl MatchCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            driver_locations: TtlCache::new(config.capacity, config.driver_location_ttl),
            results: TtlCache::new(config.capacity, config.match_result_ttl),
        }
    }

    pub fn driver_location(&self, driver_id: Uuid) -> Option<GeoPoint> {
        self.driver_locations
            .get(&driver_id)
            .unwrap_or_else(|err| miss("driver location", driver_id, err))
    }

    pub fn put_driver_location(&self, driver_id: Uuid, location: GeoPoint) {
        if let Err(err) = self.driver_locations.put(driver_id, location) {
            warn!("cache write failed for driver location driver_id={driver_id}: {err}");
        }
    }

    pub fn result(&self, result_id: Uuid) -> Option<MatchResult> {
        self.results
            .get(&result_id)
            .unwrap_or_else(|err| miss("match result", result_id, err))
    }

    pub fn put_result(&self, result: &MatchResult) {
        if let Err(err) = self.results.put(result.id, result.clone()) {
            warn!("cache write failed for match result result_id={}: {err}", result.id);
        }
    }

    pub fn invalidate_result(&self, result_id: Uuid) {
        if let Err(err) = self.results.invalidate(&result_id) {
            warn!("cache invalidation failed for match result result_id={result_id}: {err}");
        }
    }
}

impl Default for MatchCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

fn miss<T>(kind: &str, id: Uuid, err: CacheError) -> Option<T> {
    warn!("cache read failed for {kind} id={id}: {err}");
    None
}
