use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;

use crate::cache::MatchCache;
use crate::error::MatchError;
use crate::model::{Driver, GeoPoint};
use crate::store::DriverStore;

/// Driver-facing view of the store: availability, locations and reservations.
///
/// Location writes go to the store first and then refresh the cache; reads of
/// a single driver's location try the cache before the store.
#[derive(Clone)]
pub struct CandidatePool {
    drivers: Arc<dyn DriverStore>,
    cache: Arc<MatchCache>,
}

impl CandidatePool {
    pub fn new(drivers: Arc<dyn DriverStore>, cache: Arc<MatchCache>) -> Self {
        Self { drivers, cache }
    }

    /// Available drivers within `radius_km` of `center`, nearest first.
    pub async fn find_available(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, MatchError> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(MatchError::validation(format!(
                "search radius must be non-negative, got {radius_km}"
            )));
        }
        center.validate("center")?;
        let drivers = self.drivers.find_available(center, radius_km, limit).await?;
        debug!(
            "pool lookup radius_km={radius_km} limit={limit} found={}",
            drivers.len()
        );
        Ok(drivers)
    }

    pub async fn register(&self, driver: Driver) -> Result<(), MatchError> {
        let (id, location) = (driver.id, driver.location.clone());
        self.drivers.upsert(driver).await?;
        self.cache.put_driver_location(id, location);
        Ok(())
    }

    pub async fn get(&self, driver_id: Uuid) -> Result<Driver, MatchError> {
        self.drivers.get(driver_id).await
    }

    pub async fn update_location(
        &self,
        driver_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Driver, MatchError> {
        let driver = self.drivers.update_location(driver_id, location, at).await?;
        self.cache
            .put_driver_location(driver.id, driver.location.clone());
        Ok(driver)
    }

    pub async fn set_availability(&self, driver_id: Uuid, available: bool) -> Result<(), MatchError> {
        self.drivers.set_availability(driver_id, available).await
    }

    pub async fn driver_location(&self, driver_id: Uuid) -> Result<GeoPoint, MatchError> {
        if let Some(location) = self.cache.driver_location(driver_id) {
            return Ok(location);
        }
        let driver = self.drivers.get(driver_id).await?;
        self.cache
            .put_driver_location(driver_id, driver.location.clone());
        Ok(driver.location)
    }

    /// Take the driver out of the pool if still available.
    pub async fn try_reserve_driver(&self, driver_id: Uuid) -> Result<bool, MatchError> {
        self.drivers.try_reserve(driver_id).await
    }

    /// Undo a reservation that did not turn into a trip.
    pub async fn release_driver(&self, driver_id: Uuid) -> Result<(), MatchError> {
        self.drivers.set_availability(driver_id, true).await
    }
}
