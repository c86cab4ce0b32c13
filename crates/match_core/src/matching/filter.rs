use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::MatchingConfig;
use crate::geo::Estimator;
use crate::model::{Driver, MatchRequest};

/// Eligibility policy applied between the pool fetch and scoring.
///
/// A driver survives when it is available, meets the minimum rating, drives
/// the passenger's preferred vehicle class (if one was given), sits within the
/// passenger's own max distance and was active inside the freshness window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateFilter {
    pub min_rating: f64,
    pub freshness_window: Duration,
}

impl CandidateFilter {
    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            min_rating: config.min_driver_rating,
            freshness_window: config.freshness_window,
        }
    }

    pub fn admits(
        &self,
        request: &MatchRequest,
        driver: &Driver,
        estimator: &Estimator,
        now: DateTime<Utc>,
    ) -> bool {
        if !driver.is_available || driver.rating < self.min_rating {
            return false;
        }
        if let Some(preferred) = request.preferred_vehicle {
            if driver.vehicle_class != preferred {
                return false;
            }
        }
        if estimator.distance_km(&driver.location, &request.pickup) > request.max_distance_km {
            return false;
        }
        let idle = now - driver.last_active_at;
        match chrono::Duration::from_std(self.freshness_window) {
            Ok(window) => idle <= window,
            Err(_) => true,
        }
    }

    /// Keep eligible drivers, preserving their order.
    pub fn apply(
        &self,
        request: &MatchRequest,
        drivers: Vec<Driver>,
        estimator: &Estimator,
        now: DateTime<Utc>,
    ) -> Vec<Driver> {
        drivers
            .into_iter()
            .filter(|driver| self.admits(request, driver, estimator, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VehicleClass;
    use crate::test_helpers::{driver_km_north_of, scoring_fixture};

    fn filter() -> CandidateFilter {
        CandidateFilter::from_config(&MatchingConfig::default())
    }

    #[test]
    fn drops_low_rated_stale_and_far_drivers() {
        let fixture = scoring_fixture();
        let pickup = fixture.request.pickup.clone();

        let ok = driver_km_north_of(&pickup, 1.0);
        let mut low_rated = driver_km_north_of(&pickup, 1.0);
        low_rated.rating = 2.5;
        let mut stale = driver_km_north_of(&pickup, 1.0);
        stale.last_active_at = fixture.now - chrono::Duration::minutes(6);
        let too_far = driver_km_north_of(&pickup, fixture.request.max_distance_km + 1.0);
        let mut busy = driver_km_north_of(&pickup, 1.0);
        busy.is_available = false;

        let kept = filter().apply(
            &fixture.request,
            vec![ok.clone(), low_rated, stale, too_far, busy],
            &fixture.estimator,
            fixture.now,
        );
        assert_eq!(kept, vec![ok]);
    }

    #[test]
    fn honours_vehicle_preference_only_when_given() {
        let mut fixture = scoring_fixture();
        let mut bike = driver_km_north_of(&fixture.request.pickup, 1.0);
        bike.vehicle_class = VehicleClass::Motorbike;

        assert!(filter().admits(&fixture.request, &bike, &fixture.estimator, fixture.now));
        fixture.request.preferred_vehicle = Some(VehicleClass::Car7Seat);
        assert!(!filter().admits(&fixture.request, &bike, &fixture.estimator, fixture.now));
    }

    #[test]
    fn empty_pool_yields_empty_survivors() {
        let fixture = scoring_fixture();
        assert!(filter()
            .apply(&fixture.request, Vec::new(), &fixture.estimator, fixture.now)
            .is_empty());
    }
}
