//! Geodesy: great-circle distance plus analytic pickup-time and fare estimates.
//!
//! Distances are haversine over a spherical Earth. Fares follow
//! `distance_km * base_rate_per_km * class_multiplier`, floored at the minimum fare.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use lru::LruCache;

use crate::model::{GeoPoint, VehicleClass};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Coordinate quantisation for distance cache keys (~0.1 m).
const KEY_SCALE: f64 = 1e6;

const DEFAULT_DISTANCE_CACHE_SIZE: usize = 50_000;

/// Fare and speed constants used by the estimators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingConfig {
    /// Currency units per kilometre before the class multiplier.
    pub base_rate_per_km: f64,
    pub motorbike_multiplier: f64,
    pub car_4_seat_multiplier: f64,
    pub car_7_seat_multiplier: f64,
    /// Floor applied to every fare.
    pub minimum_fare: f64,
    /// Average road speed for time estimates (km/h).
    pub average_speed_kmh: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_rate_per_km: 8_000.0,
            motorbike_multiplier: 1.0,
            car_4_seat_multiplier: 1.5,
            car_7_seat_multiplier: 2.0,
            minimum_fare: 20_000.0,
            average_speed_kmh: 25.0,
        }
    }
}

impl PricingConfig {
    pub fn multiplier(&self, class: VehicleClass) -> f64 {
        match class {
            VehicleClass::Motorbike => self.motorbike_multiplier,
            VehicleClass::Car4Seat => self.car_4_seat_multiplier,
            VehicleClass::Car7Seat => self.car_7_seat_multiplier,
        }
    }

    /// Multiplier for a raw class name; unknown names price as `car_4_seat`.
    pub fn multiplier_for_name(&self, name: &str) -> f64 {
        VehicleClass::from_name(name)
            .map(|class| self.multiplier(class))
            .unwrap_or(self.car_4_seat_multiplier)
    }

    pub fn fare_for_distance(&self, distance_km: f64, multiplier: f64) -> f64 {
        (distance_km * self.base_rate_per_km * multiplier).max(self.minimum_fare)
    }
}

/// Haversine distance in kilometres.
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Travel time for `distance_km` at `average_speed_kmh`.
pub fn travel_time(distance_km: f64, average_speed_kmh: f64) -> Duration {
    if average_speed_kmh <= 0.0 || !distance_km.is_finite() || distance_km <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(distance_km / average_speed_kmh * 3600.0)
}

pub fn estimate_time(a: &GeoPoint, b: &GeoPoint, average_speed_kmh: f64) -> Duration {
    travel_time(distance_km(a, b), average_speed_kmh)
}

pub fn estimate_price(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    class: VehicleClass,
    pricing: &PricingConfig,
) -> f64 {
    pricing.fare_for_distance(distance_km(pickup, dropoff), pricing.multiplier(class))
}

pub fn estimate_price_for_class_name(
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    class_name: &str,
    pricing: &PricingConfig,
) -> f64 {
    pricing.fare_for_distance(
        distance_km(pickup, dropoff),
        pricing.multiplier_for_name(class_name),
    )
}

type PointKey = (i64, i64);

fn point_key(point: &GeoPoint) -> PointKey {
    (
        (point.latitude * KEY_SCALE).round() as i64,
        (point.longitude * KEY_SCALE).round() as i64,
    )
}

/// Estimators bound to one pricing configuration, with an LRU cache of
/// pairwise distances shared across scoring passes.
#[derive(Debug)]
pub struct Estimator {
    pricing: PricingConfig,
    distances: Mutex<LruCache<(PointKey, PointKey), f64>>,
}

impl Estimator {
    pub fn new(pricing: PricingConfig) -> Self {
        Self::with_cache_size(pricing, DEFAULT_DISTANCE_CACHE_SIZE)
    }

    pub fn with_cache_size(pricing: PricingConfig, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            pricing,
            distances: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// Cached haversine distance. The key is symmetric so `(a, b)` and `(b, a)` share an entry.
    pub fn distance_km(&self, a: &GeoPoint, b: &GeoPoint) -> f64 {
        let (ka, kb) = (point_key(a), point_key(b));
        let key = if ka <= kb { (ka, kb) } else { (kb, ka) };
        let mut cache = match self.distances.lock() {
            Ok(guard) => guard,
            Err(_) => return distance_km(a, b),
        };
        *cache.get_or_insert(key, || distance_km(a, b))
    }

    pub fn travel_time(&self, distance_km: f64) -> Duration {
        travel_time(distance_km, self.pricing.average_speed_kmh)
    }

    pub fn pickup_time(&self, from: &GeoPoint, to: &GeoPoint) -> Duration {
        self.travel_time(self.distance_km(from, to))
    }

    pub fn trip_price(&self, pickup: &GeoPoint, dropoff: &GeoPoint, class: VehicleClass) -> f64 {
        self.pricing.fare_for_distance(
            self.distance_km(pickup, dropoff),
            self.pricing.multiplier(class),
        )
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn pickup() -> GeoPoint {
        GeoPoint::new(10.7769, 106.7009)
    }

    fn dropoff() -> GeoPoint {
        GeoPoint::new(10.7626, 106.6822)
    }

    #[test]
    fn distance_is_symmetric() {
        let points = [
            pickup(),
            dropoff(),
            GeoPoint::new(-33.8688, 151.2093),
            GeoPoint::new(52.52, 13.405),
            GeoPoint::new(0.0, 179.9),
            GeoPoint::new(0.0, -179.9),
        ];
        for a in &points {
            for b in &points {
                assert!((distance_km(a, b) - distance_km(b, a)).abs() < TOLERANCE);
            }
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(distance_km(&pickup(), &pickup()), 0.0);
    }

    #[test]
    fn distance_satisfies_triangle_inequality() {
        let a = pickup();
        let b = dropoff();
        let c = GeoPoint::new(10.8231, 106.6297);
        assert!(distance_km(&a, &c) <= distance_km(&a, &b) + distance_km(&b, &c) + 1e-9);
    }

    #[test]
    fn downtown_trip_estimates() {
        let distance = distance_km(&pickup(), &dropoff());
        assert!((2.34..=2.86).contains(&distance), "distance {distance}");

        let minutes = estimate_time(&pickup(), &dropoff(), 25.0).as_secs_f64() / 60.0;
        assert!((6.0..=7.0).contains(&minutes), "minutes {minutes}");

        let pricing = PricingConfig::default();
        let price = estimate_price(&pickup(), &dropoff(), VehicleClass::Car4Seat, &pricing);
        assert!((price - distance * 8_000.0 * 1.5).abs() < 1e-6);
        assert!(price > pricing.minimum_fare);
        assert!((28_000.0..=34_000.0).contains(&price), "price {price}");
    }

    #[test]
    fn short_trips_pay_the_minimum_fare() {
        let pricing = PricingConfig::default();
        let near = GeoPoint::new(10.7770, 106.7010);
        for class in VehicleClass::ALL {
            assert_eq!(
                estimate_price(&pickup(), &near, class, &pricing),
                pricing.minimum_fare
            );
        }
        assert_eq!(pricing.fare_for_distance(0.0, 2.0), pricing.minimum_fare);
    }

    #[test]
    fn unknown_class_prices_as_four_seat_car() {
        let pricing = PricingConfig::default();
        let unknown = estimate_price_for_class_name(&pickup(), &dropoff(), "limousine", &pricing);
        let car = estimate_price(&pickup(), &dropoff(), VehicleClass::Car4Seat, &pricing);
        assert_eq!(unknown, car);
    }

    #[test]
    fn cached_distance_matches_uncached() {
        let estimator = Estimator::with_cache_size(PricingConfig::default(), 4);
        let first = estimator.distance_km(&pickup(), &dropoff());
        let reversed = estimator.distance_km(&dropoff(), &pickup());
        assert!((first - distance_km(&pickup(), &dropoff())).abs() < TOLERANCE);
        assert_eq!(first, reversed);
    }

    #[test]
    fn zero_distance_takes_no_time() {
        assert_eq!(travel_time(0.0, 25.0), Duration::ZERO);
        assert_eq!(travel_time(5.0, 0.0), Duration::ZERO);
        assert_eq!(travel_time(25.0, 25.0), Duration::from_secs(3600));
    }
}
