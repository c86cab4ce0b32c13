//! JSON bodies of the matching API.
//!
//! Durations cross the wire as whole seconds; distances in km.

use std::time::Duration;

use chrono::{DateTime, Utc};
use match_core::acceptance::AcceptOutcome;
use match_core::model::{
    Driver, DriverMatchView, GeoPoint, MatchRequestView, MatchResult, NewMatchRequest,
    PriceRange, RequestStatus, ResultStatus, VehicleClass,
};
use match_core::MatchError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SERVICE_NAME: &str = "match-service";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMatchRequest {
    pub passenger_id: Uuid,
    pub pickup_location: GeoPoint,
    pub dropoff_location: GeoPoint,
    /// 0 or absent means the configured default.
    #[serde(default)]
    pub max_wait_seconds: Option<u64>,
    /// Unknown names are ignored rather than rejected.
    #[serde(default)]
    pub preferred_car_type: Option<String>,
    #[serde(default)]
    pub max_distance: Option<f64>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
}

impl CreateMatchRequest {
    pub fn into_new_request(self) -> NewMatchRequest {
        NewMatchRequest {
            passenger_id: self.passenger_id,
            pickup: self.pickup_location,
            dropoff: self.dropoff_location,
            max_wait: self
                .max_wait_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            preferred_vehicle: self
                .preferred_car_type
                .as_deref()
                .and_then(VehicleClass::from_name),
            max_distance_km: self.max_distance,
            price_range: self.price_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequestResponse {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub pickup_location: GeoPoint,
    pub dropoff_location: GeoPoint,
    pub status: RequestStatus,
    pub preferred_car_type: Option<VehicleClass>,
    pub max_wait_seconds: u64,
    pub max_distance: f64,
    pub price_range: PriceRange,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_matches: usize,
}

impl From<MatchRequestView> for MatchRequestResponse {
    fn from(view: MatchRequestView) -> Self {
        let request = view.request;
        Self {
            id: request.id,
            passenger_id: request.passenger_id,
            pickup_location: request.pickup,
            dropoff_location: request.dropoff,
            status: request.status,
            preferred_car_type: request.preferred_vehicle,
            max_wait_seconds: request.max_wait.as_secs(),
            max_distance: request.max_distance_km,
            price_range: request.price_range,
            created_at: request.created_at,
            updated_at: request.updated_at,
            estimated_matches: view.estimated_matches,
        }
    }
}

/// A scored result. Driver-facing listings also carry the trip endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResultResponse {
    pub id: Uuid,
    pub match_request_id: Uuid,
    pub driver_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_location: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_location: Option<GeoPoint>,
    pub score: f64,
    pub estimated_distance: f64,
    pub estimated_time_seconds: u64,
    pub estimated_price: f64,
    pub status: ResultStatus,
    pub match_time: DateTime<Utc>,
}

impl From<MatchResult> for MatchResultResponse {
    fn from(result: MatchResult) -> Self {
        Self {
            id: result.id,
            match_request_id: result.request_id,
            driver_id: result.driver_id,
            passenger_id: None,
            pickup_location: None,
            dropoff_location: None,
            score: result.score,
            estimated_distance: result.estimated_distance_km,
            estimated_time_seconds: result.estimated_pickup_time.as_secs(),
            estimated_price: result.estimated_price,
            status: result.status,
            match_time: result.match_time,
        }
    }
}

impl From<DriverMatchView> for MatchResultResponse {
    fn from(view: DriverMatchView) -> Self {
        let request = view.request;
        Self {
            passenger_id: Some(request.passenger_id),
            pickup_location: Some(request.pickup),
            dropoff_location: Some(request.dropoff),
            ..Self::from(view.result)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptMatchResponse {
    pub match_result_id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub estimated_time_seconds: u64,
    pub estimated_price: f64,
    pub status: ResultStatus,
}

impl From<AcceptOutcome> for AcceptMatchResponse {
    fn from(outcome: AcceptOutcome) -> Self {
        Self {
            match_result_id: outcome.result.id,
            trip_id: outcome.trip.id,
            passenger_id: outcome.passenger_id,
            driver_id: outcome.result.driver_id,
            estimated_time_seconds: outcome.result.estimated_pickup_time.as_secs(),
            estimated_price: outcome.result.estimated_price,
            status: outcome.result.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDriverLocation {
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpdateDriverAvailability {
    pub available: bool,
}

fn default_available() -> bool {
    true
}

fn default_driver_rating() -> f64 {
    5.0
}

fn default_driver_max_distance() -> f64 {
    10.0
}

/// Pool entry as posted to the register endpoint or listed in a seed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDriver {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub current_location: GeoPoint,
    #[serde(default = "default_available")]
    pub is_available: bool,
    pub car_type: String,
    #[serde(default = "default_driver_rating")]
    pub rating: f64,
    #[serde(default)]
    pub completed_trips: u32,
    #[serde(default = "default_driver_max_distance")]
    pub max_distance: f64,
    #[serde(default)]
    pub preferred_areas: Vec<GeoPoint>,
}

impl RegisterDriver {
    /// Materialise a pool entry, stamping it as active at `now`.
    pub fn into_driver(self, now: DateTime<Utc>) -> Result<Driver, MatchError> {
        let vehicle_class = self.car_type.parse()?;
        let id = self.id.unwrap_or_else(Uuid::new_v4);
        let driver = Driver {
            id,
            user_id: self.user_id.unwrap_or(id),
            location: self.current_location,
            is_available: self.is_available,
            vehicle_class,
            rating: self.rating,
            completed_trips: self.completed_trips,
            last_active_at: now,
            max_distance_km: self.max_distance,
            preferred_areas: self.preferred_areas,
        };
        driver.validate()?;
        Ok(driver)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub current_location: GeoPoint,
    pub is_available: bool,
    pub car_type: VehicleClass,
    pub rating: f64,
    pub completed_trips: u32,
    pub last_active_at: DateTime<Utc>,
    pub max_distance: f64,
}

impl From<Driver> for DriverResponse {
    fn from(driver: Driver) -> Self {
        Self {
            id: driver.id,
            user_id: driver.user_id,
            current_location: driver.location,
            is_available: driver.is_available,
            car_type: driver.vehicle_class,
            rating: driver.rating,
            completed_trips: driver.completed_trips,
            last_active_at: driver.last_active_at,
            max_distance: driver.max_distance_km,
        }
    }
}

/// `?limit=` on the driver listing. Kept as text so junk falls back to the default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

impl LimitQuery {
    /// Parsed limit, or 0 (engine default) when absent or malformed.
    pub fn value(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    pub fn healthy(timestamp: DateTime<Utc>) -> Self {
        Self {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            timestamp,
        }
    }
}
