//! Domain model: requests, drivers, scored results and collaborator shapes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MatchError;

/// A WGS84 coordinate with an optional human-readable address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: String::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Reject non-finite or out-of-range coordinates. `field` names the
    /// offending input in the error message.
    pub fn validate(&self, field: &str) -> Result<(), MatchError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(MatchError::validation(format!(
                "{field}: latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(MatchError::validation(format!(
                "{field}: longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    #[serde(rename = "motorbike")]
    Motorbike,
    #[serde(rename = "car_4_seat")]
    Car4Seat,
    #[serde(rename = "car_7_seat")]
    Car7Seat,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [Self::Motorbike, Self::Car4Seat, Self::Car7Seat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Motorbike => "motorbike",
            Self::Car4Seat => "car_4_seat",
            Self::Car7Seat => "car_7_seat",
        }
    }

    /// Lenient lookup used where an unknown class must not be an error.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| MatchError::validation(format!("unknown vehicle class '{s}'")))
    }
}

/// Fare bounds the passenger is willing to pay. `max_price <= 0` means "no range".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min_price: f64,
    pub max_price: f64,
}

impl PriceRange {
    pub fn new(min_price: f64, max_price: f64) -> Self {
        Self {
            min_price,
            max_price,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_price <= 0.0
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if !self.min_price.is_finite() || !self.max_price.is_finite() {
            return Err(MatchError::validation("price_range must be finite"));
        }
        if self.min_price < 0.0 || self.max_price < 0.0 {
            return Err(MatchError::validation("price_range must be non-negative"));
        }
        if !self.is_unbounded() && self.min_price > self.max_price {
            return Err(MatchError::validation(
                "price_range.min_price exceeds price_range.max_price",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Matched,
    Expired,
    Cancelled,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Matched => "matched",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Status never returns to `Pending`. `Matched` may still be swept to
    /// `Expired` or `Cancelled` while none of its results was accepted.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Pending, Matched)
                | (Pending, Expired)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Matched, Expired)
                | (Matched, Cancelled)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Matched)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One passenger's ask for a ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub request_time: DateTime<Utc>,
    pub max_wait: Duration,
    pub preferred_vehicle: Option<VehicleClass>,
    pub max_distance_km: f64,
    pub price_range: PriceRange,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchRequest {
    /// True once `max_wait` has elapsed since the request was created. A
    /// deadline past what chrono can represent counts as elapsed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.max_wait)
            .ok()
            .and_then(|max_wait| self.created_at.checked_add_signed(max_wait))
            .map_or(true, |deadline| now >= deadline)
    }
}

/// Fallbacks and ceilings applied when a [`NewMatchRequest`] is materialised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestDefaults {
    pub max_wait: Duration,
    /// Longest `max_wait` a passenger may ask for.
    pub max_wait_limit: Duration,
    pub max_distance_km: f64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10 * 60),
            max_wait_limit: Duration::from_secs(2 * 60 * 60),
            max_distance_km: 15.0,
        }
    }
}

/// Passenger input for a new request; optional fields fall back to configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMatchRequest {
    pub passenger_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    #[serde(default)]
    pub max_wait: Option<Duration>,
    #[serde(default)]
    pub preferred_vehicle: Option<VehicleClass>,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    #[serde(default)]
    pub price_range: Option<PriceRange>,
}

impl NewMatchRequest {
    pub fn new(passenger_id: Uuid, pickup: GeoPoint, dropoff: GeoPoint) -> Self {
        Self {
            passenger_id,
            pickup,
            dropoff,
            max_wait: None,
            preferred_vehicle: None,
            max_distance_km: None,
            price_range: None,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_preferred_vehicle(mut self, class: VehicleClass) -> Self {
        self.preferred_vehicle = Some(class);
        self
    }

    pub fn with_max_distance_km(mut self, km: f64) -> Self {
        self.max_distance_km = Some(km);
        self
    }

    pub fn with_price_range(mut self, range: PriceRange) -> Self {
        self.price_range = Some(range);
        self
    }

    /// Validate and materialise a `Pending` request.
    pub fn into_request(
        self,
        defaults: &RequestDefaults,
        now: DateTime<Utc>,
    ) -> Result<MatchRequest, MatchError> {
        if self.passenger_id.is_nil() {
            return Err(MatchError::validation("passenger_id is required"));
        }
        self.pickup.validate("pickup")?;
        self.dropoff.validate("dropoff")?;

        let max_wait = self.max_wait.unwrap_or(defaults.max_wait);
        if max_wait.is_zero() {
            return Err(MatchError::validation("max_wait must be positive"));
        }
        if max_wait > defaults.max_wait_limit {
            return Err(MatchError::validation(format!(
                "max_wait must be at most {}s, got {}s",
                defaults.max_wait_limit.as_secs(),
                max_wait.as_secs()
            )));
        }

        let max_distance_km = match self.max_distance_km {
            Some(km) if km > 0.0 && km.is_finite() => km,
            Some(km) if km == 0.0 => defaults.max_distance_km,
            None => defaults.max_distance_km,
            Some(km) => {
                return Err(MatchError::validation(format!(
                    "max_distance_km must be positive, got {km}"
                )))
            }
        };

        let price_range = self.price_range.unwrap_or_default();
        price_range.validate()?;

        Ok(MatchRequest {
            id: Uuid::new_v4(),
            passenger_id: self.passenger_id,
            pickup: self.pickup,
            dropoff: self.dropoff,
            request_time: now,
            max_wait,
            preferred_vehicle: self.preferred_vehicle,
            max_distance_km,
            price_range,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A candidate in the driver pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location: GeoPoint,
    pub is_available: bool,
    pub vehicle_class: VehicleClass,
    pub rating: f64,
    pub completed_trips: u32,
    pub last_active_at: DateTime<Utc>,
    pub max_distance_km: f64,
    #[serde(default)]
    pub preferred_areas: Vec<GeoPoint>,
}

impl Driver {
    pub fn validate(&self) -> Result<(), MatchError> {
        if !(0.0..=5.0).contains(&self.rating) {
            return Err(MatchError::validation(format!(
                "driver {} rating {} outside [0, 5]",
                self.id, self.rating
            )));
        }
        self.location.validate("driver.location")?;
        for area in &self.preferred_areas {
            area.validate("driver.preferred_areas")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    /// Held while trip creation is in flight during an accept.
    Reserved,
    Accepted,
    Rejected,
    Expired,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reserved => "reserved",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored driver pairing produced for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: Uuid,
    pub request_id: Uuid,
    pub driver_id: Uuid,
    pub score: f64,
    pub estimated_distance_km: f64,
    pub estimated_pickup_time: Duration,
    pub estimated_price: f64,
    pub status: ResultStatus,
    pub match_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Request plus the number of results recorded for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequestView {
    pub request: MatchRequest,
    pub estimated_matches: usize,
}

/// A pending result paired with the request it answers, as shown to drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverMatchView {
    pub result: MatchResult,
    pub request: MatchRequest,
}

/// User record returned by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub rating: f64,
}

/// Payload handed to the trip collaborator on accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripDraft {
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub estimated_price: f64,
    pub estimated_time_minutes: u32,
    pub estimated_distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub status: String,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saigon() -> GeoPoint {
        GeoPoint::new(10.7769, 106.7009)
    }

    #[test]
    fn request_status_never_returns_to_pending() {
        use RequestStatus::*;
        for from in [Pending, Matched, Expired, Cancelled, Failed] {
            assert!(!from.can_transition_to(Pending), "{from} -> pending");
        }
        assert!(Pending.can_transition_to(Matched));
        assert!(Matched.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Matched));
        assert!(!Failed.can_transition_to(Expired));
    }

    #[test]
    fn vehicle_class_round_trips_wire_names() {
        assert_eq!(VehicleClass::from_name("car_7_seat"), Some(VehicleClass::Car7Seat));
        assert_eq!(VehicleClass::from_name("truck"), None);
        assert!("truck".parse::<VehicleClass>().is_err());
        assert_eq!(VehicleClass::Car4Seat.to_string(), "car_4_seat");
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let err = GeoPoint::new(91.0, 0.0).validate("pickup").unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(GeoPoint::new(0.0, f64::NAN).validate("dropoff").is_err());
        assert!(saigon().validate("pickup").is_ok());
    }

    #[test]
    fn new_request_applies_defaults() {
        let now = Utc::now();
        let request = NewMatchRequest::new(Uuid::new_v4(), saigon(), saigon())
            .into_request(&RequestDefaults::default(), now)
            .expect("valid request");
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.max_wait, Duration::from_secs(600));
        assert_eq!(request.max_distance_km, 15.0);
        assert!(request.price_range.is_unbounded());
        assert_eq!(request.created_at, now);
    }

    #[test]
    fn new_request_rejects_inverted_price_range() {
        let err = NewMatchRequest::new(Uuid::new_v4(), saigon(), saigon())
            .with_price_range(PriceRange::new(50_000.0, 10_000.0))
            .into_request(&RequestDefaults::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, MatchError::Validation(_)));
    }

    #[test]
    fn new_request_rejects_max_wait_above_limit() {
        let defaults = RequestDefaults::default();
        let at_limit = NewMatchRequest::new(Uuid::new_v4(), saigon(), saigon())
            .with_max_wait(defaults.max_wait_limit)
            .into_request(&defaults, Utc::now());
        assert!(at_limit.is_ok());

        for max_wait in [
            defaults.max_wait_limit + Duration::from_secs(1),
            Duration::from_secs(u64::MAX),
        ] {
            let err = NewMatchRequest::new(Uuid::new_v4(), saigon(), saigon())
                .with_max_wait(max_wait)
                .into_request(&defaults, Utc::now())
                .unwrap_err();
            assert_eq!(err.code(), "validation_error");
        }
    }

    #[test]
    fn request_becomes_stale_after_max_wait() {
        let now = Utc::now();
        let request = NewMatchRequest::new(Uuid::new_v4(), saigon(), saigon())
            .with_max_wait(Duration::from_secs(60))
            .into_request(&RequestDefaults::default(), now)
            .expect("valid request");
        assert!(!request.is_stale(now + chrono::Duration::seconds(59)));
        assert!(request.is_stale(now + chrono::Duration::seconds(60)));
    }

    #[test]
    fn driver_rating_must_be_within_bounds() {
        let mut driver = Driver {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            location: saigon(),
            is_available: true,
            vehicle_class: VehicleClass::Motorbike,
            rating: 4.8,
            completed_trips: 12,
            last_active_at: Utc::now(),
            max_distance_km: 10.0,
            preferred_areas: Vec::new(),
        };
        assert!(driver.validate().is_ok());
        driver.rating = 5.1;
        assert!(driver.validate().is_err());
    }
}
