//! Shared fixtures for unit tests, integration tests and benches.
//!
//! Everything is anchored at [`fixture_now`], an off-peak weekday instant, so
//! freshness checks and the time-of-day feature are deterministic.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use uuid::Uuid;

use crate::clock::ManualClock;
use crate::collaborators::local::LocalTripService;
use crate::collaborators::{IdentityService, Notifier, TripService};
use crate::config::{EngineConfig, ScoringWeights};
use crate::context::{EngineContext, EngineDeps};
use crate::error::MatchError;
use crate::geo::{Estimator, EARTH_RADIUS_KM};
use crate::matching::ScoringContext;
use crate::model::{
    Driver, GeoPoint, MatchRequest, MatchResult, NewMatchRequest, RequestDefaults, ResultStatus,
    Trip, TripDraft, UserProfile, VehicleClass,
};
use crate::store::{DriverStore, InMemoryDriverStore};

/// Tuesday 2024-05-14 11:00 UTC.
///
/// # Panics
///
/// Never; the date is a valid constant.
pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 14, 11, 0, 0)
        .single()
        .expect("fixture instant is valid")
}

pub fn pickup_point() -> GeoPoint {
    GeoPoint::new(10.7769, 106.7009).with_address("Ben Thanh Market")
}

pub fn dropoff_point() -> GeoPoint {
    GeoPoint::new(10.7626, 106.6822).with_address("District 5")
}

/// A request at [`pickup_point`] from a fresh passenger, using engine defaults.
pub fn new_request() -> NewMatchRequest {
    NewMatchRequest::new(Uuid::new_v4(), pickup_point(), dropoff_point())
}

/// An available four-seat driver exactly `km` north of `origin`, active at
/// [`fixture_now`].
pub fn driver_km_north_of(origin: &GeoPoint, km: f64) -> Driver {
    let latitude = origin.latitude + (km / EARTH_RADIUS_KM).to_degrees();
    Driver {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        location: GeoPoint::new(latitude, origin.longitude),
        is_available: true,
        vehicle_class: VehicleClass::Car4Seat,
        rating: 4.5,
        completed_trips: 10,
        last_active_at: fixture_now(),
        max_distance_km: 10.0,
        preferred_areas: Vec::new(),
    }
}

/// `count` eligible drivers scattered within `radius_km` of `center`.
pub fn random_driver_pool(center: &GeoPoint, count: usize, radius_km: f64, seed: u64) -> Vec<Driver> {
    let mut rng = StdRng::seed_from_u64(seed);
    let km_per_degree = EARTH_RADIUS_KM.to_radians();
    (0..count)
        .map(|_| {
            let bearing = rng.gen_range(0.0..std::f64::consts::TAU);
            let reach = radius_km * rng.gen::<f64>().sqrt();
            let mut driver = driver_km_north_of(center, 0.0);
            driver.location = GeoPoint::new(
                center.latitude + reach * bearing.cos() / km_per_degree,
                center.longitude
                    + reach * bearing.sin() / (km_per_degree * center.latitude.to_radians().cos()),
            );
            driver.rating = rng.gen_range(3.0..=5.0);
            driver.completed_trips = rng.gen_range(0..400);
            driver.vehicle_class = VehicleClass::ALL[rng.gen_range(0..VehicleClass::ALL.len())];
            driver.last_active_at = fixture_now() - chrono::Duration::seconds(rng.gen_range(0..240));
            driver.max_distance_km = rng.gen_range(5.0..20.0);
            driver
        })
        .collect()
}

pub fn pending_result(request_id: Uuid, driver_id: Uuid, score: f64) -> MatchResult {
    let now = fixture_now();
    MatchResult {
        id: Uuid::new_v4(),
        request_id,
        driver_id,
        score,
        estimated_distance_km: 1.5,
        estimated_pickup_time: Duration::from_secs(216),
        estimated_price: 20_000.0,
        status: ResultStatus::Pending,
        match_time: now,
        created_at: now,
    }
}

/// A request plus everything a [`ScoringContext`] borrows.
pub struct ScoringFixture {
    pub request: MatchRequest,
    pub estimator: Estimator,
    pub weights: ScoringWeights,
    pub now: DateTime<Utc>,
}

impl ScoringFixture {
    pub fn context(&self) -> ScoringContext<'_> {
        ScoringContext {
            request: &self.request,
            weights: &self.weights,
            estimator: &self.estimator,
            now: self.now,
            max_results: 10,
        }
    }
}

/// # Panics
///
/// Never; the fixture request is valid.
pub fn scoring_fixture() -> ScoringFixture {
    let now = fixture_now();
    let request = new_request()
        .with_max_distance_km(15.0)
        .into_request(&RequestDefaults::default(), now)
        .expect("fixture request is valid");
    ScoringFixture {
        request,
        estimator: Estimator::default(),
        weights: ScoringWeights::default(),
        now,
    }
}

/// Engine context over in-memory stores, a [`ManualClock`] at
/// [`fixture_now`] and a [`RecordingNotifier`].
pub struct FixtureEngine {
    pub ctx: Arc<EngineContext>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
}

impl FixtureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_deps(EngineDeps::in_memory(), config)
    }

    /// Replaces the notifier and clock of `deps`; everything else is kept.
    pub fn with_deps(deps: EngineDeps, config: EngineConfig) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(fixture_now()));
        let deps = deps
            .with_notifier(notifier.clone())
            .with_clock(clock.clone());
        Self {
            ctx: Arc::new(EngineContext::new(deps, &config)),
            notifier,
            clock,
        }
    }

    /// # Panics
    ///
    /// Panics if the driver is rejected by the store.
    pub async fn add_driver(&self, driver: Driver) {
        self.ctx
            .pool
            .register(driver)
            .await
            .expect("fixture driver is valid");
    }

    /// Validate and store `new` as `Pending` without queueing a job.
    ///
    /// # Panics
    ///
    /// Panics if the request is invalid or already stored.
    pub async fn insert_request(&self, new: NewMatchRequest) -> MatchRequest {
        let request = new
            .into_request(&self.ctx.config.request_defaults(), self.ctx.now())
            .expect("fixture request is valid");
        self.ctx
            .requests
            .insert(request.clone())
            .await
            .expect("fixture request is new");
        request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    DriverMatch { driver_id: Uuid, result_id: Uuid },
    PassengerMatch { passenger_id: Uuid, trip_id: Uuid },
    Timeout { passenger_id: Uuid, request_id: Uuid },
}

/// Notifier that remembers every call.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn driver_notifications(&self) -> Vec<(Uuid, Uuid)> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::DriverMatch {
                    driver_id,
                    result_id,
                } => Some((driver_id, result_id)),
                _ => None,
            })
            .collect()
    }

    pub fn passenger_notifications(&self) -> Vec<(Uuid, Uuid)> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::PassengerMatch {
                    passenger_id,
                    trip_id,
                } => Some((passenger_id, trip_id)),
                _ => None,
            })
            .collect()
    }

    /// Request ids that got a timeout notification, in order.
    pub fn timeouts(&self) -> Vec<Uuid> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Timeout { request_id, .. } => Some(request_id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_driver_match(
        &self,
        driver_id: Uuid,
        _request: &MatchRequest,
        result: &MatchResult,
    ) -> Result<(), MatchError> {
        self.record(Notification::DriverMatch {
            driver_id,
            result_id: result.id,
        });
        Ok(())
    }

    async fn notify_passenger_match(
        &self,
        passenger_id: Uuid,
        _result: &MatchResult,
        trip: &Trip,
    ) -> Result<(), MatchError> {
        self.record(Notification::PassengerMatch {
            passenger_id,
            trip_id: trip.id,
        });
        Ok(())
    }

    async fn notify_match_timeout(
        &self,
        passenger_id: Uuid,
        request: &MatchRequest,
    ) -> Result<(), MatchError> {
        self.record(Notification::Timeout {
            passenger_id,
            request_id: request.id,
        });
        Ok(())
    }
}

/// Identity service that knows only the listed passengers.
#[derive(Debug, Default)]
pub struct KnownPassengers {
    known: HashSet<Uuid>,
}

impl KnownPassengers {
    pub fn new(known: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityService for KnownPassengers {
    async fn get_user(&self, user_id: Uuid) -> Result<UserProfile, MatchError> {
        if !self.known.contains(&user_id) {
            return Err(MatchError::not_found(format!("user {user_id}")));
        }
        Ok(UserProfile {
            id: user_id,
            name: "Known Passenger".to_string(),
            phone: String::new(),
            email: String::new(),
            rating: 4.8,
        })
    }
}

/// Trip service whose every call fails with `ExternalService`.
#[derive(Debug, Default)]
pub struct FailingTripService {
    calls: Mutex<usize>,
}

impl FailingTripService {
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }
}

#[async_trait]
impl TripService for FailingTripService {
    async fn create_trip(&self, draft: TripDraft) -> Result<Trip, MatchError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        Err(MatchError::ExternalService(format!(
            "trip service unavailable for driver {}",
            draft.driver_id
        )))
    }
}

/// Trip service that parks every call until [`GatedTripService::open`], then
/// creates the trip like [`LocalTripService`].
#[derive(Debug)]
pub struct GatedTripService {
    calls: watch::Sender<usize>,
    gate: watch::Sender<bool>,
}

impl Default for GatedTripService {
    fn default() -> Self {
        Self {
            calls: watch::channel(0).0,
            gate: watch::channel(false).0,
        }
    }
}

impl GatedTripService {
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Resolves once some caller is parked inside `create_trip`.
    pub async fn wait_for_call(&self) {
        let mut calls = self.calls.subscribe();
        let _ = calls.wait_for(|n| *n > 0).await;
    }
}

#[async_trait]
impl TripService for GatedTripService {
    async fn create_trip(&self, draft: TripDraft) -> Result<Trip, MatchError> {
        let mut gate = self.gate.subscribe();
        self.calls.send_modify(|n| *n += 1);
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| MatchError::Internal("trip service gate dropped".to_string()))?;
        LocalTripService.create_trip(draft).await
    }
}

/// Driver store whose radius queries block until [`GatedDriverStore::open`].
#[derive(Debug)]
pub struct GatedDriverStore {
    inner: InMemoryDriverStore,
    gate: watch::Sender<bool>,
}

impl Default for GatedDriverStore {
    fn default() -> Self {
        Self {
            inner: InMemoryDriverStore::new(),
            gate: watch::channel(false).0,
        }
    }
}

impl GatedDriverStore {
    pub fn open(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl DriverStore for GatedDriverStore {
    async fn upsert(&self, driver: Driver) -> Result<(), MatchError> {
        self.inner.upsert(driver).await
    }

    async fn get(&self, id: Uuid) -> Result<Driver, MatchError> {
        self.inner.get(id).await
    }

    async fn find_available(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, MatchError> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| MatchError::Internal("driver store gate dropped".to_string()))?;
        self.inner.find_available(center, radius_km, limit).await
    }

    async fn update_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Driver, MatchError> {
        self.inner.update_location(id, location, at).await
    }

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), MatchError> {
        self.inner.set_availability(id, available).await
    }

    async fn try_reserve(&self, id: Uuid) -> Result<bool, MatchError> {
        self.inner.try_reserve(id).await
    }
}

/// Poll `probe` every 10 ms for up to two seconds.
pub async fn eventually<F, Fut>(mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_km;

    #[test]
    fn north_offset_is_exact() {
        let origin = pickup_point();
        let driver = driver_km_north_of(&origin, 3.0);
        assert!((distance_km(&origin, &driver.location) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn random_pool_is_seeded_and_within_radius() {
        let center = pickup_point();
        let first = random_driver_pool(&center, 50, 5.0, 7);
        let second = random_driver_pool(&center, 50, 5.0, 7);
        let locations = |pool: &[Driver]| pool.iter().map(|d| d.location.clone()).collect::<Vec<_>>();
        assert_eq!(locations(&first), locations(&second));
        assert!(first
            .iter()
            .all(|d| distance_km(&center, &d.location) <= 5.01));
    }
}
