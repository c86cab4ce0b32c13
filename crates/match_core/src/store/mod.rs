//! Persistence seams. The engine only talks to these traits; `memory`
//! provides the in-process implementation used by the service and tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::MatchError;
use crate::model::{Driver, GeoPoint, MatchRequest, MatchResult, RequestStatus, ResultStatus};

pub use memory::{InMemoryDriverStore, InMemoryRequestStore, InMemoryResultStore};

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert(&self, request: MatchRequest) -> Result<(), MatchError>;

    async fn get(&self, id: Uuid) -> Result<MatchRequest, MatchError>;

    /// Newest first, at most `limit` rows.
    async fn list_by_passenger(
        &self,
        passenger_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MatchRequest>, MatchError>;

    /// Oldest first, at most `limit` rows.
    async fn list_by_status(
        &self,
        status: RequestStatus,
        limit: usize,
    ) -> Result<Vec<MatchRequest>, MatchError>;

    /// Move a request to `next`. Fails with `Conflict` when the current status
    /// does not allow it.
    async fn transition(
        &self,
        id: Uuid,
        next: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<MatchRequest, MatchError>;
}

#[async_trait]
pub trait DriverStore: Send + Sync {
    async fn upsert(&self, driver: Driver) -> Result<(), MatchError>;

    async fn get(&self, id: Uuid) -> Result<Driver, MatchError>;

    /// Available drivers within `radius_km` of `center`, nearest first, capped at `limit`.
    async fn find_available(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, MatchError>;

    async fn update_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Driver, MatchError>;

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), MatchError>;

    /// Flip availability to `false` only if it is currently `true`.
    /// Returns `Ok(false)` when the driver was already unavailable.
    async fn try_reserve(&self, id: Uuid) -> Result<bool, MatchError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a ranked batch, preserving its order.
    async fn insert_batch(&self, results: Vec<MatchResult>) -> Result<(), MatchError>;

    async fn get(&self, id: Uuid) -> Result<MatchResult, MatchError>;

    /// Highest score first.
    async fn list_by_request(&self, request_id: Uuid) -> Result<Vec<MatchResult>, MatchError>;

    async fn count_by_request(&self, request_id: Uuid) -> Result<usize, MatchError>;

    /// Pending results addressed to `driver_id`, highest score first.
    async fn list_pending_for_driver(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MatchResult>, MatchError>;

    /// Set `next` only if the result is currently `expected`; `Conflict` otherwise.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ResultStatus,
        next: ResultStatus,
    ) -> Result<MatchResult, MatchError>;

    /// Expire every pending result of `request_id` except `keep`. Returns the expired ids.
    async fn expire_pending(
        &self,
        request_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<Vec<Uuid>, MatchError>;

    /// Expire every pending result of `request_id`, in one step with checking
    /// that none is `Reserved` or `Accepted`. A claimed result fails the call
    /// with `Conflict` and nothing changes.
    async fn expire_unclaimed(&self, request_id: Uuid) -> Result<Vec<Uuid>, MatchError>;
}
