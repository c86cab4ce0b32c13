use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MatchError;
use crate::geo::distance_km;
use crate::model::{Driver, GeoPoint, MatchRequest, MatchResult, RequestStatus, ResultStatus};
use crate::spatial::DriverSpatialIndex;

use super::{DriverStore, RequestStore, ResultStore};

#[derive(Debug, Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<Uuid, MatchRequest>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: MatchRequest) -> Result<(), MatchError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(MatchError::conflict(format!(
                "match request {} already exists",
                request.id
            )));
        }
        requests.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<MatchRequest, MatchError> {
        self.requests
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| MatchError::not_found(format!("match request {id}")))
    }

    async fn list_by_passenger(
        &self,
        passenger_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MatchRequest>, MatchError> {
        let requests = self.requests.read().await;
        let mut found: Vec<MatchRequest> = requests
            .values()
            .filter(|request| request.passenger_id == passenger_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
        limit: usize,
    ) -> Result<Vec<MatchRequest>, MatchError> {
        let requests = self.requests.read().await;
        let mut found: Vec<MatchRequest> = requests
            .values()
            .filter(|request| request.status == status)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn transition(
        &self,
        id: Uuid,
        next: RequestStatus,
        at: DateTime<Utc>,
    ) -> Result<MatchRequest, MatchError> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&id)
            .ok_or_else(|| MatchError::not_found(format!("match request {id}")))?;
        if !request.status.can_transition_to(next) {
            return Err(MatchError::conflict(format!(
                "match request {id} cannot move from {} to {next}",
                request.status
            )));
        }
        request.status = next;
        request.updated_at = at;
        Ok(request.clone())
    }
}

#[derive(Debug, Default)]
struct DriverTable {
    drivers: HashMap<Uuid, Driver>,
    index: DriverSpatialIndex,
}

/// Driver table bucketed by H3 cell for radius lookups.
#[derive(Debug, Default)]
pub struct InMemoryDriverStore {
    table: RwLock<DriverTable>,
}

impl InMemoryDriverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.drivers.len()
    }
}

#[async_trait]
impl DriverStore for InMemoryDriverStore {
    async fn upsert(&self, driver: Driver) -> Result<(), MatchError> {
        driver.validate()?;
        let mut table = self.table.write().await;
        table.index.upsert(driver.id, &driver.location);
        table.drivers.insert(driver.id, driver);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Driver, MatchError> {
        self.table
            .read()
            .await
            .drivers
            .get(&id)
            .cloned()
            .ok_or_else(|| MatchError::not_found(format!("driver {id}")))
    }

    async fn find_available(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Driver>, MatchError> {
        let table = self.table.read().await;
        let mut in_range: Vec<(f64, &Driver)> = table
            .index
            .candidates_within(center, radius_km)
            .into_iter()
            .filter_map(|id| table.drivers.get(&id))
            .filter(|driver| driver.is_available)
            .map(|driver| (distance_km(&driver.location, center), driver))
            .filter(|(distance, _)| *distance <= radius_km)
            .collect();
        in_range.sort_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)));
        Ok(in_range
            .into_iter()
            .take(limit)
            .map(|(_, driver)| driver.clone())
            .collect())
    }

    async fn update_location(
        &self,
        id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<Driver, MatchError> {
        location.validate("location")?;
        let mut table = self.table.write().await;
        let DriverTable { drivers, index } = &mut *table;
        let driver = drivers
            .get_mut(&id)
            .ok_or_else(|| MatchError::not_found(format!("driver {id}")))?;
        index.upsert(id, &location);
        driver.location = location;
        driver.last_active_at = at;
        Ok(driver.clone())
    }

    async fn set_availability(&self, id: Uuid, available: bool) -> Result<(), MatchError> {
        let mut table = self.table.write().await;
        let driver = table
            .drivers
            .get_mut(&id)
            .ok_or_else(|| MatchError::not_found(format!("driver {id}")))?;
        driver.is_available = available;
        Ok(())
    }

    async fn try_reserve(&self, id: Uuid) -> Result<bool, MatchError> {
        let mut table = self.table.write().await;
        let driver = table
            .drivers
            .get_mut(&id)
            .ok_or_else(|| MatchError::not_found(format!("driver {id}")))?;
        if !driver.is_available {
            return Ok(false);
        }
        driver.is_available = false;
        Ok(true)
    }
}

#[derive(Debug, Default)]
struct ResultTable {
    results: HashMap<Uuid, MatchResult>,
    /// Result ids per request in insertion (rank) order.
    by_request: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    table: RwLock<ResultTable>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_score_desc(a: &MatchResult, b: &MatchResult) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert_batch(&self, results: Vec<MatchResult>) -> Result<(), MatchError> {
        let mut table = self.table.write().await;
        if let Some(duplicate) = results.iter().find(|r| table.results.contains_key(&r.id)) {
            return Err(MatchError::conflict(format!(
                "match result {} already exists",
                duplicate.id
            )));
        }
        for result in results {
            table
                .by_request
                .entry(result.request_id)
                .or_default()
                .push(result.id);
            table.results.insert(result.id, result);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<MatchResult, MatchError> {
        self.table
            .read()
            .await
            .results
            .get(&id)
            .cloned()
            .ok_or_else(|| MatchError::not_found(format!("match result {id}")))
    }

    async fn list_by_request(&self, request_id: Uuid) -> Result<Vec<MatchResult>, MatchError> {
        let table = self.table.read().await;
        let mut found: Vec<MatchResult> = table
            .by_request
            .get(&request_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| table.results.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        found.sort_by(by_score_desc);
        Ok(found)
    }

    async fn count_by_request(&self, request_id: Uuid) -> Result<usize, MatchError> {
        Ok(self
            .table
            .read()
            .await
            .by_request
            .get(&request_id)
            .map_or(0, Vec::len))
    }

    async fn list_pending_for_driver(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MatchResult>, MatchError> {
        let table = self.table.read().await;
        let mut found: Vec<MatchResult> = table
            .results
            .values()
            .filter(|r| r.driver_id == driver_id && r.status == ResultStatus::Pending)
            .cloned()
            .collect();
        found.sort_by(|a, b| by_score_desc(a, b).then_with(|| a.id.cmp(&b.id)));
        found.truncate(limit);
        Ok(found)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ResultStatus,
        next: ResultStatus,
    ) -> Result<MatchResult, MatchError> {
        let mut table = self.table.write().await;
        let result = table
            .results
            .get_mut(&id)
            .ok_or_else(|| MatchError::not_found(format!("match result {id}")))?;
        if result.status != expected {
            return Err(MatchError::conflict(format!(
                "match result {id} is {}, expected {expected}",
                result.status
            )));
        }
        result.status = next;
        Ok(result.clone())
    }

    async fn expire_pending(
        &self,
        request_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<Vec<Uuid>, MatchError> {
        let mut table = self.table.write().await;
        let ResultTable {
            results,
            by_request,
        } = &mut *table;
        let mut expired = Vec::new();
        for id in by_request.get(&request_id).into_iter().flatten() {
            if Some(*id) == keep {
                continue;
            }
            if let Some(result) = results.get_mut(id) {
                if result.status == ResultStatus::Pending {
                    result.status = ResultStatus::Expired;
                    expired.push(*id);
                }
            }
        }
        Ok(expired)
    }

    async fn expire_unclaimed(&self, request_id: Uuid) -> Result<Vec<Uuid>, MatchError> {
        let mut table = self.table.write().await;
        let ResultTable {
            results,
            by_request,
        } = &mut *table;
        let ids = by_request.get(&request_id).map_or(&[][..], Vec::as_slice);
        if let Some(claimed) = ids
            .iter()
            .filter_map(|id| results.get(id))
            .find(|r| matches!(r.status, ResultStatus::Reserved | ResultStatus::Accepted))
        {
            return Err(MatchError::conflict(format!(
                "match result {} of request {request_id} is {}",
                claimed.id, claimed.status
            )));
        }
        let mut expired = Vec::new();
        for id in ids {
            if let Some(result) = results.get_mut(id) {
                if result.status == ResultStatus::Pending {
                    result.status = ResultStatus::Expired;
                    expired.push(*id);
                }
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{driver_km_north_of, pending_result, pickup_point};

    #[tokio::test]
    async fn find_available_orders_by_distance_and_caps() {
        let store = InMemoryDriverStore::new();
        let pickup = pickup_point();
        let mut busy = driver_km_north_of(&pickup, 0.5);
        busy.is_available = false;
        let drivers = [
            driver_km_north_of(&pickup, 4.0),
            driver_km_north_of(&pickup, 1.0),
            driver_km_north_of(&pickup, 30.0),
            driver_km_north_of(&pickup, 2.0),
        ];
        store.upsert(busy).await.unwrap();
        for driver in &drivers {
            store.upsert(driver.clone()).await.unwrap();
        }

        let found = store.find_available(&pickup, 10.0, 2).await.unwrap();
        let ids: Vec<_> = found.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![drivers[1].id, drivers[3].id]);
    }

    #[tokio::test]
    async fn try_reserve_is_conditional() {
        let store = InMemoryDriverStore::new();
        let driver = driver_km_north_of(&pickup_point(), 1.0);
        store.upsert(driver.clone()).await.unwrap();

        assert!(store.try_reserve(driver.id).await.unwrap());
        assert!(!store.try_reserve(driver.id).await.unwrap());
        assert!(!store.get(driver.id).await.unwrap().is_available);
    }

    #[tokio::test]
    async fn update_location_moves_driver_in_index() {
        let store = InMemoryDriverStore::new();
        let pickup = pickup_point();
        let driver = driver_km_north_of(&pickup, 40.0);
        store.upsert(driver.clone()).await.unwrap();
        assert!(store.find_available(&pickup, 5.0, 10).await.unwrap().is_empty());

        store
            .update_location(driver.id, pickup.clone(), Utc::now())
            .await
            .unwrap();
        assert_eq!(store.find_available(&pickup, 5.0, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn transition_rejects_leaving_terminal_state() {
        let store = InMemoryRequestStore::new();
        let request = crate::test_helpers::scoring_fixture().request;
        store.insert(request.clone()).await.unwrap();

        store
            .transition(request.id, RequestStatus::Expired, Utc::now())
            .await
            .unwrap();
        let err = store
            .transition(request.id, RequestStatus::Matched, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn expire_pending_keeps_the_chosen_result() {
        let store = InMemoryResultStore::new();
        let request_id = Uuid::new_v4();
        let results: Vec<_> = [0.9, 0.7, 0.5]
            .into_iter()
            .map(|score| pending_result(request_id, Uuid::new_v4(), score))
            .collect();
        store.insert_batch(results.clone()).await.unwrap();

        let expired = store
            .expire_pending(request_id, Some(results[0].id))
            .await
            .unwrap();
        assert_eq!(expired, vec![results[1].id, results[2].id]);
        assert_eq!(
            store.get(results[0].id).await.unwrap().status,
            ResultStatus::Pending
        );

        let err = store
            .compare_and_set_status(results[1].id, ResultStatus::Pending, ResultStatus::Accepted)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[tokio::test]
    async fn expire_unclaimed_refuses_while_a_result_is_reserved() {
        let store = InMemoryResultStore::new();
        let request_id = Uuid::new_v4();
        let results: Vec<_> = [0.9, 0.7]
            .into_iter()
            .map(|score| pending_result(request_id, Uuid::new_v4(), score))
            .collect();
        store.insert_batch(results.clone()).await.unwrap();
        store
            .compare_and_set_status(results[0].id, ResultStatus::Pending, ResultStatus::Reserved)
            .await
            .unwrap();

        let err = store.expire_unclaimed(request_id).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(
            store.get(results[1].id).await.unwrap().status,
            ResultStatus::Pending
        );

        store
            .compare_and_set_status(results[0].id, ResultStatus::Reserved, ResultStatus::Pending)
            .await
            .unwrap();
        let expired = store.expire_unclaimed(request_id).await.unwrap();
        assert_eq!(expired, vec![results[0].id, results[1].id]);
        assert!(store
            .expire_unclaimed(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }
}
