//! Driver acceptance of a match result.
//!
//! The result is reserved (`Pending -> Reserved`) before the driver, so two
//! drivers cannot both claim one result and one driver cannot claim two. Any
//! failure before the commit releases whatever was reserved. The commit marks
//! the result `Accepted` and expires its pending siblings.

use std::sync::Arc;

use log::{error, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::MatchError;
use crate::model::{MatchResult, RequestStatus, ResultStatus, Trip, TripDraft};

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    pub trip: Trip,
    pub result: MatchResult,
    pub passenger_id: Uuid,
}

#[derive(Clone)]
pub struct AcceptanceCoordinator {
    ctx: Arc<EngineContext>,
}

impl AcceptanceCoordinator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub async fn accept(&self, driver_id: Uuid, result_id: Uuid) -> Result<AcceptOutcome, MatchError> {
        let ctx = &self.ctx;
        let result = ctx.load_result(result_id).await?;
        if result.driver_id != driver_id {
            return Err(MatchError::Unauthorized(format!(
                "match result {result_id} is not addressed to driver {driver_id}"
            )));
        }
        if result.status != ResultStatus::Pending {
            return Err(MatchError::conflict(format!(
                "match result {result_id} is already {}",
                result.status
            )));
        }

        let reserved = ctx
            .results
            .compare_and_set_status(result_id, ResultStatus::Pending, ResultStatus::Reserved)
            .await?;
        ctx.cache.put_result(&reserved);

        match ctx.pool.try_reserve_driver(driver_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.release_result(result_id).await;
                return Err(MatchError::conflict(format!(
                    "driver {driver_id} is not available"
                )));
            }
            Err(err) => {
                self.release_result(result_id).await;
                return Err(err);
            }
        }

        let request = match ctx.requests.get(reserved.request_id).await {
            Ok(request) if request.status == RequestStatus::Matched => request,
            Ok(request) => {
                self.release(result_id, driver_id).await;
                return Err(MatchError::conflict(format!(
                    "match request {} is {}",
                    request.id, request.status
                )));
            }
            Err(err) => {
                self.release(result_id, driver_id).await;
                return Err(err);
            }
        };

        let draft = TripDraft {
            passenger_id: request.passenger_id,
            driver_id,
            pickup: request.pickup.clone(),
            dropoff: request.dropoff.clone(),
            estimated_price: reserved.estimated_price,
            estimated_time_minutes: whole_minutes(reserved.estimated_pickup_time),
            estimated_distance_km: reserved.estimated_distance_km,
        };
        let trip = match ctx.trips.create_trip(draft).await {
            Ok(trip) => trip,
            Err(err) => {
                warn!("trip creation failed result_id={result_id} driver_id={driver_id}: {err}");
                self.release(result_id, driver_id).await;
                return Err(match err {
                    MatchError::ExternalService(_) => err,
                    other => MatchError::ExternalService(format!("trip creation failed: {other}")),
                });
            }
        };

        let accepted = ctx
            .results
            .compare_and_set_status(result_id, ResultStatus::Reserved, ResultStatus::Accepted)
            .await
            .map_err(|err| {
                error!(
                    "trip {} created but result could not be committed result_id={result_id}: {err}",
                    trip.id
                );
                err
            })?;
        ctx.cache.put_result(&accepted);

        match ctx.expire_pending_results(request.id, Some(result_id)).await {
            Ok(expired) => info!(
                "match accepted result_id={result_id} driver_id={driver_id} trip_id={} expired_siblings={}",
                trip.id,
                expired.len()
            ),
            Err(err) => error!(
                "match accepted but siblings not expired request_id={}: {err}",
                request.id
            ),
        }

        self.notify_passenger(request.passenger_id, accepted.clone(), trip.clone());

        Ok(AcceptOutcome {
            trip,
            result: accepted,
            passenger_id: request.passenger_id,
        })
    }

    async fn release(&self, result_id: Uuid, driver_id: Uuid) {
        if let Err(err) = self.ctx.pool.release_driver(driver_id).await {
            error!("could not release driver driver_id={driver_id}: {err}");
        }
        self.release_result(result_id).await;
    }

    async fn release_result(&self, result_id: Uuid) {
        match self
            .ctx
            .results
            .compare_and_set_status(result_id, ResultStatus::Reserved, ResultStatus::Pending)
            .await
        {
            Ok(released) => self.ctx.cache.put_result(&released),
            Err(err) => {
                self.ctx.cache.invalidate_result(result_id);
                error!("could not release match result result_id={result_id}: {err}");
            }
        }
    }

    fn notify_passenger(&self, passenger_id: Uuid, result: MatchResult, trip: Trip) {
        let notifier = Arc::clone(&self.ctx.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier
                .notify_passenger_match(passenger_id, &result, &trip)
                .await
            {
                warn!("passenger notification failed passenger_id={passenger_id}: {err}");
            }
        });
    }
}

fn whole_minutes(duration: std::time::Duration) -> u32 {
    let minutes = duration.as_secs() / 60;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}
