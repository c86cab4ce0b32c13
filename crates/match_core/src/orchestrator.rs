//! Request intake, background matching and the read-side queries.
//!
//! `create_request` validates and persists synchronously, then hands a
//! [`MatchJob`] to the worker pool. The job (`run_job`) fetches candidates,
//! filters and ranks them, persists one `Pending` result per survivor in rank
//! order, notifies drivers and moves the request to `Matched`. It runs under
//! the request's `max_wait` deadline; when that elapses the request expires.

use std::sync::Arc;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::MatchError;
use crate::matching::score_driver_for_request;
use crate::model::{
    DriverMatchView, MatchRequest, MatchRequestView, MatchResult, NewMatchRequest, RequestStatus,
};
use crate::worker::{JobSender, MatchJob, SubmitError};

/// Rows returned by [`MatchOrchestrator::list_passenger_requests`].
pub const PASSENGER_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_DRIVER_MATCH_LIMIT: usize = 10;

/// What a single matching pass did to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched { results: usize },
    NoCandidates,
    /// The request had already left `Pending`; nothing was written.
    Skipped(RequestStatus),
}

#[derive(Clone)]
pub struct MatchOrchestrator {
    ctx: Arc<EngineContext>,
    jobs: JobSender,
}

impl MatchOrchestrator {
    pub fn new(ctx: Arc<EngineContext>, jobs: JobSender) -> Self {
        Self { ctx, jobs }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Validate, persist as `Pending` and queue for matching.
    ///
    /// Returns as soon as the job is queued, so `estimated_matches` is always 0.
    pub async fn create_request(&self, new: NewMatchRequest) -> Result<MatchRequestView, MatchError> {
        let ctx = &self.ctx;
        let request = new.into_request(&ctx.config.request_defaults(), ctx.now())?;
        verify_passenger(ctx, request.passenger_id).await?;

        ctx.requests.insert(request.clone()).await?;
        info!(
            "match request created request_id={} passenger_id={} max_wait_secs={}",
            request.id,
            request.passenger_id,
            request.max_wait.as_secs()
        );

        let started = tokio::time::Instant::now();
        let deadline = started
            .checked_add(request.max_wait)
            .or_else(|| started.checked_add(ctx.config.max_wait_limit))
            .unwrap_or(started);
        let job = MatchJob {
            request_id: request.id,
            deadline,
        };
        if let Err(err) = self.jobs.submit(job) {
            warn!("match request rejected request_id={}: {err}", request.id);
            if let Err(mark_err) = ctx
                .requests
                .transition(request.id, RequestStatus::Failed, ctx.now())
                .await
            {
                error!(
                    "could not mark request failed request_id={}: {mark_err}",
                    request.id
                );
            }
            return Err(match err {
                SubmitError::Overloaded => {
                    MatchError::Internal("matching capacity exhausted, retry later".to_string())
                }
                SubmitError::ShuttingDown => {
                    MatchError::Internal("matching service is shutting down".to_string())
                }
            });
        }

        Ok(MatchRequestView {
            request,
            estimated_matches: 0,
        })
    }

    pub async fn get_request(&self, request_id: Uuid) -> Result<MatchRequestView, MatchError> {
        let request = self.ctx.requests.get(request_id).await?;
        let estimated_matches = self.ctx.results.count_by_request(request_id).await?;
        Ok(MatchRequestView {
            request,
            estimated_matches,
        })
    }

    pub async fn get_result(&self, result_id: Uuid) -> Result<MatchResult, MatchError> {
        self.ctx.load_result(result_id).await
    }

    pub async fn list_results(&self, request_id: Uuid) -> Result<Vec<MatchResult>, MatchError> {
        self.ctx.results.list_by_request(request_id).await
    }

    /// The passenger's most recent requests, newest first, each with its result count.
    pub async fn list_passenger_requests(
        &self,
        passenger_id: Uuid,
    ) -> Result<Vec<MatchRequestView>, MatchError> {
        let requests = self
            .ctx
            .requests
            .list_by_passenger(passenger_id, PASSENGER_HISTORY_LIMIT)
            .await?;
        let mut views = Vec::with_capacity(requests.len());
        for request in requests {
            let estimated_matches = self.ctx.results.count_by_request(request.id).await?;
            views.push(MatchRequestView {
                request,
                estimated_matches,
            });
        }
        Ok(views)
    }

    /// Pending results addressed to `driver_id`, best score first.
    ///
    /// An unavailable driver sees nothing. Results whose request is no longer
    /// open, or whose pickup is now beyond the driver's own max distance, are
    /// skipped. Distance, pickup time and the weighted score are recomputed
    /// from the driver's current location.
    pub async fn list_driver_matches(
        &self,
        driver_id: Uuid,
        limit: usize,
    ) -> Result<Vec<DriverMatchView>, MatchError> {
        let ctx = &self.ctx;
        let limit = if limit == 0 {
            DEFAULT_DRIVER_MATCH_LIMIT
        } else {
            limit
        };
        let mut driver = ctx.pool.get(driver_id).await?;
        if !driver.is_available {
            return Ok(Vec::new());
        }
        driver.location = ctx.pool.driver_location(driver_id).await?;

        let pending = ctx
            .results
            .list_pending_for_driver(driver_id, limit.saturating_mul(2))
            .await?;
        let now = ctx.now();
        let mut views = Vec::with_capacity(pending.len());
        for mut result in pending {
            let request = match ctx.requests.get(result.request_id).await {
                Ok(request) => request,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            if request.status != RequestStatus::Matched {
                continue;
            }
            let distance_km = ctx.estimator.distance_km(&driver.location, &request.pickup);
            if distance_km > driver.max_distance_km {
                continue;
            }
            result.estimated_distance_km = distance_km;
            result.estimated_pickup_time = ctx.estimator.travel_time(distance_km);
            result.score =
                score_driver_for_request(&request, &driver, &ctx.config.weights, &ctx.estimator, now)
                    .score;
            views.push(DriverMatchView { result, request });
        }
        views.sort_by(|a, b| {
            b.result
                .score
                .total_cmp(&a.result.score)
                .then_with(|| a.result.id.cmp(&b.result.id))
        });
        views.truncate(limit);
        Ok(views)
    }

    /// Withdraw an open request. Its pending results expire.
    pub async fn cancel_request(
        &self,
        passenger_id: Uuid,
        request_id: Uuid,
    ) -> Result<MatchRequestView, MatchError> {
        let ctx = &self.ctx;
        let request = ctx.requests.get(request_id).await?;
        if request.passenger_id != passenger_id {
            return Err(MatchError::Unauthorized(format!(
                "match request {request_id} belongs to another passenger"
            )));
        }
        if !request.status.is_open() {
            return Err(MatchError::conflict(format!(
                "match request {request_id} is already {}",
                request.status
            )));
        }
        // Results close first so no accept can reserve one in between.
        let mut expired = ctx.close_results(request_id).await?;
        let request = ctx
            .requests
            .transition(request_id, RequestStatus::Cancelled, ctx.now())
            .await?;
        // Picks up results a scoring pass wrote after the close.
        expired.extend(ctx.expire_pending_results(request_id, None).await?);
        info!(
            "match request cancelled request_id={request_id} expired_results={}",
            expired.len()
        );
        let estimated_matches = ctx.results.count_by_request(request_id).await?;
        Ok(MatchRequestView {
            request,
            estimated_matches,
        })
    }
}

async fn verify_passenger(ctx: &EngineContext, passenger_id: Uuid) -> Result<(), MatchError> {
    match ctx.identity.get_user(passenger_id).await {
        Ok(_) => Ok(()),
        Err(MatchError::NotFound(_)) => Err(MatchError::not_found(format!("passenger {passenger_id}"))),
        Err(err @ MatchError::ExternalService(_)) => Err(err),
        Err(err) => Err(MatchError::ExternalService(format!(
            "identity lookup failed: {err}"
        ))),
    }
}

/// One matching pass over a `Pending` request.
pub async fn process_request(
    ctx: &EngineContext,
    request_id: Uuid,
) -> Result<MatchOutcome, MatchError> {
    let request = ctx.requests.get(request_id).await?;
    if request.status != RequestStatus::Pending {
        return Ok(MatchOutcome::Skipped(request.status));
    }
    let now = ctx.now();

    let fetched = ctx
        .pool
        .find_available(
            &request.pickup,
            ctx.config.search_radius_km,
            ctx.config.candidate_cap,
        )
        .await?;
    let fetched_count = fetched.len();
    let survivors = ctx.filter.apply(&request, fetched, &ctx.estimator, now);
    let ranked = ctx
        .strategy
        .rank(&ctx.scoring_context(&request, now), &survivors);
    debug!(
        "request_id={request_id} strategy={} fetched={fetched_count} eligible={} ranked={}",
        ctx.strategy.name(),
        survivors.len(),
        ranked.len()
    );

    if ranked.is_empty() {
        ctx.requests
            .transition(request_id, RequestStatus::Expired, now)
            .await?;
        info!("no eligible drivers request_id={request_id}");
        notify_timeout(ctx, &request).await;
        return Ok(MatchOutcome::NoCandidates);
    }

    let results: Vec<MatchResult> = ranked
        .into_iter()
        .map(|candidate| candidate.into_result(request_id, now))
        .collect();
    ctx.results.insert_batch(results.clone()).await?;
    for result in &results {
        ctx.cache.put_result(result);
    }

    for result in &results {
        if let Err(err) = ctx
            .notifier
            .notify_driver_match(result.driver_id, &request, result)
            .await
        {
            warn!(
                "driver notification failed driver_id={} request_id={request_id}: {err}",
                result.driver_id
            );
        }
    }

    match ctx
        .requests
        .transition(request_id, RequestStatus::Matched, ctx.now())
        .await
    {
        Ok(_) => {}
        Err(MatchError::Conflict(reason)) => {
            // Cancelled or expired while scoring; nothing may stay claimable.
            ctx.expire_pending_results(request_id, None).await?;
            info!("request_id={request_id} closed during matching: {reason}");
            let current = ctx.requests.get(request_id).await?;
            return Ok(MatchOutcome::Skipped(current.status));
        }
        Err(err) => return Err(err),
    }
    info!(
        "request matched request_id={request_id} results={} top_score={:.3}",
        results.len(),
        results[0].score
    );
    Ok(MatchOutcome::Matched {
        results: results.len(),
    })
}

/// Run one queued job under its deadline. Never fails: errors land in the
/// request's status and the log.
pub async fn run_job(ctx: &EngineContext, job: MatchJob) {
    let request_id = job.request_id;
    match tokio::time::timeout_at(job.deadline, process_request(ctx, request_id)).await {
        Ok(Ok(outcome)) => debug!("request_id={request_id} outcome={outcome:?}"),
        Ok(Err(err)) => {
            error!("matching failed request_id={request_id}: {err}");
            if let Err(mark_err) = ctx
                .requests
                .transition(request_id, RequestStatus::Failed, ctx.now())
                .await
            {
                warn!("could not mark request failed request_id={request_id}: {mark_err}");
            }
        }
        Err(_) => {
            warn!("matching deadline elapsed request_id={request_id}");
            if let Err(err) = expire_request(ctx, request_id, true).await {
                error!("could not expire request request_id={request_id}: {err}");
            }
        }
    }
}

/// Move an open request to `Expired` and expire its pending results.
///
/// Returns `Ok(false)` when the request was already closed or a driver has
/// reserved or accepted one of its results.
pub async fn expire_request(
    ctx: &EngineContext,
    request_id: Uuid,
    notify_passenger: bool,
) -> Result<bool, MatchError> {
    let mut expired = match ctx.close_results(request_id).await {
        Ok(expired) => expired,
        Err(MatchError::Conflict(reason)) => {
            debug!("request_id={request_id} not expired: {reason}");
            return Ok(false);
        }
        Err(err) => return Err(err),
    };
    let request = match ctx
        .requests
        .transition(request_id, RequestStatus::Expired, ctx.now())
        .await
    {
        Ok(request) => request,
        Err(MatchError::Conflict(_)) => return Ok(false),
        Err(err) => return Err(err),
    };
    expired.extend(ctx.expire_pending_results(request_id, None).await?);
    info!(
        "match request expired request_id={request_id} expired_results={}",
        expired.len()
    );
    if notify_passenger {
        notify_timeout(ctx, &request).await;
    }
    Ok(true)
}

async fn notify_timeout(ctx: &EngineContext, request: &MatchRequest) {
    if let Err(err) = ctx
        .notifier
        .notify_match_timeout(request.passenger_id, request)
        .await
    {
        warn!(
            "timeout notification failed passenger_id={} request_id={}: {err}",
            request.passenger_id, request.id
        );
    }
}
