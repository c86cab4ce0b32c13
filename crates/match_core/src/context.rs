use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cache::MatchCache;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::local::{LocalIdentityService, LocalTripService, LogNotifier};
use crate::collaborators::{IdentityService, Notifier, TripService};
use crate::config::{EngineConfig, MatchingConfig};
use crate::error::MatchError;
use crate::geo::Estimator;
use crate::matching::{CandidateFilter, ScoringContext, ScoringStrategy};
use crate::model::{MatchRequest, MatchResult};
use crate::pool::CandidatePool;
use crate::store::{
    DriverStore, InMemoryDriverStore, InMemoryRequestStore, InMemoryResultStore, RequestStore,
    ResultStore,
};

/// Stores, collaborators and clock the engine is assembled from.
#[derive(Clone)]
pub struct EngineDeps {
    pub requests: Arc<dyn RequestStore>,
    pub results: Arc<dyn ResultStore>,
    pub drivers: Arc<dyn DriverStore>,
    pub identity: Arc<dyn IdentityService>,
    pub trips: Arc<dyn TripService>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl EngineDeps {
    /// In-memory stores, logging collaborators and the system clock.
    pub fn in_memory() -> Self {
        Self {
            requests: Arc::new(InMemoryRequestStore::new()),
            results: Arc::new(InMemoryResultStore::new()),
            drivers: Arc::new(InMemoryDriverStore::new()),
            identity: Arc::new(LocalIdentityService),
            trips: Arc::new(LocalTripService),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_drivers(mut self, drivers: Arc<dyn DriverStore>) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityService>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_trips(mut self, trips: Arc<dyn TripService>) -> Self {
        self.trips = trips;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Shared state handed to the orchestrator, workers, acceptance coordinator
/// and reaper.
pub struct EngineContext {
    pub requests: Arc<dyn RequestStore>,
    pub results: Arc<dyn ResultStore>,
    pub pool: CandidatePool,
    pub cache: Arc<MatchCache>,
    pub identity: Arc<dyn IdentityService>,
    pub trips: Arc<dyn TripService>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub config: MatchingConfig,
    pub strategy: Box<dyn ScoringStrategy>,
    pub estimator: Estimator,
    pub filter: CandidateFilter,
}

impl EngineContext {
    pub fn new(deps: EngineDeps, config: &EngineConfig) -> Self {
        let cache = Arc::new(MatchCache::new(&config.cache));
        let matching = config.matching.clone();
        Self {
            requests: deps.requests,
            results: deps.results,
            pool: CandidatePool::new(deps.drivers, Arc::clone(&cache)),
            cache,
            identity: deps.identity,
            trips: deps.trips,
            notifier: deps.notifier,
            clock: deps.clock,
            strategy: matching.strategy.build(),
            estimator: Estimator::new(matching.pricing),
            filter: CandidateFilter::from_config(&matching),
            config: matching,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn scoring_context<'a>(
        &'a self,
        request: &'a MatchRequest,
        now: DateTime<Utc>,
    ) -> ScoringContext<'a> {
        ScoringContext {
            request,
            weights: &self.config.weights,
            estimator: &self.estimator,
            now,
            max_results: self.config.max_results,
        }
    }

    /// Cache first, store on miss.
    pub async fn load_result(&self, result_id: Uuid) -> Result<MatchResult, MatchError> {
        if let Some(result) = self.cache.result(result_id) {
            return Ok(result);
        }
        let result = self.results.get(result_id).await?;
        self.cache.put_result(&result);
        Ok(result)
    }

    /// Expire the pending results of `request_id` other than `keep` and drop
    /// them from the cache.
    pub async fn expire_pending_results(
        &self,
        request_id: Uuid,
        keep: Option<Uuid>,
    ) -> Result<Vec<Uuid>, MatchError> {
        let expired = self.results.expire_pending(request_id, keep).await?;
        for id in &expired {
            self.cache.invalidate_result(*id);
        }
        Ok(expired)
    }

    /// Expire the pending results of a request that is about to close. Fails
    /// with `Conflict`, changing nothing, while a driver holds one of them.
    pub async fn close_results(&self, request_id: Uuid) -> Result<Vec<Uuid>, MatchError> {
        let expired = self.results.expire_unclaimed(request_id).await?;
        for id in &expired {
            self.cache.invalidate_result(*id);
        }
        Ok(expired)
    }
}
