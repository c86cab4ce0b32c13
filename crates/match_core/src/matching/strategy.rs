use chrono::{DateTime, Utc};

use crate::config::ScoringWeights;
use crate::geo::Estimator;
use crate::model::{Driver, MatchRequest};

use super::types::ScoredCandidate;

/// Everything a strategy needs besides the candidate list.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub request: &'a MatchRequest,
    pub weights: &'a ScoringWeights,
    pub estimator: &'a Estimator,
    pub now: DateTime<Utc>,
    /// Length cap applied by [`ScoringStrategy::rank`].
    pub max_results: usize,
}

impl<'a> ScoringContext<'a> {
    /// Distance, pickup time and trip fare for one driver.
    pub fn measure(&self, driver: &Driver) -> ScoredCandidate {
        let distance_km = self
            .estimator
            .distance_km(&driver.location, &self.request.pickup);
        ScoredCandidate {
            driver_id: driver.id,
            score: 0.0,
            distance_km,
            pickup_time: self.estimator.travel_time(distance_km),
            price: self.estimator.trip_price(
                &self.request.pickup,
                &self.request.dropoff,
                driver.vehicle_class,
            ),
        }
    }
}

/// Ranks an already-filtered candidate list for one request.
///
/// Implementations must keep every score within [0, 1] and break ties by
/// input order so that identical inputs always rank identically.
///
/// # Examples
///
/// ```rust,no_run
/// use match_core::config::StrategyKind;
/// use match_core::matching::ScoringStrategy;
///
/// let strategy = StrategyKind::Nearest.build();
/// assert_eq!(strategy.name(), "nearest");
/// ```
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score and order every candidate without truncation.
    fn score_all(&self, ctx: &ScoringContext<'_>, candidates: &[Driver]) -> Vec<ScoredCandidate>;

    /// Ranked candidates capped at `ctx.max_results`.
    fn rank(&self, ctx: &ScoringContext<'_>, candidates: &[Driver]) -> Vec<ScoredCandidate> {
        let mut ranked = self.score_all(ctx, candidates);
        ranked.truncate(ctx.max_results);
        ranked
    }
}
