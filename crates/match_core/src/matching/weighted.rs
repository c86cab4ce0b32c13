use chrono::{DateTime, Utc};

use crate::config::ScoringWeights;
use crate::geo::Estimator;
use crate::model::{Driver, MatchRequest, PriceRange};

use super::strategy::{ScoringContext, ScoringStrategy};
use super::types::ScoredCandidate;
use super::{clamp_unit, sort_by_score_desc};

/// Distance (km) at which the distance signal halves.
const DISTANCE_SCALE_KM: f64 = 10.0;
/// Pickup minutes at which the time signal halves.
const TIME_SCALE_MINUTES: f64 = 30.0;
/// Completed trips at which the experience signal saturates.
const EXPERIENCE_SATURATION_TRIPS: f64 = 50.0;
/// Price signal when the estimate exceeds the passenger's maximum.
const OVER_BUDGET_PRICE_SIGNAL: f64 = 0.5;

/// Normalised per-driver signals, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedSignals {
    pub distance: f64,
    pub rating: f64,
    pub time: f64,
    pub price: f64,
    pub experience: f64,
}

impl WeightedSignals {
    pub fn extract(driver: &Driver, candidate: &ScoredCandidate, price_range: &PriceRange) -> Self {
        let minutes = candidate.pickup_time.as_secs_f64() / 60.0;
        Self {
            distance: clamp_unit(1.0 / (1.0 + candidate.distance_km / DISTANCE_SCALE_KM)),
            rating: clamp_unit(driver.rating / 5.0),
            time: clamp_unit(1.0 / (1.0 + minutes / TIME_SCALE_MINUTES)),
            price: price_signal(candidate.price, price_range),
            experience: (f64::from(driver.completed_trips) / EXPERIENCE_SATURATION_TRIPS).min(1.0),
        }
    }

    pub fn combine(&self, weights: &ScoringWeights) -> f64 {
        self.distance * weights.distance
            + self.rating * weights.rating
            + self.time * weights.time
            + self.price * weights.price
            + self.experience * weights.experience
    }
}

/// 1.0 at the passenger's minimum, 0.0 at the maximum, a flat penalty above it.
pub fn price_signal(price: f64, range: &PriceRange) -> f64 {
    if range.is_unbounded() {
        return 1.0;
    }
    if price > range.max_price {
        return OVER_BUDGET_PRICE_SIGNAL;
    }
    let span = range.max_price - range.min_price;
    if span <= f64::EPSILON {
        return 1.0;
    }
    clamp_unit(1.0 - (price - range.min_price) / span)
}

/// Weighted sum of normalised signals, ordered by descending score.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedStrategy;

impl WeightedStrategy {
    pub fn score(ctx: &ScoringContext<'_>, driver: &Driver) -> ScoredCandidate {
        let mut candidate = ctx.measure(driver);
        let signals = WeightedSignals::extract(driver, &candidate, &ctx.request.price_range);
        candidate.score = clamp_unit(signals.combine(ctx.weights));
        candidate
    }
}

impl ScoringStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn score_all(&self, ctx: &ScoringContext<'_>, candidates: &[Driver]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|driver| Self::score(ctx, driver))
            .collect();
        sort_by_score_desc(&mut scored);
        scored
    }
}

/// Weighted score of a single driver against a request, outside a ranking pass.
pub fn score_driver_for_request(
    request: &MatchRequest,
    driver: &Driver,
    weights: &ScoringWeights,
    estimator: &Estimator,
    now: DateTime<Utc>,
) -> ScoredCandidate {
    let ctx = ScoringContext {
        request,
        weights,
        estimator,
        now,
        max_results: 1,
    };
    WeightedStrategy::score(&ctx, driver)
}
