use chrono::{DateTime, Timelike, Utc};

use crate::config::ScoringWeights;
use crate::geo::Estimator;
use crate::model::{Driver, GeoPoint};

use super::strategy::{ScoringContext, ScoringStrategy};
use super::types::ScoredCandidate;
use super::{clamp_unit, sort_by_score_desc};

const DISTANCE_SCALE_KM: f64 = 10.0;
const PREFERRED_AREA_SCALE_KM: f64 = 5.0;
const EXPERIENCE_SATURATION_TRIPS: f64 = 100.0;
const AVAILABILITY_HORIZON_MINUTES: f64 = 60.0;

const NO_PREFERRED_AREA_SIMILARITY: f64 = 0.5;
const PEAK_TIME_PREFERENCE: f64 = 0.7;
const OFF_PEAK_TIME_PREFERENCE: f64 = 1.0;

const AVAILABILITY_WEIGHT: f64 = 0.1;
const LOCATION_WEIGHT: f64 = 0.1;
const TIME_PREFERENCE_WEIGHT: f64 = 0.05;
const RATING_DISTANCE_WEIGHT: f64 = 0.1;
const EXPERIENCE_LOCATION_WEIGHT: f64 = 0.05;

/// Steepness and midpoint of the final logistic squash.
const LOGISTIC_STEEPNESS: f64 = 5.0;
const LOGISTIC_MIDPOINT: f64 = 0.5;

/// Hours (UTC) treated as demand peaks: 07–09 and 17–19.
const PEAK_HOURS: [std::ops::RangeInclusive<u32>; 2] = [7..=9, 17..=19];

/// Non-linear per-driver features fed to the feature-based scorer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverFeatures {
    pub distance: f64,
    pub rating: f64,
    pub experience: f64,
    pub availability: f64,
    pub location_similarity: f64,
    pub time_preference: f64,
}

impl DriverFeatures {
    pub fn extract(ctx: &ScoringContext<'_>, driver: &Driver, distance_km: f64) -> Self {
        let experience_base =
            (f64::from(driver.completed_trips) / EXPERIENCE_SATURATION_TRIPS).min(1.0);
        Self {
            distance: 1.0 / (1.0 + distance_km / DISTANCE_SCALE_KM),
            rating: clamp_unit(driver.rating / 5.0).powf(1.5),
            experience: experience_base.sqrt(),
            availability: availability_feature(driver.last_active_at, ctx.now),
            location_similarity: location_similarity(
                &driver.preferred_areas,
                &ctx.request.pickup,
                ctx.estimator,
            ),
            time_preference: time_preference(ctx.request.request_time),
        }
    }

    /// Linear combination with two interaction terms, before squashing.
    pub fn weighted_sum(&self, weights: &ScoringWeights) -> f64 {
        self.distance * weights.distance
            + self.rating * weights.rating
            + self.experience * weights.experience
            + self.availability * AVAILABILITY_WEIGHT
            + self.location_similarity * LOCATION_WEIGHT
            + self.time_preference * TIME_PREFERENCE_WEIGHT
            + (self.rating * self.distance) * RATING_DISTANCE_WEIGHT
            + (self.experience * self.location_similarity) * EXPERIENCE_LOCATION_WEIGHT
    }

    pub fn score(&self, weights: &ScoringWeights) -> f64 {
        logistic(self.weighted_sum(weights))
    }
}

/// `1 / (1 + e^(-5 (x - 0.5)))`, strictly inside (0, 1) for finite input.
pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-LOGISTIC_STEEPNESS * (x - LOGISTIC_MIDPOINT)).exp())
}

/// `(1 - idle_minutes / 60)^0.8`, with the base clamped to [0, 1].
pub fn availability_feature(last_active_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let idle_minutes = ((now - last_active_at).num_milliseconds() as f64 / 60_000.0).max(0.0);
    clamp_unit(1.0 - idle_minutes / AVAILABILITY_HORIZON_MINUTES).powf(0.8)
}

/// Best proximity between the pickup and any preferred area; 0.5 when none are declared.
pub fn location_similarity(areas: &[GeoPoint], pickup: &GeoPoint, estimator: &Estimator) -> f64 {
    areas
        .iter()
        .map(|area| 1.0 / (1.0 + estimator.distance_km(area, pickup) / PREFERRED_AREA_SCALE_KM))
        .reduce(f64::max)
        .unwrap_or(NO_PREFERRED_AREA_SIMILARITY)
}

pub fn time_preference(request_time: DateTime<Utc>) -> f64 {
    let hour = request_time.hour();
    if PEAK_HOURS.iter().any(|peak| peak.contains(&hour)) {
        PEAK_TIME_PREFERENCE
    } else {
        OFF_PEAK_TIME_PREFERENCE
    }
}

/// Hand-tuned feature combination squashed through a logistic curve.
///
/// Despite the `ml` configuration name this is a deterministic formula, not a
/// trained model.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureStrategy;

impl FeatureStrategy {
    pub fn score(ctx: &ScoringContext<'_>, driver: &Driver) -> ScoredCandidate {
        let mut candidate = ctx.measure(driver);
        let features = DriverFeatures::extract(ctx, driver, candidate.distance_km);
        candidate.score = clamp_unit(features.score(ctx.weights));
        candidate
    }
}

impl ScoringStrategy for FeatureStrategy {
    fn name(&self) -> &'static str {
        "ml"
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

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_helpers::{driver_km_north_of, scoring_fixture};

    #[test]
    fn logistic_is_centred_and_bounded() {
        assert!((logistic(0.5) - 0.5).abs() < 1e-12);
        assert!(logistic(-100.0) > 0.0);
        assert!(logistic(100.0) <= 1.0);
    }

    #[test]
    fn peak_hours_lower_time_preference() {
        let at = |hour| Utc.with_ymd_and_hms(2024, 5, 6, hour, 30, 0).unwrap();
        assert_eq!(time_preference(at(8)), PEAK_TIME_PREFERENCE);
        assert_eq!(time_preference(at(9)), PEAK_TIME_PREFERENCE);
        assert_eq!(time_preference(at(18)), PEAK_TIME_PREFERENCE);
        assert_eq!(time_preference(at(12)), OFF_PEAK_TIME_PREFERENCE);
        assert_eq!(time_preference(at(6)), OFF_PEAK_TIME_PREFERENCE);
    }

    #[test]
    fn long_idle_drivers_get_zero_availability() {
        let now = Utc::now();
        assert_eq!(availability_feature(now, now), 1.0);
        assert_eq!(availability_feature(now - chrono::Duration::minutes(90), now), 0.0);
        // Timestamps slightly in the future count as fully active.
        assert_eq!(availability_feature(now + chrono::Duration::seconds(5), now), 1.0);
    }

    #[test]
    fn location_similarity_defaults_without_preferences() {
        let estimator = Estimator::default();
        let pickup = GeoPoint::new(10.7769, 106.7009);
        assert_eq!(location_similarity(&[], &pickup, &estimator), 0.5);
        assert_eq!(
            location_similarity(&[pickup.clone(), GeoPoint::new(11.0, 107.0)], &pickup, &estimator),
            1.0
        );
    }

    #[test]
    fn scores_stay_inside_unit_interval() {
        let fixture = scoring_fixture();
        let mut best = driver_km_north_of(&fixture.request.pickup, 0.0);
        best.rating = 5.0;
        best.completed_trips = 500;
        best.preferred_areas = vec![fixture.request.pickup.clone()];
        let mut worst = driver_km_north_of(&fixture.request.pickup, 14.0);
        worst.rating = 0.0;
        worst.completed_trips = 0;
        worst.last_active_at = fixture.now - chrono::Duration::hours(3);

        let ranked = FeatureStrategy.rank(&fixture.context(), &[worst.clone(), best.clone()]);
        assert_eq!(ranked[0].driver_id, best.id);
        for candidate in &ranked {
            assert!(candidate.score > 0.0 && candidate.score < 1.0, "{}", candidate.score);
        }
    }
}
