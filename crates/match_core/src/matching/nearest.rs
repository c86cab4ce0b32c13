use crate::model::Driver;

use super::strategy::{ScoringContext, ScoringStrategy};
use super::types::ScoredCandidate;
use super::clamp_unit;

/// Nearest-driver ranking: score = `1 / (1 + distance_km)`.
///
/// Candidates are ordered by ascending pickup distance; equal distances keep
/// their input order. This is the cheap path for high-demand periods.
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestStrategy;

impl NearestStrategy {
    pub fn score_for_distance(distance_km: f64) -> f64 {
        clamp_unit(1.0 / (1.0 + distance_km.max(0.0)))
    }
}

impl ScoringStrategy for NearestStrategy {
    fn name(&self) -> &'static str {
        "nearest"
    }

    fn score_all(&self, ctx: &ScoringContext<'_>, candidates: &[Driver]) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|driver| {
                let mut candidate = ctx.measure(driver);
                candidate.score = Self::score_for_distance(candidate.distance_km);
                candidate
            })
            .collect();
        scored.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        scored
    }
}
