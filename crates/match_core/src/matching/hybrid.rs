use std::collections::HashMap;

use uuid::Uuid;

use crate::model::Driver;

use super::feature::FeatureStrategy;
use super::nearest::NearestStrategy;
use super::strategy::{ScoringContext, ScoringStrategy};
use super::types::ScoredCandidate;
use super::weighted::WeightedStrategy;
use super::{clamp_unit, sort_by_score_desc};

/// Blend of nearest, weighted and feature-based scores.
///
/// Each component sees the full candidate list; a driver absent from one
/// component's output contributes 0 for that term.
#[derive(Debug, Clone, Copy)]
pub struct HybridStrategy {
    pub nearest_weight: f64,
    pub weighted_weight: f64,
    pub feature_weight: f64,
}

impl Default for HybridStrategy {
    fn default() -> Self {
        Self {
            nearest_weight: 0.3,
            weighted_weight: 0.4,
            feature_weight: 0.3,
        }
    }
}

impl HybridStrategy {
    fn accumulate(
        totals: &mut HashMap<Uuid, f64>,
        scored: &[ScoredCandidate],
        weight: f64,
    ) {
        for candidate in scored {
            *totals.entry(candidate.driver_id).or_insert(0.0) += candidate.score * weight;
        }
    }
}

impl ScoringStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn score_all(&self, ctx: &ScoringContext<'_>, candidates: &[Driver]) -> Vec<ScoredCandidate> {
        let nearest = NearestStrategy.score_all(ctx, candidates);
        let weighted = WeightedStrategy.score_all(ctx, candidates);
        let feature = FeatureStrategy.score_all(ctx, candidates);

        let mut totals: HashMap<Uuid, f64> = HashMap::with_capacity(candidates.len());
        Self::accumulate(&mut totals, &nearest, self.nearest_weight);
        Self::accumulate(&mut totals, &weighted, self.weighted_weight);
        Self::accumulate(&mut totals, &feature, self.feature_weight);

        // Estimates are identical across components; take them from the nearest pass.
        let mut measured: HashMap<Uuid, ScoredCandidate> = nearest
            .into_iter()
            .map(|candidate| (candidate.driver_id, candidate))
            .collect();

        // Rebuild in input order so score ties stay stable.
        let mut combined: Vec<ScoredCandidate> = candidates
            .iter()
            .filter_map(|driver| {
                let mut candidate = measured.remove(&driver.id)?;
                candidate.score = clamp_unit(totals.get(&driver.id).copied().unwrap_or(0.0));
                Some(candidate)
            })
            .collect();
        sort_by_score_desc(&mut combined);
        combined
    }
}
