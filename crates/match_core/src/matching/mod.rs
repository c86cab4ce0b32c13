pub mod strategy;
pub mod types;
pub mod filter;
pub mod nearest;
pub mod weighted;
pub mod feature;
pub mod hybrid;

pub use filter::CandidateFilter;
pub use feature::FeatureStrategy;
pub use hybrid::HybridStrategy;
pub use nearest::NearestStrategy;
pub use strategy::{ScoringContext, ScoringStrategy};
pub use types::ScoredCandidate;
pub use weighted::{score_driver_for_request, WeightedStrategy};

use crate::config::StrategyKind;

impl StrategyKind {
    /// Instantiate the strategy this kind names.
    pub fn build(self) -> Box<dyn ScoringStrategy> {
        match self {
            StrategyKind::Nearest => Box::new(NearestStrategy),
            StrategyKind::Weighted => Box::new(WeightedStrategy),
            StrategyKind::Feature => Box::new(FeatureStrategy),
            StrategyKind::Hybrid => Box::new(HybridStrategy::default()),
        }
    }
}

/// Clamp into [0, 1], mapping NaN to 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stable descending sort by score; ties keep input order.
pub(crate) fn sort_by_score_desc(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_every_strategy() {
        let names: Vec<_> = [
            StrategyKind::Nearest,
            StrategyKind::Weighted,
            StrategyKind::Feature,
            StrategyKind::Hybrid,
        ]
        .into_iter()
        .map(|kind| kind.build().name())
        .collect();
        assert_eq!(names, vec!["nearest", "weighted", "ml", "hybrid"]);
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.2), 1.0);
        assert_eq!(clamp_unit(-0.3), 0.0);
    }
}
