use match_core::config::{MatchingConfig, StrategyKind};
use match_core::matching::{CandidateFilter, HybridStrategy, ScoringStrategy};
use match_core::test_helpers::{random_driver_pool, scoring_fixture};

const STRATEGIES: [StrategyKind; 4] = [
    StrategyKind::Nearest,
    StrategyKind::Weighted,
    StrategyKind::Feature,
    StrategyKind::Hybrid,
];

#[test]
fn every_strategy_scores_within_unit_interval() {
    let fixture = scoring_fixture();
    let drivers = random_driver_pool(&fixture.request.pickup, 120, 15.0, 11);

    for kind in STRATEGIES {
        let ranked = kind.build().score_all(&fixture.context(), &drivers);
        assert_eq!(ranked.len(), drivers.len(), "{kind}");
        for candidate in &ranked {
            assert!(
                (0.0..=1.0).contains(&candidate.score),
                "{kind} produced {}",
                candidate.score
            );
        }
    }
}

#[test]
fn ranking_is_capped_and_deterministic() {
    let fixture = scoring_fixture();
    let drivers = random_driver_pool(&fixture.request.pickup, 40, 10.0, 3);
    let ctx = fixture.context();

    for kind in STRATEGIES {
        let strategy = kind.build();
        let first = strategy.rank(&ctx, &drivers);
        let second = strategy.rank(&ctx, &drivers);
        assert_eq!(first.len(), ctx.max_results, "{kind}");
        assert_eq!(first, second, "{kind}");
    }
}

#[test]
fn scored_ordering_is_descending_except_nearest() {
    let fixture = scoring_fixture();
    let drivers = random_driver_pool(&fixture.request.pickup, 60, 12.0, 5);
    let ctx = fixture.context();

    let nearest = StrategyKind::Nearest.build().score_all(&ctx, &drivers);
    assert!(nearest
        .windows(2)
        .all(|w| w[0].distance_km <= w[1].distance_km));

    for kind in [StrategyKind::Weighted, StrategyKind::Feature, StrategyKind::Hybrid] {
        let ranked = kind.build().score_all(&ctx, &drivers);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score), "{kind}");
    }
}

#[test]
fn hybrid_with_only_nearest_weight_follows_nearest() {
    let fixture = scoring_fixture();
    let drivers = random_driver_pool(&fixture.request.pickup, 30, 8.0, 9);
    let hybrid = HybridStrategy {
        nearest_weight: 1.0,
        weighted_weight: 0.0,
        feature_weight: 0.0,
    };
    let nearest = StrategyKind::Nearest.build().score_all(&fixture.context(), &drivers);
    let blended = hybrid.score_all(&fixture.context(), &drivers);
    assert_eq!(blended[0].driver_id, nearest[0].driver_id);
}

#[test]
fn filtered_pool_respects_rating_floor() {
    let fixture = scoring_fixture();
    let drivers = random_driver_pool(&fixture.request.pickup, 80, 15.0, 21);
    let filter = CandidateFilter::from_config(&MatchingConfig::default().with_min_driver_rating(4.0));

    let kept = filter.apply(&fixture.request, drivers, &fixture.estimator, fixture.now);
    assert!(!kept.is_empty());
    assert!(kept.iter().all(|d| d.rating >= 4.0));
}
