//! Property tests for balance scoring, drift severity and signal
//! aggregation.

mod common;

use proptest::prelude::*;
use uuid::Uuid;

use stratagem::domain::models::{
    AdjustmentConfig, AdjustmentSubject, AdjustmentType, DomainDependencyMatrix, DriftSeverity, Signal, SignalSource,
    StrategyDomain,
};
use stratagem::services::adjustment_engine::{aggregate_signals, decide_adjustment_type, historical_signals};
use stratagem::services::domain_balance::{
    balance_score, compute_snapshot, gini_coefficient, normalize, normalized_entropy, Allocations,
};
use stratagem::services::drift_detector::drift_percent;
use stratagem::services::AdjustmentRequest;

fn allocations_strategy() -> impl Strategy<Value = Allocations> {
    prop::collection::btree_map(
        prop::sample::select(StrategyDomain::ALL.to_vec()),
        0.1f64..100.0,
        1..=5,
    )
}

proptest! {
    /// Property: severity never decreases as |drift| grows
    #[test]
    fn prop_severity_monotonic_in_magnitude(a in -200.0f64..200.0, b in -200.0f64..200.0) {
        let (small, large) = if a.abs() <= b.abs() { (a, b) } else { (b, a) };
        prop_assert!(DriftSeverity::from_drift_percent(small) <= DriftSeverity::from_drift_percent(large));
        prop_assert_eq!(DriftSeverity::from_drift_percent(a), DriftSeverity::from_drift_percent(-a));
    }

    /// Property: drift is signed toward the actual value
    #[test]
    fn prop_drift_sign_follows_actual(expected in 1.0f64..1_000.0, delta in 0.1f64..500.0) {
        prop_assert!(drift_percent(expected + delta, expected) > 0.0);
        prop_assert!(drift_percent(expected - delta, expected) < 0.0);
    }

    /// Property: equal allocations with strong performance always score 100
    #[test]
    fn prop_equal_allocations_score_full(count in 2usize..=7, perf in 60.0f64..100.0) {
        let domains = &StrategyDomain::ALL[..count];
        let allocations: Allocations = domains.iter().map(|d| (*d, 100.0 / count as f64)).collect();
        let performance: Allocations = domains.iter().map(|d| (*d, perf)).collect();

        let snapshot = compute_snapshot(
            Uuid::new_v4(),
            None,
            allocations,
            performance,
            &DomainDependencyMatrix::new(vec![]),
        );
        prop_assert!((snapshot.balance_score - 100.0).abs() < 1e-9);
        prop_assert!(snapshot.gini.abs() < 1e-9);
    }

    /// Property: holding entropy and alignment fixed, more inequality scores lower
    #[test]
    fn prop_score_strictly_decreases_with_gini(
        entropy in 0.1f64..1.0,
        g1 in 0.0f64..1.0,
        g2 in 0.0f64..1.0,
    ) {
        prop_assume!((g1 - g2).abs() > 1e-6);
        let (low, high) = if g1 < g2 { (g1, g2) } else { (g2, g1) };
        prop_assert!(balance_score(entropy, low, -20.0) > balance_score(entropy, high, -20.0));
    }

    /// Property: normalization sums to 100 and the spread measures stay in [0, 1]
    #[test]
    fn prop_normalized_allocations_are_well_formed(allocations in allocations_strategy()) {
        let normalized = normalize(allocations.clone());
        let total: f64 = normalized.values().sum();
        prop_assert!((total - 100.0).abs() < 1e-6);
        prop_assert_eq!(normalized.len(), allocations.len());

        let entropy = normalized_entropy(&normalized);
        let gini = gini_coefficient(&normalized);
        prop_assert!((0.0..=1.0).contains(&entropy));
        prop_assert!((0.0..=1.0).contains(&gini));
    }

    /// Property: STRENGTHEN whenever the weighted strength exceeds 0.5,
    /// independent of signal order
    #[test]
    fn prop_strong_signals_strengthen_in_any_order(
        raw in prop::collection::vec((0.51f64..1.0, 0.01f64..1.0), 1..12),
    ) {
        let signals: Vec<Signal> = raw
            .iter()
            .map(|(s, c)| Signal::new(SignalSource::Execution, *s, *c, "execution"))
            .collect();
        let mut reversed = signals.clone();
        reversed.reverse();

        let forward = aggregate_signals(&signals).unwrap();
        let backward = aggregate_signals(&reversed).unwrap();
        prop_assert!((forward.weighted_strength - backward.weighted_strength).abs() < 1e-9);
        prop_assert!((forward.mean_confidence - backward.mean_confidence).abs() < 1e-9);
        prop_assert_eq!(
            decide_adjustment_type(forward.weighted_strength, forward.mean_confidence),
            AdjustmentType::Strengthen
        );
    }
}

#[test]
fn test_seo_overweight_scenario() {
    use StrategyDomain::{Ads, Content, Cro, Geo, Seo};

    let allocations: Allocations = [(Seo, 40.0), (Geo, 15.0), (Content, 15.0), (Ads, 15.0), (Cro, 15.0)]
        .into_iter()
        .collect();
    let performance: Allocations = [(Seo, 45.0), (Geo, 70.0), (Content, 70.0), (Ads, 70.0), (Cro, 70.0)]
        .into_iter()
        .collect();

    let snapshot = compute_snapshot(
        Uuid::new_v4(),
        None,
        allocations,
        performance,
        &DomainDependencyMatrix::default(),
    );
    assert_eq!(snapshot.over_optimized, vec![Seo]);
    assert!(snapshot.under_invested.is_empty(), "15% is not below the 15% floor");
}

#[test]
fn test_no_history_means_no_signals() {
    assert!(historical_signals(&[], &AdjustmentConfig::default()).is_empty());
}

#[tokio::test]
async fn test_uniform_execution_signals_generate_strengthen() {
    let engine = common::engine().await;
    let org = Uuid::new_v4();
    let signals = vec![Signal::new(SignalSource::Execution, 0.6, 0.9, "sessions ahead of plan"); 3];

    let adjustment = engine
        .adjustments
        .generate_adjustment(AdjustmentRequest::new(
            org,
            AdjustmentSubject::KpiTarget {
                node_id: None,
                metric_name: "organic_sessions".to_string(),
                current: 1_000.0,
            },
            signals,
        ))
        .await
        .unwrap();

    assert_eq!(adjustment.adjustment_type, AdjustmentType::Strengthen);
    assert!((adjustment.magnitude - 60.0).abs() < 1e-9);
    assert!((adjustment.confidence - 0.9).abs() < 1e-9);
    assert!(adjustment.is_pending());
}

#[tokio::test]
async fn test_empty_history_for_domain_is_not_an_error() {
    let engine = common::engine().await;
    let signals = engine
        .adjustments
        .generate_historical_signals(Uuid::new_v4(), StrategyDomain::Email)
        .await
        .unwrap();
    assert!(signals.is_empty());
}
