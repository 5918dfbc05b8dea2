//! End-to-end refinement scenarios through the public engine API.

mod common;

use chrono::{Duration, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use uuid::Uuid;

use stratagem::domain::models::{
    AdjustmentTarget, CycleStatus, DriftDirection, DriftSeverity, DriftSignalFilter, EdgeSpec, NodeSpec, NodeStatus,
    PerformanceRecord, RefinementRunConfig, StrategyDomain, Urgency,
};
use stratagem::services::strategy_graph::DEFAULT_MAX_PATHS;
use stratagem::DomainError;

#[tokio::test]
async fn test_overdue_step_is_extended_and_outcome_feeds_history() {
    common::setup_test_logging();
    let engine = common::engine().await;
    let org = Uuid::new_v4();

    let now = Utc::now();
    let original_due = now - Duration::days(10);
    let node = engine
        .graph
        .add_node(NodeSpec {
            start_date: Some(now - Duration::days(20)),
            due_date: Some(original_due),
            ..common::node_spec(org, "Publish pillar articles", "CONTENT", 24.0)
        })
        .await
        .unwrap();
    engine
        .graph
        .update_node_status(node.id, NodeStatus::InProgress)
        .await
        .unwrap();

    let result = engine
        .refinement
        .run_refinement_loop(org, None, RefinementRunConfig::default())
        .await
        .unwrap();
    assert_eq!(result.cycle.status, CycleStatus::Completed);

    let delayed = result
        .drift
        .signals
        .iter()
        .find(|s| s.direction == DriftDirection::Delayed)
        .expect("Overdue node should produce a DELAYED signal");
    assert_eq!(delayed.node_id, Some(node.id));
    assert_eq!(delayed.severity, DriftSeverity::High);

    let timeline = result
        .adjustments
        .iter()
        .find(|a| a.target == AdjustmentTarget::Timeline)
        .expect("DELAYED drift should produce a TIMELINE adjustment");
    assert!(timeline.is_pending());
    assert!(timeline.requires_approval);

    // A single CONTENT node holds the whole allocation
    assert!(result.balance.snapshot.over_optimized.contains(&StrategyDomain::Content));
    assert!(result
        .adjustments
        .iter()
        .any(|a| a.target == AdjustmentTarget::Domain && a.is_pending()));

    let applied = engine.adjustments.apply_adjustment(timeline.id).await.unwrap();
    assert!(applied.is_applied());

    let extended = engine.graph.get_node(node.id).await.unwrap();
    assert!(extended.estimated_duration_hours.unwrap() > 24.0);
    assert!(extended.due_date.unwrap() > original_due);
    assert!(extended.version > node.version);

    let open = engine
        .drift
        .list_signals(org, DriftSignalFilter { unresolved_only: true, ..Default::default() })
        .await
        .unwrap();
    assert!(open.iter().all(|s| s.id != delayed.id), "Applying the adjustment resolves its signal");

    assert!(engine
        .adjustments
        .generate_historical_signals(org, StrategyDomain::Content)
        .await
        .unwrap()
        .is_empty());

    let record = engine.adjustments.record_outcome(applied.id, 6.0, 92.0).await.unwrap();
    assert_eq!(record.domain, StrategyDomain::Content);
    assert!(record.on_track);
    engine
        .balance
        .record_performance(PerformanceRecord::new(org, StrategyDomain::Content, 88.0, true))
        .await
        .unwrap();

    let history = engine
        .adjustments
        .generate_historical_signals(org, StrategyDomain::Content)
        .await
        .unwrap();
    assert!(
        history.iter().any(|s| s.strength > 0.0),
        "Two on-track outcomes should yield a positive success-rate signal"
    );
}

#[tokio::test]
async fn test_metric_drift_end_to_end() {
    let engine = common::engine().await;
    let org = Uuid::new_v4();

    let objective = engine
        .graph
        .add_node(NodeSpec {
            node_type: "OBJECTIVE".to_string(),
            kpi_targets: [("organic_sessions".to_string(), 200.0)].into_iter().collect(),
            ..common::node_spec(org, "Grow organic", "SEO", 40.0)
        })
        .await
        .unwrap();
    common::record_daily_series(
        &engine,
        org,
        StrategyDomain::Seo,
        "organic_sessions",
        &[100.0, 100.0, 100.0, 100.0, 100.0],
        200.0,
    )
    .await;

    let result = engine
        .refinement
        .run_refinement_loop(org, None, RefinementRunConfig::default())
        .await
        .unwrap();

    assert_eq!(result.drift.overall_severity, Some(DriftSeverity::Critical));
    let kpi = result
        .adjustments
        .iter()
        .find(|a| a.target == AdjustmentTarget::KpiTarget)
        .unwrap();
    assert_eq!(kpi.target_id, Some(objective.id));
    assert!(result.recommendations[0].starts_with("[CRITICAL]"));

    let need = engine.refinement.check_refinement_needed(org, None).await.unwrap();
    assert_eq!(need.urgency, Urgency::High);

    engine.adjustments.reject(kpi.id).await.unwrap();
    assert!(matches!(
        engine.adjustments.apply_adjustment(kpi.id).await.unwrap_err(),
        DomainError::InvalidStateTransition { .. }
    ));
    let untouched = engine.graph.get_node(objective.id).await.unwrap();
    assert_eq!(untouched.kpi_targets["organic_sessions"], 200.0);
}

#[tokio::test]
async fn test_concurrent_runs_never_share_a_sequence_number() {
    let engine = common::engine().await;
    let org = Uuid::new_v4();

    let runs = (0..4).map(|_| {
        engine
            .refinement
            .run_refinement_loop(org, None, RefinementRunConfig::default())
    });
    let results = join_all(runs).await;

    let sequences: BTreeSet<u64> = results
        .into_iter()
        .map(|r| r.unwrap().cycle.sequence_number)
        .collect();
    assert_eq!(sequences, BTreeSet::from([1, 2, 3, 4]));

    let other = Uuid::new_v4();
    let first = engine
        .refinement
        .run_refinement_loop(other, None, RefinementRunConfig::default())
        .await
        .unwrap();
    assert_eq!(first.cycle.sequence_number, 1, "Sequences are per organization");
}

#[tokio::test]
async fn test_applying_balance_shifts_supersedes_the_snapshot() {
    let engine = common::engine().await;
    let org = Uuid::new_v4();

    for (name, domain, hours) in [("Audit", "SEO", 60.0), ("Launch ads", "ADS", 20.0), ("Blog", "CONTENT", 20.0)] {
        engine
            .graph
            .add_node(common::node_spec(org, name, domain, hours))
            .await
            .unwrap();
    }
    engine
        .balance
        .record_performance(PerformanceRecord::new(org, StrategyDomain::Seo, 30.0, false))
        .await
        .unwrap();

    let first = engine.balance.analyze(org, None, None).await.unwrap();
    assert!(first.snapshot.recommended_shifts[&StrategyDomain::Seo] < 0.0);

    let second = engine.balance.apply_shifts(first.snapshot.id).await.unwrap();
    assert_eq!(second.snapshot.supersedes, Some(first.snapshot.id));
    assert!(second.snapshot.allocations[&StrategyDomain::Seo] < first.snapshot.allocations[&StrategyDomain::Seo]);
    let total: f64 = second.snapshot.allocations.values().sum();
    assert!((total - 100.0).abs() < 1e-6);

    let stored = engine.balance.current_allocations(org, None).await.unwrap();
    assert_eq!(stored, second.snapshot.allocations);
    let latest = engine.balance.latest_snapshot(org).await.unwrap().unwrap();
    assert_eq!(latest.id, second.snapshot.id);
}

#[tokio::test]
async fn test_plan_scoping_keeps_graphs_apart() {
    let engine = common::engine().await;
    let org = Uuid::new_v4();
    let plan = Uuid::new_v4();

    let a = engine
        .graph
        .add_node(NodeSpec {
            plan_id: Some(plan),
            ..common::node_spec(org, "Keyword research", "SEO", 2.0)
        })
        .await
        .unwrap();
    let b = engine
        .graph
        .add_node(NodeSpec {
            plan_id: Some(plan),
            ..common::node_spec(org, "Write briefs", "CONTENT", 3.0)
        })
        .await
        .unwrap();
    engine
        .graph
        .add_node(common::node_spec(org, "Unplanned side quest", "SOCIAL", 50.0))
        .await
        .unwrap();
    engine
        .graph
        .add_edge(EdgeSpec {
            organization_id: org,
            source_id: a.id,
            target_id: b.id,
            edge_type: "DEPENDS_ON".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let scoped = engine.graph.get_graph(org, Some(plan), DEFAULT_MAX_PATHS).await.unwrap();
    assert_eq!(scoped.nodes.len(), 2);
    assert_eq!(scoped.critical_path.node_ids, vec![a.id, b.id]);
    assert!((scoped.critical_path.total_duration_hours - 5.0).abs() < 1e-9);

    let whole = engine.graph.get_graph(org, None, DEFAULT_MAX_PATHS).await.unwrap();
    assert_eq!(whole.nodes.len(), 3);
    assert!((whole.critical_path.total_duration_hours - 50.0).abs() < 1e-9);

    let allocations = engine.balance.current_allocations(org, Some(plan)).await.unwrap();
    assert!(!allocations.contains_key(&StrategyDomain::Social));
}
