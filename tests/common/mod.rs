//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use stratagem::adapters::sqlite::create_migrated_test_pool;
use stratagem::domain::models::{MetricObservation, NodeSpec, StrategyDomain};
use stratagem::{Config, StrategyEngine};
use uuid::Uuid;

/// Engine over a fresh migrated in-memory database.
pub async fn engine() -> StrategyEngine {
    engine_with(Config::default()).await
}

pub async fn engine_with(config: Config) -> StrategyEngine {
    let pool = create_migrated_test_pool()
        .await
        .expect("Failed to create test database");
    StrategyEngine::new(pool, &config)
}

/// Minimal node spec; callers override what they care about.
pub fn node_spec(org: Uuid, name: &str, domain: &str, hours: f64) -> NodeSpec {
    NodeSpec {
        organization_id: org,
        name: name.to_string(),
        node_type: "ACTION".to_string(),
        domain: domain.to_string(),
        estimated_duration_hours: Some(hours),
        ..Default::default()
    }
}

/// One observation per day ending today, all against the same target.
pub async fn record_daily_series(
    engine: &StrategyEngine,
    org: Uuid,
    domain: StrategyDomain,
    metric: &str,
    values: &[f64],
    target: f64,
) {
    let start = Utc::now() - Duration::days(values.len() as i64);
    for (i, value) in values.iter().enumerate() {
        let observation = MetricObservation::new(
            org,
            domain,
            metric,
            *value,
            Some(target),
            start + Duration::days(i as i64) + Duration::hours(1),
        );
        engine
            .drift
            .record_observation(observation)
            .await
            .expect("Failed to record observation");
    }
}

/// Initializes tracing for tests that want to see service logs.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
