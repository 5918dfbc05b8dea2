//! Drift detection over metric observations and node schedules.
//!
//! Metric drift compares the latest observation of each (domain, metric)
//! group against a linearly interpolated expected value. Timeline drift
//! flags IN_PROGRESS nodes that are past their expected end.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    DriftConfig, DriftDirection, DriftReport, DriftSeverity, DriftSignal, DriftSignalFilter,
    MetricObservation, NodeStatus, NodeType, StrategyDomain, StrategyNode,
};
use crate::domain::ports::{DriftSignalRepository, MetricsRepository, NodeFilter, StrategyGraphRepository};

pub struct DriftDetector {
    metrics: Arc<dyn MetricsRepository>,
    graph: Arc<dyn StrategyGraphRepository>,
    signals: Arc<dyn DriftSignalRepository>,
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(
        metrics: Arc<dyn MetricsRepository>,
        graph: Arc<dyn StrategyGraphRepository>,
        signals: Arc<dyn DriftSignalRepository>,
        config: DriftConfig,
    ) -> Self {
        Self {
            metrics,
            graph,
            signals,
            config,
        }
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Run metric and timeline drift detection and persist every signal found.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn analyze(
        &self,
        organization_id: Uuid,
        plan_id: Option<Uuid>,
        cycle_id: Option<Uuid>,
    ) -> DomainResult<DriftReport> {
        let now = Utc::now();
        let since = now - Duration::days(i64::from(self.config.lookback_days));

        let observations = self.metrics.list_observations(organization_id, since).await?;
        let nodes = self
            .graph
            .list_nodes(NodeFilter::for_organization(organization_id).in_plan(plan_id))
            .await?;

        let (mut signals, insufficient) = detect_metric_drift(organization_id, &observations, &self.config, now);
        bind_metric_nodes(&mut signals, &nodes);
        signals.extend(detect_timeline_drift(organization_id, &nodes, &self.config, now));

        for signal in &mut signals {
            signal.cycle_id = cycle_id;
            self.signals.create(signal).await?;
        }

        let report = build_report(signals, insufficient, self.config.max_recommended_actions);
        info!(
            signals = report.signals.len(),
            insufficient_groups = report.insufficient_data_groups,
            overall = report.overall_severity.map(|s| s.as_str()).unwrap_or("NONE"),
            "Drift analysis complete"
        );
        Ok(report)
    }

    /// Store one metric observation. Non-finite values and targets are rejected.
    pub async fn record_observation(&self, observation: MetricObservation) -> DomainResult<MetricObservation> {
        if !observation.value.is_finite() {
            return Err(DomainError::ValidationFailed(format!(
                "Observation value for {} must be finite",
                observation.metric_name
            )));
        }
        if observation.target.is_some_and(|t| !t.is_finite()) {
            return Err(DomainError::ValidationFailed(format!(
                "Observation target for {} must be finite",
                observation.metric_name
            )));
        }
        if observation.metric_name.trim().is_empty() {
            return Err(DomainError::ValidationFailed("Metric name cannot be empty".to_string()));
        }
        self.metrics.record_observation(&observation).await?;
        debug!(
            domain = observation.domain.as_str(),
            metric = %observation.metric_name,
            value = observation.value,
            "Recorded metric observation"
        );
        Ok(observation)
    }

    pub async fn list_signals(&self, organization_id: Uuid, filter: DriftSignalFilter) -> DomainResult<Vec<DriftSignal>> {
        self.signals.list(organization_id, filter).await
    }

    /// Mark a signal as handled. Resolving twice is a no-op.
    pub async fn resolve_drift_signal(&self, signal_id: Uuid) -> DomainResult<DriftSignal> {
        let mut signal = self
            .signals
            .get(signal_id)
            .await?
            .ok_or(DomainError::DriftSignalNotFound(signal_id))?;

        if !signal.resolved {
            signal.resolve();
            self.signals.update(&signal).await?;
            debug!(signal_id = %signal_id, "Resolved drift signal");
        }
        Ok(signal)
    }
}

/// Expected value at the current point of the trajectory.
pub fn expected_value(baseline: f64, target: f64, observations: usize, assumed_remaining: usize) -> f64 {
    let total = observations + assumed_remaining;
    let progress = if total == 0 {
        0.0
    } else {
        observations as f64 / total as f64
    };
    baseline + (target - baseline) * progress
}

/// Signed drift of `actual` from `expected` in percent, 0 when nothing was expected.
pub fn drift_percent(actual: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        0.0
    } else {
        (actual - expected) / expected * 100.0
    }
}

/// Metric drift per (domain, metric) group. Returns the signals and the
/// number of groups skipped for having fewer than `min_samples` usable
/// observations. Non-finite values are dropped before counting.
pub fn detect_metric_drift(
    organization_id: Uuid,
    observations: &[MetricObservation],
    config: &DriftConfig,
    now: DateTime<Utc>,
) -> (Vec<DriftSignal>, usize) {
    let mut groups: BTreeMap<(StrategyDomain, &str), Vec<&MetricObservation>> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.value.is_finite()) {
        groups.entry((obs.domain, obs.metric_name.as_str())).or_default().push(obs);
    }

    let mut signals = Vec::new();
    let mut insufficient = 0;

    for ((domain, metric), mut group) in groups {
        if group.len() < config.min_samples.max(1) {
            insufficient += 1;
            continue;
        }
        group.sort_by_key(|o| o.observed_at);

        let baseline = group[0].value;
        let actual = group[group.len() - 1].value;
        let target = group
            .iter()
            .rev()
            .find_map(|o| o.target.filter(|t| t.is_finite()))
            .unwrap_or(baseline * 1.2);

        let expected = expected_value(baseline, target, group.len(), config.assumed_remaining_observations);
        let drift = drift_percent(actual, expected);
        if drift.abs() <= config.threshold_percent {
            continue;
        }

        let severity = DriftSeverity::from_drift_percent(drift);
        let direction = if drift > 0.0 {
            DriftDirection::Above
        } else {
            DriftDirection::Below
        };
        let recommended_action = match direction {
            DriftDirection::Above => format!(
                "{domain} {metric} is {:.1}% above plan; consider raising the target",
                drift.abs()
            ),
            _ => format!(
                "{domain} {metric} is {:.1}% below plan; investigate and adjust tactics",
                drift.abs()
            ),
        };

        signals.push(DriftSignal {
            id: Uuid::new_v4(),
            organization_id,
            cycle_id: None,
            domain,
            metric_name: Some(metric.to_string()),
            node_id: None,
            expected_value: expected,
            actual_value: actual,
            drift_percent: drift,
            direction,
            severity,
            auto_correctable: matches!(severity, DriftSeverity::Low | DriftSeverity::Medium),
            resolved: false,
            sample_count: group.len(),
            recommended_action,
            detected_at: now,
            resolved_at: None,
        });
    }

    (signals, insufficient)
}

/// Attach metric signals to the node that owns the metric: a node of the
/// same domain carrying a KPI target of that name, else a METRIC node named
/// after it.
pub fn bind_metric_nodes(signals: &mut [DriftSignal], nodes: &[StrategyNode]) {
    for signal in signals.iter_mut() {
        let Some(metric) = signal.metric_name.as_deref() else {
            continue;
        };
        let domain = signal.domain;
        let same_domain = || nodes.iter().filter(move |n| n.domain == domain);
        let bound = same_domain()
            .find(|n| n.kpi_targets.contains_key(metric))
            .or_else(|| same_domain().find(|n| n.node_type == NodeType::Metric && n.name == metric));
        signal.node_id = bound.map(|n| n.id);
    }
}

/// DELAYED signals for IN_PROGRESS nodes past their expected end and, when
/// enabled, ACCELERATED signals for nodes well ahead of schedule.
///
/// Delayed signals record the planned span as `expected_value` and the
/// elapsed span as `actual_value`, both in days.
pub fn detect_timeline_drift(
    organization_id: Uuid,
    nodes: &[StrategyNode],
    config: &DriftConfig,
    now: DateTime<Utc>,
) -> Vec<DriftSignal> {
    let mut signals = Vec::new();

    for node in nodes.iter().filter(|n| n.status == NodeStatus::InProgress) {
        let Some(end) = node.expected_end() else {
            continue;
        };
        let planned_days = match node.start_date {
            Some(start) => seconds_to_days((end - start).num_seconds()),
            None => node.duration_hours() / 24.0,
        };

        if end < now {
            let overdue = seconds_to_days((now - end).num_seconds());
            let severity = DriftSeverity::from_days_overdue(overdue);
            let drift = if planned_days > 0.0 {
                overdue / planned_days * 100.0
            } else {
                100.0
            };

            signals.push(timeline_signal(
                organization_id,
                node,
                planned_days,
                planned_days + overdue,
                drift,
                DriftDirection::Delayed,
                severity,
                format!("'{}' is {:.1} days overdue; re-plan or unblock it", node.name, overdue),
                now,
            ));
            continue;
        }

        if !config.detect_acceleration {
            continue;
        }
        let Some(start) = node.start_date else {
            continue;
        };
        let span = (end - start).num_seconds();
        if span <= 0 || now < start {
            continue;
        }
        let elapsed_percent = ((now - start).num_seconds() as f64 / span as f64 * 100.0).clamp(0.0, 100.0);
        let lead = f64::from(node.progress) - elapsed_percent;
        if lead > config.acceleration_margin_percent {
            signals.push(timeline_signal(
                organization_id,
                node,
                elapsed_percent,
                f64::from(node.progress),
                lead,
                DriftDirection::Accelerated,
                DriftSeverity::Low,
                format!("'{}' is {:.0} points ahead of schedule; dependents could start early", node.name, lead),
                now,
            ));
        }
    }

    signals
}

#[allow(clippy::too_many_arguments)]
fn timeline_signal(
    organization_id: Uuid,
    node: &StrategyNode,
    expected_value: f64,
    actual_value: f64,
    drift_percent: f64,
    direction: DriftDirection,
    severity: DriftSeverity,
    recommended_action: String,
    now: DateTime<Utc>,
) -> DriftSignal {
    DriftSignal {
        id: Uuid::new_v4(),
        organization_id,
        cycle_id: None,
        domain: node.domain,
        metric_name: None,
        node_id: Some(node.id),
        expected_value,
        actual_value,
        drift_percent,
        direction,
        severity,
        auto_correctable: false,
        resolved: false,
        sample_count: 0,
        recommended_action,
        detected_at: now,
        resolved_at: None,
    }
}

fn seconds_to_days(seconds: i64) -> f64 {
    seconds.max(0) as f64 / 86_400.0
}

/// Aggregate signals into a report with the most urgent actions first.
pub fn build_report(signals: Vec<DriftSignal>, insufficient_data_groups: usize, max_actions: usize) -> DriftReport {
    let overall_severity = signals.iter().map(|s| s.severity).max();

    let mut ranked: Vec<&DriftSignal> = signals.iter().collect();
    ranked.sort_by_key(|s| s.severity.action_priority());
    let recommended_actions = ranked
        .into_iter()
        .take(max_actions)
        .map(|s| s.recommended_action.clone())
        .collect();

    DriftReport {
        signals,
        overall_severity,
        recommended_actions,
        insufficient_data_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteDriftSignalRepository, SqliteMetricsRepository,
        SqliteStrategyGraphRepository,
    };

    fn series(org: Uuid, metric: &str, values: &[f64], target: Option<f64>) -> Vec<MetricObservation> {
        let start = Utc::now() - Duration::days(values.len() as i64);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                MetricObservation::new(org, StrategyDomain::Seo, metric, *v, target, start + Duration::days(i as i64))
            })
            .collect()
    }

    #[test]
    fn test_expected_value_interpolates_toward_target() {
        // 5 of 10 observations seen: halfway from 100 to 200
        assert!((expected_value(100.0, 200.0, 5, 5) - 150.0).abs() < 1e-9);
        assert!((expected_value(100.0, 200.0, 3, 0) - 200.0).abs() < 1e-9);
        assert_eq!(drift_percent(10.0, 0.0), 0.0);
    }

    #[test]
    fn test_below_plan_is_flagged_with_severity() {
        let org = Uuid::new_v4();
        // baseline 100, target 200, expected after 5 samples = 150; actual 100 => -33%
        let obs = series(org, "organic_sessions", &[100.0, 100.0, 100.0, 100.0, 100.0], Some(200.0));
        let (signals, insufficient) = detect_metric_drift(org, &obs, &DriftConfig::default(), Utc::now());

        assert_eq!(insufficient, 0);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.direction, DriftDirection::Below);
        assert_eq!(signal.severity, DriftSeverity::Critical);
        assert!(!signal.auto_correctable);
        assert_eq!(signal.sample_count, 5);
        assert!((signal.expected_value - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_groups_and_small_drift_produce_nothing() {
        let org = Uuid::new_v4();
        let mut obs = series(org, "ctr", &[1.0, 1.0], None);
        // baseline 100, implicit target 120, expected after 3 = 107.5, actual 108 => tiny drift
        obs.extend(series(org, "sessions", &[100.0, 104.0, 108.0], None));

        let (signals, insufficient) = detect_metric_drift(org, &obs, &DriftConfig::default(), Utc::now());
        assert!(signals.is_empty());
        assert_eq!(insufficient, 1);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let org = Uuid::new_v4();
        let obs = series(org, "ctr", &[1.0, f64::NAN, f64::INFINITY], None);
        let (signals, insufficient) = detect_metric_drift(org, &obs, &DriftConfig::default(), Utc::now());
        assert!(signals.is_empty());
        assert_eq!(insufficient, 1);
    }

    #[test]
    fn test_timeline_drift_for_overdue_nodes() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let late = StrategyNode::new(org, "Site migration", NodeType::Action, StrategyDomain::Seo)
            .with_status(NodeStatus::InProgress)
            .with_schedule(Some(now - Duration::days(20)), Some(now - Duration::days(10)));
        let planned = StrategyNode::new(org, "Later", NodeType::Action, StrategyDomain::Seo)
            .with_schedule(Some(now - Duration::days(20)), Some(now - Duration::days(10)));

        let signals = detect_timeline_drift(org, &[late.clone(), planned], &DriftConfig::default(), now);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].node_id, Some(late.id));
        assert_eq!(signals[0].direction, DriftDirection::Delayed);
        assert_eq!(signals[0].severity, DriftSeverity::High);
        assert!(!signals[0].auto_correctable);
        let overdue = signals[0].days_overdue().unwrap();
        assert!((overdue - 10.0).abs() < 0.01);
    }

    #[test]
    fn test_acceleration_is_opt_in() {
        let org = Uuid::new_v4();
        let now = Utc::now();
        let mut fast = StrategyNode::new(org, "Fast", NodeType::Action, StrategyDomain::Content)
            .with_status(NodeStatus::InProgress)
            .with_schedule(Some(now - Duration::days(1)), Some(now + Duration::days(9)));
        fast.progress = 90;

        assert!(detect_timeline_drift(org, &[fast.clone()], &DriftConfig::default(), now).is_empty());

        let config = DriftConfig {
            detect_acceleration: true,
            ..Default::default()
        };
        let signals = detect_timeline_drift(org, &[fast], &config, now);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, DriftDirection::Accelerated);
        assert_eq!(signals[0].severity, DriftSeverity::Low);
    }

    #[test]
    fn test_report_orders_actions_by_urgency() {
        let org = Uuid::new_v4();
        let mut obs = series(org, "a", &[100.0, 100.0, 100.0, 100.0, 100.0], Some(200.0));
        obs.extend(series(org, "b", &[100.0, 100.0, 100.0, 100.0, 100.0], Some(120.0)));
        let (signals, _) = detect_metric_drift(org, &obs, &DriftConfig::default(), Utc::now());
        assert_eq!(signals.len(), 1);

        let mut low = signals[0].clone();
        low.severity = DriftSeverity::Low;
        low.recommended_action = "low".to_string();
        let report = build_report(vec![low, signals[0].clone()], 0, 1);

        assert_eq!(report.overall_severity, Some(DriftSeverity::Critical));
        assert_eq!(report.recommended_actions.len(), 1);
        assert_ne!(report.recommended_actions[0], "low");
    }

    #[tokio::test]
    async fn test_analyze_persists_and_binds_signals() {
        let pool = create_migrated_test_pool().await.unwrap();
        let metrics = Arc::new(SqliteMetricsRepository::new(pool.clone()));
        let graph = Arc::new(SqliteStrategyGraphRepository::new(pool.clone()));
        let signals = Arc::new(SqliteDriftSignalRepository::new(pool));
        let detector = DriftDetector::new(metrics.clone(), graph.clone(), signals, DriftConfig::default());

        let org = Uuid::new_v4();
        let owner = StrategyNode::new(org, "Grow organic", NodeType::Objective, StrategyDomain::Seo)
            .with_kpi_target("organic_sessions", 200.0);
        graph.create_node(&owner).await.unwrap();
        for obs in series(org, "organic_sessions", &[100.0, 100.0, 100.0, 100.0], Some(200.0)) {
            metrics.record_observation(&obs).await.unwrap();
        }

        let cycle_id = Uuid::new_v4();
        let report = detector.analyze(org, None, Some(cycle_id)).await.unwrap();
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].node_id, Some(owner.id));

        let stored = detector
            .list_signals(org, DriftSignalFilter { cycle_id: Some(cycle_id), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);

        let resolved = detector.resolve_drift_signal(stored[0].id).await.unwrap();
        assert!(resolved.resolved);
        assert!(matches!(
            detector.resolve_drift_signal(Uuid::new_v4()).await.unwrap_err(),
            DomainError::DriftSignalNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_record_observation_rejects_non_finite() {
        let pool = create_migrated_test_pool().await.unwrap();
        let detector = DriftDetector::new(
            Arc::new(SqliteMetricsRepository::new(pool.clone())),
            Arc::new(SqliteStrategyGraphRepository::new(pool.clone())),
            Arc::new(SqliteDriftSignalRepository::new(pool)),
            DriftConfig::default(),
        );
        let org = Uuid::new_v4();

        let bad = MetricObservation::new(org, StrategyDomain::Ads, "roas", f64::INFINITY, None, Utc::now());
        assert!(matches!(
            detector.record_observation(bad).await.unwrap_err(),
            DomainError::ValidationFailed(_)
        ));

        let good = MetricObservation::new(org, StrategyDomain::Ads, "roas", 3.2, Some(4.0), Utc::now());
        detector.record_observation(good).await.unwrap();
    }
}
