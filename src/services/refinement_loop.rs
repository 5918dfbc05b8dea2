//! Refinement loop orchestrator.
//!
//! One cycle: allocate a sequence number, run drift and balance analysis
//! concurrently, turn their findings into adjustments, compose
//! recommendations and close the cycle. A cycle that hits an error is
//! marked FAILED before the error is returned.

use backoff::ExponentialBackoff;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::adjustment_engine::{AdjustmentRequest, ReinforcementAdjustmentEngine};
use super::domain_balance::DomainBalanceCoordinator;
use super::drift_detector::DriftDetector;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdjustmentFailure, AdjustmentSubject, BalanceAnalysis, CycleStatus, DriftDirection, DriftReport,
    DriftSeverity, DriftSignal, DriftSignalFilter, NodeStatus, RefinementConfig, RefinementCycle,
    RefinementLoopResult, RefinementNeed, RefinementRunConfig, ReinforcementAdjustment, Signal,
    SignalSource, StrategyDomain, Urgency,
};
use crate::domain::ports::{NodeFilter, RefinementCycleRepository, StrategyGraphRepository};

/// Balance score under which a rebalancing recommendation is made.
const LOW_BALANCE_SCORE: f64 = 60.0;

/// Days of delay that saturate a TIMELINE signal.
const DELAY_SATURATION_DAYS: f64 = 14.0;

pub struct RefinementLoopOrchestrator {
    graph: Arc<dyn StrategyGraphRepository>,
    cycles: Arc<dyn RefinementCycleRepository>,
    drift: Arc<DriftDetector>,
    balance: Arc<DomainBalanceCoordinator>,
    engine: Arc<ReinforcementAdjustmentEngine>,
    config: RefinementConfig,
}

impl RefinementLoopOrchestrator {
    pub fn new(
        graph: Arc<dyn StrategyGraphRepository>,
        cycles: Arc<dyn RefinementCycleRepository>,
        drift: Arc<DriftDetector>,
        balance: Arc<DomainBalanceCoordinator>,
        engine: Arc<ReinforcementAdjustmentEngine>,
        config: RefinementConfig,
    ) -> Self {
        Self {
            graph,
            cycles,
            drift,
            balance,
            engine,
            config,
        }
    }

    /// Run options seeded from configuration.
    pub fn default_run_config(&self) -> RefinementRunConfig {
        RefinementRunConfig {
            auto_apply_low_severity: self.config.auto_apply_low_severity,
            max_recommendations: self.config.max_recommendations,
            ..Default::default()
        }
    }

    /// Run one refinement cycle for an organization.
    #[instrument(skip(self, run), fields(organization_id = %organization_id, cycle_type = run.cycle_type.as_str()))]
    pub async fn run_refinement_loop(
        &self,
        organization_id: Uuid,
        plan_id: Option<Uuid>,
        run: RefinementRunConfig,
    ) -> DomainResult<RefinementLoopResult> {
        let previous = self.cycles.latest(organization_id, Some(CycleStatus::Completed)).await?;

        let mut cycle = RefinementCycle::new(organization_id, plan_id, run.cycle_type);
        cycle.sequence_number = self.allocate_sequence(&cycle).await?;
        info!(cycle_id = %cycle.id, sequence = cycle.sequence_number, "Refinement cycle started");

        match self.execute_cycle(&mut cycle, previous.as_ref(), &run).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(cycle_id = %cycle.id, error = %e, "Refinement cycle failed");
                if cycle.fail(e.to_string()).is_ok() {
                    if let Err(update_err) = self.cycles.update(&cycle).await {
                        error!(cycle_id = %cycle.id, error = %update_err, "Could not record cycle failure");
                    }
                }
                Err(e)
            }
        }
    }

    /// Insert the cycle with the next sequence number, retrying while
    /// another writer holds the same number.
    async fn allocate_sequence(&self, cycle: &RefinementCycle) -> DomainResult<u64> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(200),
            max_elapsed_time: Some(Duration::from_millis(self.config.sequence_retry_max_elapsed_ms)),
            ..Default::default()
        };

        backoff::future::retry(policy, || async move {
            self.cycles.create_with_next_sequence(cycle).await.map_err(|e| {
                if e.is_retryable() {
                    warn!(organization_id = %cycle.organization_id, "Sequence number contended, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    async fn execute_cycle(
        &self,
        cycle: &mut RefinementCycle,
        previous: Option<&RefinementCycle>,
        run: &RefinementRunConfig,
    ) -> DomainResult<RefinementLoopResult> {
        let organization_id = cycle.organization_id;
        let plan_id = cycle.plan_id;

        let (drift, balance) = tokio::join!(
            self.drift.analyze(organization_id, plan_id, Some(cycle.id)),
            self.balance.analyze(organization_id, plan_id, Some(cycle.id)),
        );
        let drift = drift?;
        let balance = balance?;

        let mut adjustments = Vec::new();
        let mut failures = Vec::new();
        let mut applied = 0u32;
        let mut historical: HashMap<StrategyDomain, Vec<Signal>> = HashMap::new();

        for signal in &drift.signals {
            let Some((subject, execution)) = self.drift_subject(signal).await? else {
                continue;
            };

            let history = match historical.get(&signal.domain) {
                Some(h) => h.clone(),
                None => {
                    let h = self
                        .engine
                        .generate_historical_signals(organization_id, signal.domain)
                        .await?;
                    historical.insert(signal.domain, h.clone());
                    h
                }
            };

            let mut signals = vec![execution];
            signals.extend(history);

            let auto_apply = run.auto_apply_low_severity && signal.auto_correctable;
            let request = AdjustmentRequest::new(organization_id, subject, signals)
                .in_cycle(cycle.id)
                .from_drift(signal.id)
                .triggered_by(signal.recommended_action.clone())
                .requiring_approval(!auto_apply);
            let adjustment = self.engine.generate_adjustment(request).await?;

            if auto_apply {
                match self.engine.apply_adjustment(adjustment.id).await {
                    Ok(done) => {
                        applied += 1;
                        adjustments.push(done);
                    }
                    Err(e) => {
                        warn!(adjustment_id = %adjustment.id, error = %e, "Auto-apply failed");
                        failures.push(AdjustmentFailure {
                            adjustment_id: adjustment.id,
                            error: e.to_string(),
                        });
                        adjustments.push(adjustment);
                    }
                }
            } else {
                adjustments.push(adjustment);
            }
        }

        adjustments.extend(self.domain_adjustments(cycle.id, &balance).await?);

        let recommendations = compose_recommendations(&drift, &balance, run.max_recommendations);

        cycle.drift_signals_found = u32::try_from(drift.signals.len()).unwrap_or(u32::MAX);
        cycle.adjustments_generated = u32::try_from(adjustments.len()).unwrap_or(u32::MAX);
        cycle.adjustments_applied = applied;
        cycle.confidence_before = previous.and_then(|p| p.confidence_after);
        cycle.confidence_after = mean_confidence(&adjustments);
        cycle.improvement_percent = improvement_percent(cycle.confidence_before, cycle.confidence_after);
        cycle.recommendations = recommendations.clone();

        let summary = format!(
            "{} drift signals, {} adjustments generated, {} applied, balance score {:.1}",
            cycle.drift_signals_found, cycle.adjustments_generated, cycle.adjustments_applied, balance.snapshot.balance_score
        );
        cycle.complete(summary).map_err(|reason| DomainError::InvalidStateTransition {
            from: cycle.status.as_str().to_string(),
            to: CycleStatus::Completed.as_str().to_string(),
            reason,
        })?;
        self.cycles.update(cycle).await?;

        info!(
            cycle_id = %cycle.id,
            drift_signals = cycle.drift_signals_found,
            adjustments = cycle.adjustments_generated,
            applied = cycle.adjustments_applied,
            failures = failures.len(),
            "Refinement cycle completed"
        );

        Ok(RefinementLoopResult {
            cycle: cycle.clone(),
            drift,
            balance,
            adjustments,
            application_failures: failures,
            recommendations,
        })
    }

    /// Adjustment subject and EXECUTION signal answering one drift signal.
    /// ACCELERATED signals only feed recommendations.
    async fn drift_subject(&self, signal: &DriftSignal) -> DomainResult<Option<(AdjustmentSubject, Signal)>> {
        if let Some(metric) = &signal.metric_name {
            let current = match signal.node_id {
                Some(node_id) => self
                    .graph
                    .get_node(node_id)
                    .await?
                    .and_then(|n| n.kpi_targets.get(metric).copied())
                    .unwrap_or(signal.expected_value),
                None => signal.expected_value,
            };
            let confidence = (signal.sample_count as f64 / 10.0).min(1.0).max(0.3);
            let execution = Signal::new(
                SignalSource::Execution,
                (signal.drift_percent / 100.0).clamp(-1.0, 1.0),
                confidence,
                signal.recommended_action.clone(),
            )
            .with_data(serde_json::json!({
                "drift_signal_id": signal.id,
                "drift_percent": signal.drift_percent,
                "samples": signal.sample_count,
            }));

            return Ok(Some((
                AdjustmentSubject::KpiTarget {
                    node_id: signal.node_id,
                    metric_name: metric.clone(),
                    current,
                },
                execution,
            )));
        }

        match (signal.direction, signal.node_id, signal.days_overdue()) {
            (DriftDirection::Delayed, Some(node_id), Some(days)) => {
                let execution = Signal::new(
                    SignalSource::Execution,
                    (days / DELAY_SATURATION_DAYS).min(1.0),
                    0.8,
                    signal.recommended_action.clone(),
                )
                .with_data(serde_json::json!({ "drift_signal_id": signal.id, "days_overdue": days }));
                Ok(Some((AdjustmentSubject::Timeline { node_id }, execution)))
            }
            _ => Ok(None),
        }
    }

    /// One DOMAIN adjustment per over-optimized or under-invested domain.
    /// These always wait for approval.
    async fn domain_adjustments(
        &self,
        cycle_id: Uuid,
        balance: &BalanceAnalysis,
    ) -> DomainResult<Vec<ReinforcementAdjustment>> {
        let snapshot = &balance.snapshot;
        let flagged = snapshot
            .over_optimized
            .iter()
            .map(|d| (*d, -0.6, "over-optimized"))
            .chain(snapshot.under_invested.iter().map(|d| (*d, 0.6, "under-invested")));

        let mut adjustments = Vec::new();
        for (domain, fallback, label) in flagged {
            let allocation = snapshot.allocations.get(&domain).copied().unwrap_or(0.0);
            let strength = snapshot
                .recommended_shifts
                .get(&domain)
                .map(|shift| (shift / 10.0).clamp(-1.0, 1.0))
                .unwrap_or(fallback);
            let reason = format!("{domain} is {label} at {allocation:.1}% allocation");

            let signal = Signal::new(SignalSource::Simulation, strength, 0.7, reason.clone()).with_data(serde_json::json!({
                "snapshot_id": snapshot.id,
                "allocation_percent": allocation,
                "performance": snapshot.performance_scores.get(&domain),
            }));
            let request = AdjustmentRequest::new(
                snapshot.organization_id,
                AdjustmentSubject::Domain {
                    domain,
                    allocation_percent: allocation,
                },
                vec![signal],
            )
            .in_cycle(cycle_id)
            .triggered_by(reason)
            .requiring_approval(true);

            adjustments.push(self.engine.generate_adjustment(request).await?);
        }
        Ok(adjustments)
    }

    /// Advisory check of whether a refinement run is warranted. Never writes.
    #[instrument(skip(self))]
    pub async fn check_refinement_needed(&self, organization_id: Uuid, plan_id: Option<Uuid>) -> DomainResult<RefinementNeed> {
        let now = Utc::now();
        let mut reasons = Vec::new();

        let in_progress = self
            .graph
            .list_nodes(
                NodeFilter::for_organization(organization_id)
                    .in_plan(plan_id)
                    .with_status(NodeStatus::InProgress),
            )
            .await?;
        let overdue = in_progress
            .iter()
            .filter(|n| n.expected_end().is_some_and(|end| end < now))
            .count();
        if overdue > 0 {
            reasons.push(format!("{overdue} in-progress steps are past their expected end"));
        }

        match self.cycles.latest(organization_id, None).await? {
            Some(last) => {
                let days = (now - last.started_at).num_days();
                if days > self.config.stale_after_days {
                    reasons.push(format!("Last refinement cycle ran {days} days ago"));
                }
            }
            None => reasons.push("No refinement cycle has run yet".to_string()),
        }

        let open = self
            .drift
            .list_signals(
                organization_id,
                DriftSignalFilter {
                    unresolved_only: true,
                    min_severity: Some(DriftSeverity::High),
                    ..Default::default()
                },
            )
            .await?;
        let critical = open.iter().filter(|s| s.severity == DriftSeverity::Critical).count();
        let high = open.len() - critical;
        if critical > 0 {
            reasons.push(format!("{critical} unresolved CRITICAL drift signals"));
        }
        if high > 0 {
            reasons.push(format!("{high} unresolved HIGH drift signals"));
        }

        let rebalance = self.balance.preview(organization_id, plan_id).await?.needs_rebalancing;
        if rebalance {
            reasons.push("Domain allocation needs rebalancing".to_string());
        }

        let urgency = if critical > 0 {
            Urgency::High
        } else if high > 0 || rebalance {
            Urgency::Medium
        } else {
            Urgency::Low
        };

        Ok(RefinementNeed {
            needed: !reasons.is_empty(),
            reasons,
            urgency,
        })
    }

    pub async fn cancel_cycle(&self, cycle_id: Uuid) -> DomainResult<RefinementCycle> {
        let mut cycle = self
            .cycles
            .get(cycle_id)
            .await?
            .ok_or(DomainError::CycleNotFound(cycle_id))?;

        let from = cycle.status.as_str().to_string();
        cycle.cancel().map_err(|reason| DomainError::InvalidStateTransition {
            from,
            to: CycleStatus::Cancelled.as_str().to_string(),
            reason,
        })?;
        self.cycles.update(&cycle).await?;
        info!(cycle_id = %cycle_id, "Refinement cycle cancelled");
        Ok(cycle)
    }

    pub async fn list_cycles(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<RefinementCycle>> {
        self.cycles.list(organization_id, limit).await
    }

    pub async fn latest_cycle(&self, organization_id: Uuid) -> DomainResult<Option<RefinementCycle>> {
        self.cycles.latest(organization_id, None).await
    }

    /// Run independent cycles for several organizations concurrently.
    pub async fn run_for_organizations(
        &self,
        organization_ids: &[Uuid],
        run: RefinementRunConfig,
    ) -> Vec<(Uuid, DomainResult<RefinementLoopResult>)> {
        let runs = organization_ids.iter().map(|org| {
            let run = run.clone();
            async move { (*org, self.run_refinement_loop(*org, None, run).await) }
        });
        join_all(runs).await
    }
}

/// CRITICAL drift first, then a low balance score, then dependency conflicts.
pub fn compose_recommendations(drift: &DriftReport, balance: &BalanceAnalysis, limit: usize) -> Vec<String> {
    let mut recommendations: Vec<String> = drift
        .signals
        .iter()
        .filter(|s| s.severity == DriftSeverity::Critical)
        .map(|s| format!("[CRITICAL] {}", s.recommended_action))
        .collect();

    let score = balance.snapshot.balance_score;
    if score < LOW_BALANCE_SCORE {
        recommendations.push(format!(
            "Balance score {score:.1} is below {LOW_BALANCE_SCORE:.0}; review domain allocations"
        ));
    }

    recommendations.extend(
        balance
            .snapshot
            .conflicts
            .iter()
            .map(|c| format!("Resolve dependency conflict: {}", c.description)),
    );

    recommendations.truncate(limit);
    recommendations
}

fn mean_confidence(adjustments: &[ReinforcementAdjustment]) -> Option<f64> {
    if adjustments.is_empty() {
        return None;
    }
    Some(adjustments.iter().map(|a| a.confidence).sum::<f64>() / adjustments.len() as f64)
}

/// `(after - before) / before * 100` when both are known and `before > 0`.
pub fn improvement_percent(before: Option<f64>, after: Option<f64>) -> Option<f64> {
    match (before, after) {
        (Some(b), Some(a)) if b > 0.0 => Some((a - b) / b * 100.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteAdjustmentRepository, SqliteBalanceSnapshotRepository,
        SqliteDriftSignalRepository, SqliteMetricsRepository, SqliteRefinementCycleRepository,
        SqliteStrategyGraphRepository,
    };
    use crate::domain::models::{
        AdjustmentConfig, AdjustmentTarget, BalanceConfig, CycleType, DriftConfig, MetricObservation,
        NodeType, StrategyNode,
    };
    use crate::domain::ports::MetricsRepository;
    use chrono::Duration as ChronoDuration;

    struct Fixture {
        orchestrator: RefinementLoopOrchestrator,
        graph: Arc<SqliteStrategyGraphRepository>,
        metrics: Arc<SqliteMetricsRepository>,
    }

    async fn setup() -> Fixture {
        setup_with(DriftConfig::default()).await
    }

    async fn setup_with(drift_config: DriftConfig) -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let graph = Arc::new(SqliteStrategyGraphRepository::new(pool.clone()));
        let metrics = Arc::new(SqliteMetricsRepository::new(pool.clone()));
        let signals = Arc::new(SqliteDriftSignalRepository::new(pool.clone()));

        let drift = Arc::new(DriftDetector::new(metrics.clone(), graph.clone(), signals.clone(), drift_config));
        let balance = Arc::new(DomainBalanceCoordinator::new(
            metrics.clone(),
            graph.clone(),
            Arc::new(SqliteBalanceSnapshotRepository::new(pool.clone())),
            BalanceConfig::default(),
        ));
        let engine = Arc::new(ReinforcementAdjustmentEngine::new(
            Arc::new(SqliteAdjustmentRepository::new(pool.clone())),
            graph.clone(),
            metrics.clone(),
            signals,
            AdjustmentConfig::default(),
        ));
        let orchestrator = RefinementLoopOrchestrator::new(
            graph.clone(),
            Arc::new(SqliteRefinementCycleRepository::new(pool)),
            drift,
            balance,
            engine,
            RefinementConfig::default(),
        );
        Fixture {
            orchestrator,
            graph,
            metrics,
        }
    }

    async fn record_series(metrics: &SqliteMetricsRepository, org: Uuid, values: &[f64], target: f64) {
        let start = Utc::now() - ChronoDuration::days(values.len() as i64);
        for (i, value) in values.iter().enumerate() {
            let obs = MetricObservation::new(
                org,
                StrategyDomain::Seo,
                "organic_sessions",
                *value,
                Some(target),
                start + ChronoDuration::days(i as i64),
            );
            metrics.record_observation(&obs).await.unwrap();
        }
    }

    #[test]
    fn test_improvement_needs_positive_baseline() {
        assert_eq!(improvement_percent(Some(0.5), Some(0.6)).map(|v| v.round()), Some(20.0));
        assert_eq!(improvement_percent(Some(0.0), Some(0.6)), None);
        assert_eq!(improvement_percent(None, Some(0.6)), None);
    }

    #[tokio::test]
    async fn test_cycle_turns_drift_and_imbalance_into_adjustments() {
        let f = setup().await;
        let org = Uuid::new_v4();

        let seo = StrategyNode::new(org, "Grow organic", NodeType::Objective, StrategyDomain::Seo)
            .with_duration(90.0)
            .with_kpi_target("organic_sessions", 200.0);
        let ads = StrategyNode::new(org, "Paid launch", NodeType::Action, StrategyDomain::Ads).with_duration(10.0);
        f.graph.create_node(&seo).await.unwrap();
        f.graph.create_node(&ads).await.unwrap();
        record_series(&f.metrics, org, &[100.0, 100.0, 100.0, 100.0, 100.0], 200.0).await;

        let result = f
            .orchestrator
            .run_refinement_loop(org, None, RefinementRunConfig::default())
            .await
            .unwrap();

        assert_eq!(result.cycle.status, CycleStatus::Completed);
        assert_eq!(result.cycle.sequence_number, 1);
        assert_eq!(result.cycle.drift_signals_found, 1);

        let kpi = result
            .adjustments
            .iter()
            .find(|a| a.target == AdjustmentTarget::KpiTarget)
            .unwrap();
        assert_eq!(kpi.target_id, Some(seo.id));
        assert!(kpi.requires_approval);
        assert!(kpi.drift_signal_id.is_some());

        // SEO holds 90% of the hours
        assert!(result
            .adjustments
            .iter()
            .any(|a| a.target == AdjustmentTarget::Domain && a.requires_approval));
        assert!(result.recommendations.iter().any(|r| r.starts_with("[CRITICAL]")));
        assert_eq!(result.cycle.adjustments_generated as usize, result.adjustments.len());
        assert!(result.cycle.confidence_after.is_some());

        let second = f
            .orchestrator
            .run_refinement_loop(org, None, RefinementRunConfig::default())
            .await
            .unwrap();
        assert_eq!(second.cycle.sequence_number, 2);
        assert_eq!(second.cycle.confidence_before, result.cycle.confidence_after);
        assert!(second.cycle.improvement_percent.is_some());
    }

    #[tokio::test]
    async fn test_medium_drift_auto_applies_only_when_opted_in() {
        let f = setup().await;
        let org = Uuid::new_v4();
        let seo = StrategyNode::new(org, "Grow organic", NodeType::Objective, StrategyDomain::Seo)
            .with_kpi_target("organic_sessions", 120.0);
        f.graph.create_node(&seo).await.unwrap();
        // baseline 100, target 120, expected after 5 = 110; actual 98.5 => about -10.5%, MEDIUM
        record_series(&f.metrics, org, &[100.0, 100.0, 100.0, 100.0, 98.5], 120.0).await;

        let manual = f
            .orchestrator
            .run_refinement_loop(org, None, RefinementRunConfig::default())
            .await
            .unwrap();
        assert_eq!(manual.drift.signals[0].severity, DriftSeverity::Medium);
        assert!(manual.drift.signals[0].auto_correctable);
        assert_eq!(manual.cycle.adjustments_applied, 0);
        assert!(manual.adjustments.iter().all(|a| a.is_pending()));

        let run = RefinementRunConfig {
            auto_apply_low_severity: true,
            ..Default::default()
        };
        let result = f.orchestrator.run_refinement_loop(org, None, run).await.unwrap();
        assert_eq!(result.drift.signals[0].severity, DriftSeverity::Medium);
        assert_eq!(result.cycle.adjustments_applied, 1);
        assert!(result.application_failures.is_empty());

        let kpi = result
            .adjustments
            .iter()
            .find(|a| a.target == AdjustmentTarget::KpiTarget)
            .unwrap();
        assert!(kpi.is_applied());
        assert!(!kpi.requires_approval);

        let open = f
            .orchestrator
            .drift
            .list_signals(org, DriftSignalFilter { unresolved_only: true, ..Default::default() })
            .await
            .unwrap();
        assert!(open.iter().any(|s| s.id == manual.drift.signals[0].id));
        assert!(open.iter().all(|s| s.id != result.drift.signals[0].id));
    }

    #[tokio::test]
    async fn test_opted_in_low_drift_is_applied_and_resolved() {
        let f = setup_with(DriftConfig {
            threshold_percent: 5.0,
            ..Default::default()
        })
        .await;
        let org = Uuid::new_v4();
        let seo = StrategyNode::new(org, "Grow organic", NodeType::Objective, StrategyDomain::Seo)
            .with_kpi_target("organic_sessions", 120.0);
        f.graph.create_node(&seo).await.unwrap();
        // expected 110, actual 104 => about -5.5%, LOW
        record_series(&f.metrics, org, &[100.0, 100.0, 100.0, 100.0, 104.0], 120.0).await;

        let run = RefinementRunConfig {
            auto_apply_low_severity: true,
            ..Default::default()
        };
        let result = f.orchestrator.run_refinement_loop(org, None, run).await.unwrap();
        assert_eq!(result.drift.signals[0].severity, DriftSeverity::Low);
        assert_eq!(result.cycle.adjustments_applied, 1);
        assert!(result.application_failures.is_empty());

        let applied = result
            .adjustments
            .iter()
            .find(|a| a.target == AdjustmentTarget::KpiTarget)
            .unwrap();
        assert!(applied.is_applied());
        assert!(!applied.requires_approval);

        let open = f
            .orchestrator
            .drift
            .list_signals(org, DriftSignalFilter { unresolved_only: true, ..Default::default() })
            .await
            .unwrap();
        assert!(open.is_empty());

        // Domain shifts are never auto-applied
        assert!(result
            .adjustments
            .iter()
            .filter(|a| a.target == AdjustmentTarget::Domain)
            .all(|a| a.is_pending()));
    }

    #[tokio::test]
    async fn test_cancel_and_history() {
        let f = setup().await;
        let org = Uuid::new_v4();

        let done = f
            .orchestrator
            .run_refinement_loop(org, None, RefinementRunConfig::default())
            .await
            .unwrap();
        assert!(matches!(
            f.orchestrator.cancel_cycle(done.cycle.id).await.unwrap_err(),
            DomainError::InvalidStateTransition { .. }
        ));
        assert!(matches!(
            f.orchestrator.cancel_cycle(Uuid::new_v4()).await.unwrap_err(),
            DomainError::CycleNotFound(_)
        ));

        let scheduled = RefinementRunConfig {
            cycle_type: CycleType::Scheduled,
            ..Default::default()
        };
        f.orchestrator.run_refinement_loop(org, None, scheduled).await.unwrap();

        let history = f.orchestrator.list_cycles(org, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].cycle_type, CycleType::Scheduled);
        let latest = f.orchestrator.latest_cycle(org).await.unwrap().unwrap();
        assert_eq!(latest.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_check_refinement_needed() {
        let f = setup().await;
        let org = Uuid::new_v4();

        let need = f.orchestrator.check_refinement_needed(org, None).await.unwrap();
        assert!(need.needed);
        assert_eq!(need.urgency, Urgency::Low);

        let seo = StrategyNode::new(org, "Grow organic", NodeType::Objective, StrategyDomain::Seo)
            .with_kpi_target("organic_sessions", 200.0);
        f.graph.create_node(&seo).await.unwrap();
        record_series(&f.metrics, org, &[100.0, 100.0, 100.0, 100.0, 100.0], 200.0).await;
        f.orchestrator
            .run_refinement_loop(org, None, RefinementRunConfig::default())
            .await
            .unwrap();

        let need = f.orchestrator.check_refinement_needed(org, None).await.unwrap();
        assert_eq!(need.urgency, Urgency::High);
        assert!(need.reasons.iter().any(|r| r.contains("CRITICAL")));
    }

    #[tokio::test]
    async fn test_organizations_run_independently() {
        let f = setup().await;
        let orgs = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        let results = f
            .orchestrator
            .run_for_organizations(&orgs, RefinementRunConfig::default())
            .await;
        assert_eq!(results.len(), 3);
        for (org, result) in results {
            let result = result.unwrap();
            assert_eq!(result.cycle.organization_id, org);
            assert_eq!(result.cycle.sequence_number, 1);
        }
    }
}
