//! Reinforcement adjustment engine.
//!
//! Turns weighted signals into typed adjustments, applies approved
//! adjustments to graph nodes under optimistic versioning and feeds realized
//! outcomes back as HISTORICAL signals.

use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdjustmentChange, AdjustmentConfig, AdjustmentFilter, AdjustmentSubject, AdjustmentType,
    DomainShift, KpiAdjustment, PerformanceRecord, PriorityAdjustment, ReinforcementAdjustment,
    ResourceAdjustment, Signal, SignalSource, StepAdjustment, StrategyDomain, StrategyNode,
    TimelineAdjustment, ValueChange,
};
use crate::domain::ports::{AdjustmentRepository, DriftSignalRepository, MetricsRepository, StrategyGraphRepository};

/// Records compared at each end of the history when looking for a trend.
const TREND_SAMPLE: usize = 5;

/// Confidence-weighted view of a batch of signals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalAggregate {
    /// Σ(strength × confidence) / Σ(confidence)
    pub weighted_strength: f64,
    /// Σ(confidence) / n
    pub mean_confidence: f64,
}

/// Everything needed to derive one adjustment.
#[derive(Debug, Clone)]
pub struct AdjustmentRequest {
    pub organization_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub subject: AdjustmentSubject,
    pub signals: Vec<Signal>,
    pub trigger_reason: String,
    pub drift_signal_id: Option<Uuid>,
    pub requires_approval: bool,
}

impl AdjustmentRequest {
    pub fn new(organization_id: Uuid, subject: AdjustmentSubject, signals: Vec<Signal>) -> Self {
        Self {
            organization_id,
            cycle_id: None,
            subject,
            signals,
            trigger_reason: String::new(),
            drift_signal_id: None,
            requires_approval: true,
        }
    }

    pub fn in_cycle(mut self, cycle_id: Uuid) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    pub fn triggered_by(mut self, reason: impl Into<String>) -> Self {
        self.trigger_reason = reason.into();
        self
    }

    pub fn from_drift(mut self, drift_signal_id: Uuid) -> Self {
        self.drift_signal_id = Some(drift_signal_id);
        self
    }

    pub fn requiring_approval(mut self, requires_approval: bool) -> Self {
        self.requires_approval = requires_approval;
        self
    }
}

pub struct ReinforcementAdjustmentEngine {
    adjustments: Arc<dyn AdjustmentRepository>,
    graph: Arc<dyn StrategyGraphRepository>,
    metrics: Arc<dyn MetricsRepository>,
    drift_signals: Arc<dyn DriftSignalRepository>,
    config: AdjustmentConfig,
}

impl ReinforcementAdjustmentEngine {
    pub fn new(
        adjustments: Arc<dyn AdjustmentRepository>,
        graph: Arc<dyn StrategyGraphRepository>,
        metrics: Arc<dyn MetricsRepository>,
        drift_signals: Arc<dyn DriftSignalRepository>,
        config: AdjustmentConfig,
    ) -> Self {
        Self {
            adjustments,
            graph,
            metrics,
            drift_signals,
            config,
        }
    }

    async fn load_node(&self, node_id: Uuid) -> DomainResult<StrategyNode> {
        self.graph.get_node(node_id).await?.ok_or(DomainError::NodeNotFound(node_id))
    }

    async fn load_adjustment(&self, id: Uuid) -> DomainResult<ReinforcementAdjustment> {
        self.adjustments.get(id).await?.ok_or(DomainError::AdjustmentNotFound(id))
    }

    /// Aggregate the request's signals into a pending adjustment and persist it.
    #[instrument(skip(self, request), fields(organization_id = %request.organization_id, signals = request.signals.len()))]
    pub async fn generate_adjustment(&self, request: AdjustmentRequest) -> DomainResult<ReinforcementAdjustment> {
        let aggregate = aggregate_signals(&request.signals)
            .ok_or_else(|| DomainError::ValidationFailed("At least one signal is required".to_string()))?;

        let adjustment_type = decide_adjustment_type(aggregate.weighted_strength, aggregate.mean_confidence);
        let magnitude = aggregate.weighted_strength.abs() * 100.0;

        let node = match subject_node_id(&request.subject) {
            Some(id) => Some(self.load_node(id).await?),
            None => None,
        };
        let change = build_change(&request.subject, node.as_ref(), adjustment_type, magnitude);

        let now = Utc::now();
        let adjustment = ReinforcementAdjustment {
            id: Uuid::new_v4(),
            organization_id: request.organization_id,
            cycle_id: request.cycle_id,
            target: change.target(),
            target_id: change.node_id(),
            adjustment_type,
            change,
            magnitude,
            confidence: aggregate.mean_confidence,
            trigger_reason: request.trigger_reason,
            supporting_evidence: request.signals,
            drift_signal_id: request.drift_signal_id,
            requires_approval: request.requires_approval,
            approved: None,
            applied_at: None,
            expected_impact: expected_impact(adjustment_type, magnitude, aggregate.mean_confidence),
            actual_impact: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        self.adjustments.create(&adjustment).await?;
        debug!(
            adjustment_id = %adjustment.id,
            adjustment_type = adjustment.adjustment_type.as_str(),
            target = adjustment.target.as_str(),
            magnitude = adjustment.magnitude,
            "Generated adjustment"
        );
        Ok(adjustment)
    }

    pub async fn get_adjustment(&self, id: Uuid) -> DomainResult<ReinforcementAdjustment> {
        self.load_adjustment(id).await
    }

    pub async fn list_adjustments(
        &self,
        organization_id: Uuid,
        filter: AdjustmentFilter,
    ) -> DomainResult<Vec<ReinforcementAdjustment>> {
        self.adjustments.list(organization_id, filter).await
    }

    pub async fn list_pending(&self, organization_id: Uuid) -> DomainResult<Vec<ReinforcementAdjustment>> {
        self.adjustments
            .list(
                organization_id,
                AdjustmentFilter {
                    pending_only: true,
                    ..Default::default()
                },
            )
            .await
    }

    /// Approve without applying.
    pub async fn approve(&self, id: Uuid) -> DomainResult<ReinforcementAdjustment> {
        self.decide(id, true).await
    }

    pub async fn reject(&self, id: Uuid) -> DomainResult<ReinforcementAdjustment> {
        self.decide(id, false).await
    }

    async fn decide(&self, id: Uuid, approved: bool) -> DomainResult<ReinforcementAdjustment> {
        let mut adjustment = self.load_adjustment(id).await?;
        if !adjustment.is_pending() {
            return Err(DomainError::InvalidStateTransition {
                from: approval_label(adjustment.approved).to_string(),
                to: approval_label(Some(approved)).to_string(),
                reason: "adjustment was already reviewed".to_string(),
            });
        }

        adjustment.approved = Some(approved);
        adjustment.updated_at = Utc::now();
        self.adjustments.update(&adjustment).await?;
        adjustment.version += 1;

        info!(adjustment_id = %id, approved, "Adjustment reviewed");
        Ok(adjustment)
    }

    /// Apply an adjustment to its target node and mark it approved.
    ///
    /// The adjustment is claimed with a versioned update before the node is
    /// touched, so concurrent applies of one adjustment mutate the node at
    /// most once. A node whose fields no longer hold the values the change
    /// was derived from fails with `ConcurrencyConflict` and the claim is
    /// released. DOMAIN and RESOURCE adjustments, and KPI adjustments without
    /// an owning node, are approved without mutating anything. A drift signal
    /// linked to the adjustment is resolved.
    #[instrument(skip(self))]
    pub async fn apply_adjustment(&self, id: Uuid) -> DomainResult<ReinforcementAdjustment> {
        let mut adjustment = self.load_adjustment(id).await?;
        if adjustment.approved == Some(false) {
            return Err(DomainError::InvalidStateTransition {
                from: "REJECTED".to_string(),
                to: "APPLIED".to_string(),
                reason: "rejected adjustments cannot be applied".to_string(),
            });
        }
        if adjustment.is_applied() {
            return Err(DomainError::InvalidStateTransition {
                from: "APPLIED".to_string(),
                to: "APPLIED".to_string(),
                reason: "adjustment was already applied".to_string(),
            });
        }

        let reviewed = adjustment.approved;
        let now = Utc::now();
        adjustment.approved = Some(true);
        adjustment.applied_at = Some(now);
        adjustment.updated_at = now;
        self.adjustments.update(&adjustment).await?;
        adjustment.version += 1;

        if let Some(node_id) = adjustment.change.node_id() {
            if let Err(e) = self.apply_to_node(node_id, &adjustment.change).await {
                self.release_claim(&mut adjustment, reviewed).await;
                return Err(e);
            }
        }

        if let Some(signal_id) = adjustment.drift_signal_id {
            self.resolve_linked_signal(signal_id).await?;
        }

        info!(
            adjustment_id = %id,
            target = adjustment.target.as_str(),
            adjustment_type = adjustment.adjustment_type.as_str(),
            "Applied adjustment"
        );
        Ok(adjustment)
    }

    async fn apply_to_node(&self, node_id: Uuid, change: &AdjustmentChange) -> DomainResult<()> {
        let mut node = self.load_node(node_id).await?;
        apply_change(&mut node, change)?;
        node.validate().map_err(DomainError::ValidationFailed)?;
        node.updated_at = Utc::now();
        self.graph.update_node(&node).await
    }

    /// Return a claimed adjustment to its reviewed state after the node write failed.
    async fn release_claim(&self, adjustment: &mut ReinforcementAdjustment, reviewed: Option<bool>) {
        adjustment.approved = reviewed;
        adjustment.applied_at = None;
        adjustment.updated_at = Utc::now();
        match self.adjustments.update(adjustment).await {
            Ok(()) => adjustment.version += 1,
            Err(e) => warn!(adjustment_id = %adjustment.id, error = %e, "Failed to release adjustment claim"),
        }
    }

    async fn resolve_linked_signal(&self, signal_id: Uuid) -> DomainResult<()> {
        match self.drift_signals.get(signal_id).await? {
            Some(mut signal) if !signal.resolved => {
                signal.resolve();
                self.drift_signals.update(&signal).await
            }
            Some(_) => Ok(()),
            None => {
                warn!(signal_id = %signal_id, "Linked drift signal no longer exists");
                Ok(())
            }
        }
    }

    /// Record the realized impact of an adjustment as a performance record,
    /// graded on track when achievement reaches the success threshold.
    #[instrument(skip(self))]
    pub async fn record_outcome(
        &self,
        adjustment_id: Uuid,
        actual_impact: f64,
        achievement_percent: f64,
    ) -> DomainResult<PerformanceRecord> {
        if !actual_impact.is_finite() || !achievement_percent.is_finite() {
            return Err(DomainError::ValidationFailed(
                "Outcome values must be finite numbers".to_string(),
            ));
        }

        let mut adjustment = self.load_adjustment(adjustment_id).await?;
        let domain = self.outcome_domain(&adjustment).await?;

        adjustment.actual_impact = Some(actual_impact);
        adjustment.updated_at = Utc::now();
        self.adjustments.update(&adjustment).await?;

        let on_track = achievement_percent >= self.config.success_threshold_percent;
        let mut record = PerformanceRecord::new(adjustment.organization_id, domain, achievement_percent, on_track)
            .with_adjustment(adjustment.id);
        if let AdjustmentChange::KpiTarget(kpi) = &adjustment.change {
            record = record.with_metric(kpi.metric_name.clone());
        }
        self.metrics.record_performance(&record).await?;

        info!(adjustment_id = %adjustment_id, domain = domain.as_str(), on_track, "Recorded adjustment outcome");
        Ok(record)
    }

    async fn outcome_domain(&self, adjustment: &ReinforcementAdjustment) -> DomainResult<StrategyDomain> {
        if let AdjustmentChange::Domain(shift) = &adjustment.change {
            return Ok(shift.domain);
        }
        if let Some(node_id) = adjustment.change.node_id() {
            return Ok(self.load_node(node_id).await?.domain);
        }
        if let Some(signal_id) = adjustment.drift_signal_id {
            if let Some(signal) = self.drift_signals.get(signal_id).await? {
                return Ok(signal.domain);
            }
        }
        Err(DomainError::ValidationFailed(format!(
            "Adjustment {} is not tied to a domain",
            adjustment.id
        )))
    }

    /// HISTORICAL signals for a domain, from its recent performance records.
    pub async fn generate_historical_signals(
        &self,
        organization_id: Uuid,
        domain: StrategyDomain,
    ) -> DomainResult<Vec<Signal>> {
        let records = self
            .metrics
            .list_performance(organization_id, Some(domain), self.config.historical_window)
            .await?;
        Ok(historical_signals(&records, &self.config))
    }
}

fn approval_label(approved: Option<bool>) -> &'static str {
    match approved {
        None => "PENDING",
        Some(true) => "APPROVED",
        Some(false) => "REJECTED",
    }
}

/// None for an empty batch. A batch with zero total confidence has zero
/// strength. Out-of-range strengths and confidences are clamped first.
pub fn aggregate_signals(signals: &[Signal]) -> Option<SignalAggregate> {
    if signals.is_empty() {
        return None;
    }

    let total_confidence: f64 = signals.iter().map(Signal::bounded_confidence).sum();
    let weighted: f64 = signals
        .iter()
        .map(|s| s.bounded_strength() * s.bounded_confidence())
        .sum();
    let weighted_strength = if total_confidence > 0.0 {
        weighted / total_confidence
    } else {
        0.0
    };

    Some(SignalAggregate {
        weighted_strength,
        mean_confidence: total_confidence / signals.len() as f64,
    })
}

pub fn decide_adjustment_type(strength: f64, mean_confidence: f64) -> AdjustmentType {
    if strength > 0.5 {
        AdjustmentType::Strengthen
    } else if strength > 0.2 {
        AdjustmentType::Accelerate
    } else if strength < -0.5 {
        AdjustmentType::Pause
    } else if strength < -0.2 {
        AdjustmentType::Weaken
    } else if strength.abs() < 0.1 && mean_confidence < 0.5 {
        AdjustmentType::Redirect
    } else {
        AdjustmentType::Maintain
    }
}

pub fn expected_impact(adjustment_type: AdjustmentType, magnitude: f64, confidence: f64) -> f64 {
    adjustment_type.base_impact() * (magnitude / 50.0) * confidence
}

fn subject_node_id(subject: &AdjustmentSubject) -> Option<Uuid> {
    match subject {
        AdjustmentSubject::Step { node_id }
        | AdjustmentSubject::Timeline { node_id }
        | AdjustmentSubject::Priority { node_id } => Some(*node_id),
        AdjustmentSubject::KpiTarget { .. } | AdjustmentSubject::Domain { .. } | AdjustmentSubject::Resource { .. } => None,
    }
}

/// Typed change for a subject. Node-backed subjects read current values
/// from `node`; a missing node leaves the change at its current value.
pub fn build_change(
    subject: &AdjustmentSubject,
    node: Option<&StrategyNode>,
    adjustment_type: AdjustmentType,
    magnitude: f64,
) -> AdjustmentChange {
    let multiplier = adjustment_type.multiplier(magnitude);

    match subject {
        AdjustmentSubject::Step { node_id } => {
            let estimated_duration_hours = node
                .and_then(|n| n.estimated_duration_hours)
                .map(|h| ValueChange::scaled(h, multiplier));
            let kpi_targets = node
                .map(|n| {
                    n.kpi_targets
                        .iter()
                        .map(|(name, value)| (name.clone(), ValueChange::scaled(*value, multiplier)))
                        .collect()
                })
                .unwrap_or_default();
            let risk_level = node.and_then(|n| {
                let adjusted = adjustment_type.adjust_risk(n.risk_level);
                (adjusted != n.risk_level).then_some((n.risk_level, adjusted))
            });
            AdjustmentChange::Step(StepAdjustment {
                node_id: *node_id,
                estimated_duration_hours,
                kpi_targets,
                risk_level,
            })
        }
        AdjustmentSubject::KpiTarget {
            node_id,
            metric_name,
            current,
        } => AdjustmentChange::KpiTarget(KpiAdjustment {
            node_id: *node_id,
            metric_name: metric_name.clone(),
            change: ValueChange::scaled(*current, multiplier),
        }),
        AdjustmentSubject::Timeline { node_id } => {
            let hours = node.map(StrategyNode::duration_hours).unwrap_or_default();
            AdjustmentChange::Timeline(TimelineAdjustment {
                node_id: *node_id,
                estimated_duration_hours: ValueChange::scaled(hours, multiplier),
            })
        }
        AdjustmentSubject::Priority { node_id } => {
            let priority = node.map(|n| f64::from(n.priority)).unwrap_or_default();
            let mut change = ValueChange::scaled(priority, multiplier);
            change.new = change.new.clamp(0.0, 100.0);
            AdjustmentChange::Priority(PriorityAdjustment {
                node_id: *node_id,
                change,
            })
        }
        AdjustmentSubject::Domain {
            domain,
            allocation_percent,
        } => AdjustmentChange::Domain(DomainShift {
            domain: *domain,
            allocation_percent: ValueChange::scaled(*allocation_percent, multiplier),
        }),
        AdjustmentSubject::Resource { resource, current } => AdjustmentChange::Resource(ResourceAdjustment {
            resource: resource.clone(),
            change: ValueChange::scaled(*current, multiplier),
        }),
    }
}

const VALUE_TOLERANCE: f64 = 1e-9;

fn unchanged(current: Option<f64>, change: &ValueChange) -> bool {
    current.is_some_and(|v| (v - change.previous).abs() <= VALUE_TOLERANCE)
}

/// Fails with `ConcurrencyConflict` when a field named by the change no
/// longer holds the change's previous value.
pub fn verify_unchanged(node: &StrategyNode, change: &AdjustmentChange) -> DomainResult<()> {
    let holds = match change {
        AdjustmentChange::Step(step) => {
            step.estimated_duration_hours
                .is_none_or(|d| unchanged(node.estimated_duration_hours, &d))
                && step
                    .kpi_targets
                    .iter()
                    .all(|(name, value)| unchanged(node.kpi_targets.get(name).copied(), value))
                && step.risk_level.is_none_or(|(previous, _)| node.risk_level == previous)
        }
        AdjustmentChange::KpiTarget(kpi) => unchanged(node.kpi_targets.get(&kpi.metric_name).copied(), &kpi.change),
        AdjustmentChange::Timeline(timeline) => {
            unchanged(Some(node.duration_hours()), &timeline.estimated_duration_hours)
        }
        AdjustmentChange::Priority(priority) => unchanged(Some(f64::from(node.priority)), &priority.change),
        AdjustmentChange::Domain(_) | AdjustmentChange::Resource(_) => true,
    };

    if holds {
        Ok(())
    } else {
        Err(DomainError::ConcurrencyConflict {
            entity: "strategy_node".to_string(),
            id: node.id.to_string(),
        })
    }
}

/// Write a change's new values into its node. Only the fields named by the
/// change are touched, and only while they still hold the previous values.
pub fn apply_change(node: &mut StrategyNode, change: &AdjustmentChange) -> DomainResult<()> {
    verify_unchanged(node, change)?;

    match change {
        AdjustmentChange::Step(step) => {
            if let Some(duration) = step.estimated_duration_hours {
                node.estimated_duration_hours = Some(duration.new.max(0.0));
            }
            for (name, value) in &step.kpi_targets {
                node.kpi_targets.insert(name.clone(), value.new);
            }
            if let Some((_, risk)) = step.risk_level {
                node.risk_level = risk;
            }
        }
        AdjustmentChange::KpiTarget(kpi) => {
            node.kpi_targets.insert(kpi.metric_name.clone(), kpi.change.new);
        }
        AdjustmentChange::Timeline(timeline) => {
            let change = timeline.estimated_duration_hours;
            let new_hours = change.new.max(0.0);
            node.estimated_duration_hours = Some(new_hours);
            if let Some(due) = node.due_date {
                let delta_minutes = ((new_hours - change.previous) * 60.0).round() as i64;
                node.due_date = Some(due + Duration::minutes(delta_minutes));
            }
        }
        AdjustmentChange::Priority(priority) => {
            node.priority = priority.change.new.round().clamp(0.0, 100.0) as u8;
        }
        AdjustmentChange::Domain(_) | AdjustmentChange::Resource(_) => {}
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Trend and success-rate signals from performance records ordered oldest
/// first. Fewer than two records produce nothing.
pub fn historical_signals(records: &[PerformanceRecord], config: &AdjustmentConfig) -> Vec<Signal> {
    let usable: Vec<&PerformanceRecord> = records.iter().filter(|r| r.achievement_percent.is_finite()).collect();
    let n = usable.len();
    if n < 2 {
        return Vec::new();
    }

    let confidence = (n as f64 / 20.0 + 0.3).min(0.9);
    let values: Vec<f64> = usable.iter().map(|r| r.achievement_percent).collect();
    let window = TREND_SAMPLE.min(n);
    let oldest = mean(&values[..window]);
    let newest = mean(&values[n - window..]);

    let mut signals = Vec::new();
    if oldest > 0.0 {
        let change_percent = (newest - oldest) / oldest * 100.0;
        let data = json!({ "oldest_mean": oldest, "newest_mean": newest, "change_percent": change_percent });
        if change_percent > config.trend_threshold_percent {
            signals.push(
                Signal::new(SignalSource::Historical, 0.4, confidence, format!("Performance improving ({change_percent:+.1}%)"))
                    .with_data(data),
            );
        } else if change_percent < -config.trend_threshold_percent {
            signals.push(
                Signal::new(SignalSource::Historical, -0.4, confidence, format!("Performance declining ({change_percent:+.1}%)"))
                    .with_data(data),
            );
        }
    }

    let success_rate = usable.iter().filter(|r| r.on_track).count() as f64 / n as f64;
    let data = json!({ "success_rate": success_rate, "records": n });
    if success_rate > 0.7 {
        signals.push(
            Signal::new(SignalSource::Historical, 0.3, confidence, format!("High success rate ({:.0}%)", success_rate * 100.0))
                .with_data(data),
        );
    } else if success_rate < 0.4 {
        signals.push(
            Signal::new(SignalSource::Historical, -0.3, confidence, format!("Low success rate ({:.0}%)", success_rate * 100.0))
                .with_data(data),
        );
    }

    signals
}
