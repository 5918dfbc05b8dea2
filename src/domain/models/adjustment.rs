//! Reinforcement adjustment model: signals, typed target changes and the
//! adjustment review lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::strategy::{RiskLevel, StrategyDomain};

/// Where a reinforcement signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSource {
    Execution,
    Feedback,
    Simulation,
    Historical,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execution => "EXECUTION",
            Self::Feedback => "FEEDBACK",
            Self::Simulation => "SIMULATION",
            Self::Historical => "HISTORICAL",
        }
    }
}

/// A weighted vote on how a plan element should change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: SignalSource,
    /// -1.0 (pull back hard) to 1.0 (push hard)
    pub strength: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub reason: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Signal {
    /// Build a signal, clamping strength and confidence into range.
    pub fn new(source: SignalSource, strength: f64, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            source,
            strength: clamp_finite(strength, -1.0, 1.0),
            confidence: clamp_finite(confidence, 0.0, 1.0),
            reason: reason.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Strength clamped to [-1, 1]; non-finite values count as 0.
    pub fn bounded_strength(&self) -> f64 {
        clamp_finite(self.strength, -1.0, 1.0)
    }

    /// Confidence clamped to [0, 1]; non-finite values count as 0.
    pub fn bounded_confidence(&self) -> f64 {
        clamp_finite(self.confidence, 0.0, 1.0)
    }
}

fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        0.0
    }
}

/// Kind of plan element an adjustment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentTarget {
    Step,
    Domain,
    KpiTarget,
    Timeline,
    Resource,
    Priority,
}

impl AdjustmentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Step => "STEP",
            Self::Domain => "DOMAIN",
            Self::KpiTarget => "KPI_TARGET",
            Self::Timeline => "TIMELINE",
            Self::Resource => "RESOURCE",
            Self::Priority => "PRIORITY",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STEP" => Some(Self::Step),
            "DOMAIN" => Some(Self::Domain),
            "KPI_TARGET" => Some(Self::KpiTarget),
            "TIMELINE" => Some(Self::Timeline),
            "RESOURCE" => Some(Self::Resource),
            "PRIORITY" => Some(Self::Priority),
            _ => None,
        }
    }
}

/// Direction of the recommended change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentType {
    Strengthen,
    Weaken,
    Maintain,
    Redirect,
    Pause,
    Accelerate,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strengthen => "STRENGTHEN",
            Self::Weaken => "WEAKEN",
            Self::Maintain => "MAINTAIN",
            Self::Redirect => "REDIRECT",
            Self::Pause => "PAUSE",
            Self::Accelerate => "ACCELERATE",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "STRENGTHEN" => Some(Self::Strengthen),
            "WEAKEN" => Some(Self::Weaken),
            "MAINTAIN" => Some(Self::Maintain),
            "REDIRECT" => Some(Self::Redirect),
            "PAUSE" => Some(Self::Pause),
            "ACCELERATE" => Some(Self::Accelerate),
            _ => None,
        }
    }

    /// Factor applied to numeric target values for a given magnitude (0-100).
    pub fn multiplier(&self, magnitude: f64) -> f64 {
        match self {
            Self::Strengthen | Self::Accelerate => 1.0 + magnitude / 100.0,
            Self::Weaken | Self::Pause => 1.0 - magnitude / 100.0,
            Self::Maintain | Self::Redirect => 1.0,
        }
    }

    /// Impact expected from an adjustment of this type before scaling.
    pub fn base_impact(&self) -> f64 {
        match self {
            Self::Strengthen => 20.0,
            Self::Accelerate => 15.0,
            Self::Maintain => 0.0,
            Self::Redirect => 10.0,
            Self::Weaken => -10.0,
            Self::Pause => -15.0,
        }
    }

    /// Risk level a step ends up with after this adjustment.
    pub fn adjust_risk(&self, risk: RiskLevel) -> RiskLevel {
        match self {
            Self::Weaken | Self::Pause => risk.raised(),
            Self::Strengthen => risk.lowered(),
            Self::Maintain | Self::Redirect | Self::Accelerate => risk,
        }
    }
}

/// A before/after pair for one numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub previous: f64,
    pub new: f64,
}

impl ValueChange {
    pub fn scaled(previous: f64, multiplier: f64) -> Self {
        Self { previous, new: previous * multiplier }
    }
}

/// Change to a plan step: its duration, every KPI target and its risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepAdjustment {
    pub node_id: Uuid,
    pub estimated_duration_hours: Option<ValueChange>,
    #[serde(default)]
    pub kpi_targets: BTreeMap<String, ValueChange>,
    pub risk_level: Option<(RiskLevel, RiskLevel)>,
}

/// Change to a single KPI target. `node_id` is None when no graph node
/// carries the metric; the adjustment is then advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiAdjustment {
    pub node_id: Option<Uuid>,
    pub metric_name: String,
    pub change: ValueChange,
}

/// Change to a node's schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineAdjustment {
    pub node_id: Uuid,
    pub estimated_duration_hours: ValueChange,
}

/// Change to a node's priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityAdjustment {
    pub node_id: Uuid,
    pub change: ValueChange,
}

/// Change to a domain's allocation percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainShift {
    pub domain: StrategyDomain,
    pub allocation_percent: ValueChange,
}

/// Change to a named resource budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAdjustment {
    pub resource: String,
    pub change: ValueChange,
}

/// Explicit per-target change. Only the listed fields are ever scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjustmentChange {
    Step(StepAdjustment),
    KpiTarget(KpiAdjustment),
    Timeline(TimelineAdjustment),
    Priority(PriorityAdjustment),
    Domain(DomainShift),
    Resource(ResourceAdjustment),
}

impl AdjustmentChange {
    pub fn target(&self) -> AdjustmentTarget {
        match self {
            Self::Step(_) => AdjustmentTarget::Step,
            Self::KpiTarget(_) => AdjustmentTarget::KpiTarget,
            Self::Timeline(_) => AdjustmentTarget::Timeline,
            Self::Priority(_) => AdjustmentTarget::Priority,
            Self::Domain(_) => AdjustmentTarget::Domain,
            Self::Resource(_) => AdjustmentTarget::Resource,
        }
    }

    /// Node mutated when this change is applied, if any.
    pub fn node_id(&self) -> Option<Uuid> {
        match self {
            Self::Step(s) => Some(s.node_id),
            Self::KpiTarget(k) => k.node_id,
            Self::Timeline(t) => Some(t.node_id),
            Self::Priority(p) => Some(p.node_id),
            Self::Domain(_) | Self::Resource(_) => None,
        }
    }

    /// Headline before/after pair, used for display and storage columns.
    pub fn headline(&self) -> Option<ValueChange> {
        match self {
            Self::Step(s) => s
                .estimated_duration_hours
                .or_else(|| s.kpi_targets.values().next().copied()),
            Self::KpiTarget(k) => Some(k.change),
            Self::Timeline(t) => Some(t.estimated_duration_hours),
            Self::Priority(p) => Some(p.change),
            Self::Domain(d) => Some(d.allocation_percent),
            Self::Resource(r) => Some(r.change),
        }
    }
}

/// What a caller wants adjusted, before signals have been aggregated.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentSubject {
    Step { node_id: Uuid },
    KpiTarget { node_id: Option<Uuid>, metric_name: String, current: f64 },
    Timeline { node_id: Uuid },
    Priority { node_id: Uuid },
    Domain { domain: StrategyDomain, allocation_percent: f64 },
    Resource { resource: String, current: f64 },
}

/// A recommended (and possibly applied) change derived from aggregated signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReinforcementAdjustment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub target: AdjustmentTarget,
    pub target_id: Option<Uuid>,
    pub adjustment_type: AdjustmentType,
    pub change: AdjustmentChange,
    /// 0-100
    pub magnitude: f64,
    /// 0-1
    pub confidence: f64,
    pub trigger_reason: String,
    pub supporting_evidence: Vec<Signal>,
    /// Drift signal this adjustment answers, resolved when applied
    pub drift_signal_id: Option<Uuid>,
    pub requires_approval: bool,
    /// None while pending review
    pub approved: Option<bool>,
    pub applied_at: Option<DateTime<Utc>>,
    pub expected_impact: f64,
    pub actual_impact: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version for optimistic locking
    pub version: u64,
}

impl ReinforcementAdjustment {
    pub fn is_pending(&self) -> bool {
        self.approved.is_none()
    }

    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Filter criteria for listing adjustments.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentFilter {
    pub cycle_id: Option<Uuid>,
    pub pending_only: bool,
    pub target: Option<AdjustmentTarget>,
}

/// An adjustment that could not be applied; the rest of the batch proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentFailure {
    pub adjustment_id: Uuid,
    pub error: String,
}
