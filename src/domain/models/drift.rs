//! Drift domain model: observations, signals and the per-cycle drift report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::strategy::StrategyDomain;

/// Direction of a deviation from the expected trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftDirection {
    Above,
    Below,
    Delayed,
    Accelerated,
}

impl DriftDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "ABOVE",
            Self::Below => "BELOW",
            Self::Delayed => "DELAYED",
            Self::Accelerated => "ACCELERATED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ABOVE" => Some(Self::Above),
            "BELOW" => Some(Self::Below),
            "DELAYED" => Some(Self::Delayed),
            "ACCELERATED" => Some(Self::Accelerated),
            _ => None,
        }
    }

    /// Timeline directions concern node schedules rather than metrics.
    pub fn is_timeline(&self) -> bool {
        matches!(self, Self::Delayed | Self::Accelerated)
    }
}

/// Severity bucket. Ordered so that `max()` yields the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Action priority: CRITICAL=1 ... LOW=4, lower is more urgent.
    pub fn action_priority(&self) -> u8 {
        match self {
            Self::Critical => 1,
            Self::High => 2,
            Self::Medium => 3,
            Self::Low => 4,
        }
    }

    /// Bucket a metric drift by its absolute percentage.
    pub fn from_drift_percent(drift_percent: f64) -> Self {
        let magnitude = drift_percent.abs();
        if magnitude > 30.0 {
            Self::Critical
        } else if magnitude > 20.0 {
            Self::High
        } else if magnitude > 10.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Bucket a schedule slip by days overdue.
    pub fn from_days_overdue(days: f64) -> Self {
        if days > 7.0 {
            Self::High
        } else if days > 3.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A single observed metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricObservation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub domain: StrategyDomain,
    pub metric_name: String,
    pub value: f64,
    pub target: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl MetricObservation {
    pub fn new(
        organization_id: Uuid,
        domain: StrategyDomain,
        metric_name: impl Into<String>,
        value: f64,
        target: Option<f64>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            domain,
            metric_name: metric_name.into(),
            value,
            target,
            observed_at,
        }
    }
}

/// A detected deviation from the expected trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub cycle_id: Option<Uuid>,
    pub domain: StrategyDomain,
    /// Metric name for metric drift; None for timeline drift
    pub metric_name: Option<String>,
    /// Node concerned by timeline drift
    pub node_id: Option<Uuid>,
    pub expected_value: f64,
    pub actual_value: f64,
    pub drift_percent: f64,
    pub direction: DriftDirection,
    pub severity: DriftSeverity,
    pub auto_correctable: bool,
    pub resolved: bool,
    pub sample_count: usize,
    pub recommended_action: String,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DriftSignal {
    pub fn resolve(&mut self) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
    }

    /// Days past the expected end for DELAYED signals, which record planned
    /// and elapsed schedule in days.
    pub fn days_overdue(&self) -> Option<f64> {
        (self.direction == DriftDirection::Delayed).then(|| (self.actual_value - self.expected_value).max(0.0))
    }
}

/// Filter criteria for listing drift signals.
#[derive(Debug, Clone, Default)]
pub struct DriftSignalFilter {
    pub cycle_id: Option<Uuid>,
    pub unresolved_only: bool,
    pub min_severity: Option<DriftSeverity>,
}

/// Output of one drift analysis pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftReport {
    pub signals: Vec<DriftSignal>,
    /// Maximum severity across all signals, None when no drift was found
    pub overall_severity: Option<DriftSeverity>,
    /// Most urgent recommended actions first
    pub recommended_actions: Vec<String>,
    /// Metric groups skipped for lack of samples
    pub insufficient_data_groups: usize,
}
