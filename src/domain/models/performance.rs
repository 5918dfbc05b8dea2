//! Realized outcome records used to bias future recommendations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::strategy::StrategyDomain;

/// How a domain (optionally a specific adjustment) performed against plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub domain: StrategyDomain,
    pub metric_name: Option<String>,
    /// Adjustment whose outcome this records, if any
    pub adjustment_id: Option<Uuid>,
    /// Achieved value as a percentage of target
    pub achievement_percent: f64,
    pub on_track: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceRecord {
    pub fn new(
        organization_id: Uuid,
        domain: StrategyDomain,
        achievement_percent: f64,
        on_track: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            domain,
            metric_name: None,
            adjustment_id: None,
            achievement_percent,
            on_track,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_metric(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = Some(metric_name.into());
        self
    }

    pub fn with_adjustment(mut self, adjustment_id: Uuid) -> Self {
        self.adjustment_id = Some(adjustment_id);
        self
    }

    pub fn recorded(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }
}
