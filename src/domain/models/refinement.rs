//! Refinement cycle model.
//!
//! A cycle is one complete pass of drift analysis, balance analysis and
//! adjustment generation for an organization. Cycles are created
//! `InProgress` and always end in a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::adjustment::{AdjustmentFailure, ReinforcementAdjustment};
use super::balance::BalanceAnalysis;
use super::drift::DriftReport;

/// What triggered a refinement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleType {
    Scheduled,
    DriftTriggered,
    Manual,
    Performance,
}

impl Default for CycleType {
    fn default() -> Self {
        Self::Manual
    }
}

impl CycleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::DriftTriggered => "DRIFT_TRIGGERED",
            Self::Manual => "MANUAL",
            Self::Performance => "PERFORMANCE",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "SCHEDULED" => Some(Self::Scheduled),
            "DRIFT_TRIGGERED" => Some(Self::DriftTriggered),
            "MANUAL" => Some(Self::Manual),
            "PERFORMANCE" => Some(Self::Performance),
            _ => None,
        }
    }
}

/// Cycle lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Only an in-progress cycle may move, and only to a terminal status.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        matches!(self, Self::InProgress) && new_status.is_terminal()
    }
}

/// One run of the refinement loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementCycle {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub plan_id: Option<Uuid>,
    /// Monotonic per organization, never reused
    pub sequence_number: u64,
    pub cycle_type: CycleType,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub drift_signals_found: u32,
    pub adjustments_generated: u32,
    pub adjustments_applied: u32,
    pub confidence_before: Option<f64>,
    pub confidence_after: Option<f64>,
    pub improvement_percent: Option<f64>,
    pub summary: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl RefinementCycle {
    /// A fresh in-progress cycle. The sequence number is assigned by the store.
    pub fn new(organization_id: Uuid, plan_id: Option<Uuid>, cycle_type: CycleType) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            plan_id,
            sequence_number: 0,
            cycle_type,
            status: CycleStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            drift_signals_found: 0,
            adjustments_generated: 0,
            adjustments_applied: 0,
            confidence_before: None,
            confidence_after: None,
            improvement_percent: None,
            summary: None,
            error_message: None,
            recommendations: Vec::new(),
        }
    }

    fn transition(&mut self, status: CycleStatus, reason: &str) -> Result<(), String> {
        if !self.status.can_transition_to(status) {
            return Err(format!(
                "cannot move cycle from {} to {}: {}",
                self.status.as_str(),
                status.as_str(),
                reason
            ));
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, summary: impl Into<String>) -> Result<(), String> {
        self.transition(CycleStatus::Completed, "cycle already closed")?;
        self.summary = Some(summary.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), String> {
        self.transition(CycleStatus::Failed, "cycle already closed")?;
        self.error_message = Some(error.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), String> {
        self.transition(CycleStatus::Cancelled, "only in-progress cycles can be cancelled")
    }
}

/// Caller options for one refinement run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementRunConfig {
    pub cycle_type: CycleType,
    /// Auto-apply adjustments answering auto-correctable (LOW or MEDIUM) drift
    pub auto_apply_low_severity: bool,
    pub max_recommendations: usize,
}

impl Default for RefinementRunConfig {
    fn default() -> Self {
        Self {
            cycle_type: CycleType::Manual,
            auto_apply_low_severity: false,
            max_recommendations: 10,
        }
    }
}

/// Everything a finished refinement run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementLoopResult {
    pub cycle: RefinementCycle,
    pub drift: DriftReport,
    pub balance: BalanceAnalysis,
    pub adjustments: Vec<ReinforcementAdjustment>,
    pub application_failures: Vec<AdjustmentFailure>,
    pub recommendations: Vec<String>,
}

/// Urgency of an advisory refinement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Outcome of `check_refinement_needed`. Purely advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementNeed {
    pub needed: bool,
    pub reasons: Vec<String>,
    pub urgency: Urgency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_lifecycle() {
        let mut cycle = RefinementCycle::new(Uuid::new_v4(), None, CycleType::Scheduled);
        assert_eq!(cycle.status, CycleStatus::InProgress);

        cycle.complete("done").unwrap();
        assert_eq!(cycle.status, CycleStatus::Completed);
        assert!(cycle.completed_at.is_some());

        assert!(cycle.fail("late failure").is_err());
        assert!(cycle.cancel().is_err());
        assert_eq!(cycle.status, CycleStatus::Completed);
    }

    #[test]
    fn test_cycle_type_parsing() {
        assert_eq!(CycleType::from_str("drift-triggered"), Some(CycleType::DriftTriggered));
        assert_eq!(CycleType::from_str("manual"), Some(CycleType::Manual));
        assert!(CycleType::from_str("weekly").is_none());
    }

    #[test]
    fn test_status_transitions() {
        assert!(CycleStatus::InProgress.can_transition_to(CycleStatus::Failed));
        assert!(!CycleStatus::InProgress.can_transition_to(CycleStatus::InProgress));
        assert!(!CycleStatus::Failed.can_transition_to(CycleStatus::Completed));
    }
}
