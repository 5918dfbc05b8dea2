//! Strategy graph domain model.
//!
//! A strategy is a directed graph of initiatives (objectives, tactics, actions,
//! metrics, milestones, constraints) owned by an organization. Edges point from
//! the prerequisite to the dependent: `source -> target` reads "source precedes
//! target", so a DEPENDS_ON edge means the target depends on the source.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Kind of strategy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Objective,
    Tactic,
    Action,
    Metric,
    Milestone,
    Constraint,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Objective => "OBJECTIVE",
            Self::Tactic => "TACTIC",
            Self::Action => "ACTION",
            Self::Metric => "METRIC",
            Self::Milestone => "MILESTONE",
            Self::Constraint => "CONSTRAINT",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OBJECTIVE" => Some(Self::Objective),
            "TACTIC" => Some(Self::Tactic),
            "ACTION" => Some(Self::Action),
            "METRIC" => Some(Self::Metric),
            "MILESTONE" => Some(Self::Milestone),
            "CONSTRAINT" => Some(Self::Constraint),
            _ => None,
        }
    }
}

/// Strategic domain competing for resource allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyDomain {
    Seo,
    Geo,
    Content,
    Ads,
    Cro,
    Social,
    Email,
}

impl StrategyDomain {
    /// Every domain, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Seo,
        Self::Geo,
        Self::Content,
        Self::Ads,
        Self::Cro,
        Self::Social,
        Self::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seo => "SEO",
            Self::Geo => "GEO",
            Self::Content => "CONTENT",
            Self::Ads => "ADS",
            Self::Cro => "CRO",
            Self::Social => "SOCIAL",
            Self::Email => "EMAIL",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SEO" => Some(Self::Seo),
            "GEO" => Some(Self::Geo),
            "CONTENT" => Some(Self::Content),
            "ADS" => Some(Self::Ads),
            "CRO" => Some(Self::Cro),
            "SOCIAL" => Some(Self::Social),
            "EMAIL" => Some(Self::Email),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk level of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl RiskLevel {
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

    /// One notch riskier, saturating at Critical.
    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// One notch safer, saturating at Low.
    pub fn lowered(self) -> Self {
        match self {
            Self::Low | Self::Medium => Self::Low,
            Self::High => Self::Medium,
            Self::Critical => Self::High,
        }
    }
}

/// Execution status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Planned,
    InProgress,
    Completed,
    Blocked,
    Cancelled,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Planned
    }
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Blocked => "BLOCKED",
            Self::Cancelled => "CANCELLED",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLANNED" => Some(Self::Planned),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "BLOCKED" => Some(Self::Blocked),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled nodes never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        !matches!(
            (self, new_status),
            (Self::Planned, Self::Planned)
                | (Self::InProgress, Self::InProgress)
                | (Self::Blocked, Self::Blocked)
        )
    }
}

/// A node in the strategy graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyNode {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Plan this node belongs to, if the organization runs several plans
    pub plan_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub node_type: NodeType,
    pub domain: StrategyDomain,
    /// 0-100, higher is more important
    pub priority: u8,
    pub risk_level: RiskLevel,
    pub status: NodeStatus,
    /// 0-100
    pub progress: u8,
    pub estimated_duration_hours: Option<f64>,
    pub actual_duration_hours: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// KPI name -> numeric target
    #[serde(default)]
    pub kpi_targets: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Version for optimistic locking
    pub version: u64,
}

pub const DEFAULT_PRIORITY: u8 = 50;

/// Processing time assumed for nodes without an estimate.
pub const DEFAULT_DURATION_HOURS: f64 = 1.0;

impl StrategyNode {
    pub fn new(
        organization_id: Uuid,
        name: impl Into<String>,
        node_type: NodeType,
        domain: StrategyDomain,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            plan_id: None,
            name: name.into(),
            description: String::new(),
            node_type,
            domain,
            priority: DEFAULT_PRIORITY,
            risk_level: RiskLevel::default(),
            status: NodeStatus::default(),
            progress: 0,
            estimated_duration_hours: None,
            actual_duration_hours: None,
            start_date: None,
            due_date: None,
            completed_at: None,
            kpi_targets: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn with_plan(mut self, plan_id: Uuid) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    pub fn with_duration(mut self, hours: f64) -> Self {
        self.estimated_duration_hours = Some(hours);
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_schedule(
        mut self,
        start_date: Option<DateTime<Utc>>,
        due_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.start_date = start_date;
        self.due_date = due_date;
        self
    }

    pub fn with_kpi_target(mut self, name: impl Into<String>, target: f64) -> Self {
        self.kpi_targets.insert(name.into(), target);
        self
    }

    /// Processing time used by critical-path scheduling.
    pub fn duration_hours(&self) -> f64 {
        self.estimated_duration_hours
            .filter(|h| h.is_finite() && *h >= 0.0)
            .unwrap_or(DEFAULT_DURATION_HOURS)
    }

    /// When this node is expected to finish: the due date, else start + estimate.
    pub fn expected_end(&self) -> Option<DateTime<Utc>> {
        if self.due_date.is_some() {
            return self.due_date;
        }
        let start = self.start_date?;
        let minutes = (self.duration_hours() * 60.0).round() as i64;
        Some(start + Duration::minutes(minutes))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Node name cannot be empty".to_string());
        }
        if self.priority > 100 {
            return Err(format!("Priority {} outside 0-100", self.priority));
        }
        if self.progress > 100 {
            return Err(format!("Progress {} outside 0-100", self.progress));
        }
        for (label, value) in [
            ("estimated_duration_hours", self.estimated_duration_hours),
            ("actual_duration_hours", self.actual_duration_hours),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(format!("{label} must be a non-negative number, got {v}"));
                }
            }
        }
        if let (Some(start), Some(due)) = (self.start_date, self.due_date) {
            if due < start {
                return Err("due_date precedes start_date".to_string());
            }
        }
        Ok(())
    }
}

/// Caller-supplied description of a node to create.
///
/// Enum-valued fields are strings so that bad input is reported as a
/// validation error instead of failing deserialization at the boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    pub organization_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub node_type: String,
    pub domain: String,
    pub priority: Option<u8>,
    pub risk_level: Option<String>,
    pub estimated_duration_hours: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kpi_targets: BTreeMap<String, f64>,
}

/// Relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    DependsOn,
    Enables,
    ConflictsWith,
    Reinforces,
    Measures,
    Blocks,
    Parallel,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "DEPENDS_ON",
            Self::Enables => "ENABLES",
            Self::ConflictsWith => "CONFLICTS_WITH",
            Self::Reinforces => "REINFORCES",
            Self::Measures => "MEASURES",
            Self::Blocks => "BLOCKS",
            Self::Parallel => "PARALLEL",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEPENDS_ON" => Some(Self::DependsOn),
            "ENABLES" => Some(Self::Enables),
            "CONFLICTS_WITH" => Some(Self::ConflictsWith),
            "REINFORCES" => Some(Self::Reinforces),
            "MEASURES" => Some(Self::Measures),
            "BLOCKS" => Some(Self::Blocks),
            "PARALLEL" => Some(Self::Parallel),
            _ => None,
        }
    }

    /// Edge kinds that define forward flow through the plan.
    pub fn is_flow(&self) -> bool {
        matches!(self, Self::DependsOn | Self::Enables)
    }
}

/// A directed edge between two strategy nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEdge {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub is_critical: bool,
    pub created_at: DateTime<Utc>,
}

impl StrategyEdge {
    pub fn new(organization_id: Uuid, source_id: Uuid, target_id: Uuid, edge_type: EdgeType) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            source_id,
            target_id,
            edge_type,
            weight: 1.0,
            is_critical: false,
            created_at: Utc::now(),
        }
    }

    pub fn critical(mut self) -> Self {
        self.is_critical = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Whether critical-path scheduling follows this edge.
    pub fn is_scheduling_edge(&self) -> bool {
        self.edge_type == EdgeType::DependsOn || self.is_critical
    }
}

/// Caller-supplied description of an edge to create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub organization_id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub edge_type: String,
    pub weight: Option<f64>,
    #[serde(default)]
    pub is_critical: bool,
}

/// Longest duration-weighted path through the scheduling DAG.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub node_ids: Vec<Uuid>,
    pub total_duration_hours: f64,
}

/// Full read model of an organization's strategy graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyGraphView {
    pub nodes: Vec<StrategyNode>,
    pub edges: Vec<StrategyEdge>,
    pub roots: Vec<Uuid>,
    pub paths: Vec<Vec<Uuid>>,
    pub paths_truncated: bool,
    pub critical_path: CriticalPath,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_defaults() {
        let node = StrategyNode::new(Uuid::new_v4(), "Grow organic", NodeType::Objective, StrategyDomain::Seo);
        assert_eq!(node.priority, 50);
        assert_eq!(node.risk_level, RiskLevel::Medium);
        assert_eq!(node.status, NodeStatus::Planned);
        assert!((node.duration_hours() - 1.0).abs() < f64::EPSILON);
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_enum_round_trip_strings() {
        for domain in StrategyDomain::ALL {
            assert_eq!(StrategyDomain::from_str(domain.as_str()), Some(domain));
        }
        assert_eq!(NodeType::from_str("tactic"), Some(NodeType::Tactic));
        assert_eq!(EdgeType::from_str("depends_on"), Some(EdgeType::DependsOn));
        assert_eq!(NodeStatus::from_str("IN_PROGRESS"), Some(NodeStatus::InProgress));
        assert!(EdgeType::from_str("LINKS").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let org = Uuid::new_v4();
        let mut node = StrategyNode::new(org, "  ", NodeType::Action, StrategyDomain::Ads);
        assert!(node.validate().is_err());

        node.name = "Launch".to_string();
        node.priority = 101;
        assert!(node.validate().is_err());

        node.priority = 10;
        node.estimated_duration_hours = Some(-2.0);
        assert!(node.validate().is_err());
    }

    #[test]
    fn test_expected_end_prefers_due_date() {
        let start = Utc::now() - Duration::days(10);
        let due = start + Duration::days(2);
        let node = StrategyNode::new(Uuid::new_v4(), "Ship", NodeType::Milestone, StrategyDomain::Content)
            .with_duration(48.0)
            .with_schedule(Some(start), Some(due));
        assert_eq!(node.expected_end(), Some(due));

        let no_due = node.clone().with_schedule(Some(start), None);
        assert_eq!(no_due.expected_end(), Some(start + Duration::hours(48)));
    }

    #[test]
    fn test_terminal_statuses_block_transitions() {
        assert!(NodeStatus::Planned.can_transition_to(NodeStatus::InProgress));
        assert!(NodeStatus::InProgress.can_transition_to(NodeStatus::Completed));
        assert!(!NodeStatus::Completed.can_transition_to(NodeStatus::InProgress));
        assert!(!NodeStatus::Cancelled.can_transition_to(NodeStatus::Planned));
    }

    #[test]
    fn test_risk_notches_saturate() {
        assert_eq!(RiskLevel::Critical.raised(), RiskLevel::Critical);
        assert_eq!(RiskLevel::Low.lowered(), RiskLevel::Low);
        assert_eq!(RiskLevel::Medium.raised(), RiskLevel::High);
    }
}
