//! Domain balance model: dependency matrix, conflicts and immutable snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::strategy::StrategyDomain;

/// Directed, signed influence of one domain on another.
///
/// Positive strength: the target benefits from the source performing well.
/// Negative strength: heavy investment in the source tends to hurt the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainDependency {
    pub source: StrategyDomain,
    pub target: StrategyDomain,
    pub strength: f64,
}

impl DomainDependency {
    pub const fn new(source: StrategyDomain, target: StrategyDomain, strength: f64) -> Self {
        Self { source, target, strength }
    }
}

/// Immutable set of domain dependencies injected into the balance coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainDependencyMatrix {
    dependencies: Vec<DomainDependency>,
}

impl DomainDependencyMatrix {
    pub fn new(dependencies: Vec<DomainDependency>) -> Self {
        Self { dependencies }
    }

    pub fn dependencies(&self) -> &[DomainDependency] {
        &self.dependencies
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

impl Default for DomainDependencyMatrix {
    fn default() -> Self {
        use StrategyDomain::{Ads, Content, Cro, Email, Geo, Seo, Social};
        Self::new(vec![
            DomainDependency::new(Content, Seo, 0.8),
            DomainDependency::new(Seo, Geo, 0.6),
            DomainDependency::new(Content, Social, 0.7),
            DomainDependency::new(Social, Content, 0.4),
            DomainDependency::new(Cro, Ads, 0.6),
            DomainDependency::new(Content, Email, 0.5),
            DomainDependency::new(Email, Cro, 0.3),
            DomainDependency::new(Ads, Seo, -0.3),
            DomainDependency::new(Ads, Content, -0.2),
        ])
    }
}

/// Which side of a dependency is out of balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Negative dependency: heavy source investment while the target underperforms
    SourceOverallocated,
    /// Strong positive dependency: target over-allocated while its source underperforms
    TargetOverallocated,
}

/// A dependency whose endpoints are pulling against each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyConflict {
    pub source: StrategyDomain,
    pub target: StrategyDomain,
    pub strength: f64,
    pub kind: ConflictKind,
    pub description: String,
}

/// Immutable record of one balance analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainBalanceSnapshot {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub cycle_id: Option<Uuid>,
    /// Percent per domain, summing to roughly 100
    pub allocations: BTreeMap<StrategyDomain, f64>,
    /// 0-100 per domain
    pub performance_scores: BTreeMap<StrategyDomain, f64>,
    pub balance_score: f64,
    pub entropy: f64,
    pub gini: f64,
    pub over_optimized: Vec<StrategyDomain>,
    pub under_invested: Vec<StrategyDomain>,
    pub recommended_shifts: BTreeMap<StrategyDomain, f64>,
    pub conflicts: Vec<DependencyConflict>,
    /// Snapshot whose shifts were applied to produce this one
    pub supersedes: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl DomainBalanceSnapshot {
    /// Largest absolute recommended shift, 0 when there are none.
    pub fn max_abs_shift(&self) -> f64 {
        self.recommended_shifts
            .values()
            .fold(0.0_f64, |acc, s| acc.max(s.abs()))
    }
}

/// Result of a balance analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAnalysis {
    pub snapshot: DomainBalanceSnapshot,
    pub needs_rebalancing: bool,
}
