//! Domain balance coordinator.
//!
//! Scores how evenly investment is spread across strategic domains, flags
//! domains with diminishing returns or untapped room, recommends small
//! allocation shifts and infers conflicts from the signed dependency matrix.
//! Every analysis is persisted as an immutable snapshot.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BalanceAnalysis, BalanceConfig, ConflictKind, DependencyConflict, DomainBalanceSnapshot,
    DomainDependencyMatrix, NodeStatus, PerformanceRecord, StrategyDomain,
};
use crate::domain::ports::{BalanceSnapshotRepository, MetricsRepository, NodeFilter, StrategyGraphRepository};

/// Performance assumed for a domain with no recorded outcomes.
pub const NEUTRAL_PERFORMANCE: f64 = 50.0;

pub type Allocations = BTreeMap<StrategyDomain, f64>;

pub struct DomainBalanceCoordinator {
    metrics: Arc<dyn MetricsRepository>,
    graph: Arc<dyn StrategyGraphRepository>,
    snapshots: Arc<dyn BalanceSnapshotRepository>,
    config: BalanceConfig,
}

impl DomainBalanceCoordinator {
    pub fn new(
        metrics: Arc<dyn MetricsRepository>,
        graph: Arc<dyn StrategyGraphRepository>,
        snapshots: Arc<dyn BalanceSnapshotRepository>,
        config: BalanceConfig,
    ) -> Self {
        Self {
            metrics,
            graph,
            snapshots,
            config,
        }
    }

    pub fn dependencies(&self) -> &DomainDependencyMatrix {
        &self.config.dependencies
    }

    /// Derive current allocations and performance for an organization, then analyze them.
    #[instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn analyze(
        &self,
        organization_id: Uuid,
        plan_id: Option<Uuid>,
        cycle_id: Option<Uuid>,
    ) -> DomainResult<BalanceAnalysis> {
        let allocations = self.current_allocations(organization_id, plan_id).await?;
        let performance = self.current_performance(organization_id, &allocations).await?;
        self.analyze_allocations(organization_id, cycle_id, allocations, performance)
            .await
    }

    /// Analysis of the current state without recording a snapshot.
    pub async fn preview(&self, organization_id: Uuid, plan_id: Option<Uuid>) -> DomainResult<BalanceAnalysis> {
        let allocations = self.current_allocations(organization_id, plan_id).await?;
        let performance = self.current_performance(organization_id, &allocations).await?;
        let snapshot = compute_snapshot(organization_id, None, allocations, performance, &self.config.dependencies);
        let needs_rebalancing = needs_rebalancing(&snapshot, self.config.rebalance_shift_threshold);
        Ok(BalanceAnalysis {
            snapshot,
            needs_rebalancing,
        })
    }

    /// Analyze caller-supplied allocations and performance scores.
    pub async fn analyze_allocations(
        &self,
        organization_id: Uuid,
        cycle_id: Option<Uuid>,
        allocations: Allocations,
        performance: Allocations,
    ) -> DomainResult<BalanceAnalysis> {
        let snapshot = compute_snapshot(organization_id, cycle_id, allocations, performance, &self.config.dependencies);
        self.persist(snapshot).await
    }

    async fn persist(&self, snapshot: DomainBalanceSnapshot) -> DomainResult<BalanceAnalysis> {
        self.snapshots.create(&snapshot).await?;
        let needs_rebalancing = needs_rebalancing(&snapshot, self.config.rebalance_shift_threshold);

        info!(
            snapshot_id = %snapshot.id,
            balance_score = snapshot.balance_score,
            over_optimized = snapshot.over_optimized.len(),
            conflicts = snapshot.conflicts.len(),
            needs_rebalancing,
            "Domain balance analyzed"
        );
        Ok(BalanceAnalysis {
            snapshot,
            needs_rebalancing,
        })
    }

    pub fn needs_rebalancing(&self, snapshot: &DomainBalanceSnapshot) -> bool {
        needs_rebalancing(snapshot, self.config.rebalance_shift_threshold)
    }

    pub async fn latest_snapshot(&self, organization_id: Uuid) -> DomainResult<Option<DomainBalanceSnapshot>> {
        self.snapshots.latest(organization_id).await
    }

    pub async fn list_snapshots(&self, organization_id: Uuid, limit: usize) -> DomainResult<Vec<DomainBalanceSnapshot>> {
        self.snapshots.list(organization_id, limit).await
    }

    /// Store a realized outcome for a domain.
    pub async fn record_performance(&self, record: PerformanceRecord) -> DomainResult<PerformanceRecord> {
        if !record.achievement_percent.is_finite() || record.achievement_percent < 0.0 {
            return Err(DomainError::ValidationFailed(format!(
                "Achievement percent must be a non-negative number, got {}",
                record.achievement_percent
            )));
        }
        self.metrics.record_performance(&record).await?;
        Ok(record)
    }

    /// Replace the explicit allocations, normalized to sum to 100.
    #[instrument(skip(self, allocations), fields(domains = allocations.len()))]
    pub async fn set_domain_allocations(&self, organization_id: Uuid, allocations: Allocations) -> DomainResult<Allocations> {
        if let Some((domain, value)) = allocations.iter().find(|(_, v)| !v.is_finite() || **v < 0.0) {
            return Err(DomainError::ValidationFailed(format!(
                "Allocation for {} must be a non-negative number, got {value}",
                domain.as_str()
            )));
        }
        let normalized = normalize(allocations);
        if normalized.is_empty() {
            return Err(DomainError::ValidationFailed(
                "At least one domain needs a positive allocation".to_string(),
            ));
        }
        self.metrics.set_domain_allocations(organization_id, &normalized).await?;
        info!(organization_id = %organization_id, "Domain allocations updated");
        Ok(normalized)
    }

    /// Explicit allocations when set, else each domain's share of estimated
    /// hours across non-cancelled nodes. Domains with performance records
    /// but no hours are kept at 0.
    pub async fn current_allocations(&self, organization_id: Uuid, plan_id: Option<Uuid>) -> DomainResult<Allocations> {
        let explicit = self.metrics.get_domain_allocations(organization_id).await?;
        if !explicit.is_empty() {
            return Ok(explicit);
        }

        let nodes = self
            .graph
            .list_nodes(NodeFilter::for_organization(organization_id).in_plan(plan_id))
            .await?;

        let mut hours: Allocations = BTreeMap::new();
        for node in nodes.iter().filter(|n| n.status != NodeStatus::Cancelled) {
            *hours.entry(node.domain).or_insert(0.0) += node.duration_hours();
        }
        for domain in self.metrics.performance_domains(organization_id).await? {
            hours.entry(domain).or_insert(0.0);
        }
        Ok(normalize(hours))
    }

    /// Mean achievement percent per domain over each domain's own recent
    /// performance records. Allocated domains without records score neutral.
    pub async fn current_performance(&self, organization_id: Uuid, allocations: &Allocations) -> DomainResult<Allocations> {
        let mut domains: Vec<StrategyDomain> = allocations.keys().copied().collect();
        for domain in self.metrics.performance_domains(organization_id).await? {
            if !domains.contains(&domain) {
                domains.push(domain);
            }
        }

        let mut performance = Allocations::new();
        for domain in domains {
            let records = self
                .metrics
                .list_performance(organization_id, Some(domain), self.config.performance_window)
                .await?;
            let values: Vec<f64> = records
                .iter()
                .map(|r| r.achievement_percent)
                .filter(|v| v.is_finite())
                .collect();
            let score = if values.is_empty() {
                NEUTRAL_PERFORMANCE
            } else {
                (values.iter().sum::<f64>() / values.len() as f64).clamp(0.0, 100.0)
            };
            performance.insert(domain, score);
        }
        Ok(performance)
    }

    /// Apply a snapshot's recommended shifts: the shifted allocations are
    /// renormalized to 100, stored as the explicit allocations and analyzed
    /// into a new snapshot that supersedes the source.
    #[instrument(skip(self))]
    pub async fn apply_shifts(&self, snapshot_id: Uuid) -> DomainResult<BalanceAnalysis> {
        let source = self
            .snapshots
            .get(snapshot_id)
            .await?
            .ok_or(DomainError::SnapshotNotFound(snapshot_id))?;

        let mut shifted = source.allocations.clone();
        for (domain, shift) in &source.recommended_shifts {
            let value = shifted.entry(*domain).or_insert(0.0);
            *value = (*value + shift).max(0.0);
        }
        let shifted = normalize(shifted);
        if shifted.is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "Snapshot {snapshot_id} has no allocation left to rebalance"
            )));
        }

        self.metrics
            .set_domain_allocations(source.organization_id, &shifted)
            .await?;

        let mut performance = source.performance_scores.clone();
        for domain in shifted.keys() {
            performance.entry(*domain).or_insert(NEUTRAL_PERFORMANCE);
        }
        let mut snapshot = compute_snapshot(
            source.organization_id,
            None,
            shifted,
            performance,
            &self.config.dependencies,
        );
        snapshot.supersedes = Some(source.id);
        self.persist(snapshot).await
    }
}

/// Scale values so they sum to 100. Zero entries are kept at 0; negative or
/// non-finite entries are dropped. Empty or all-zero input yields an empty map.
pub fn normalize(values: Allocations) -> Allocations {
    let total: f64 = values.values().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    values
        .into_iter()
        .filter(|(_, v)| v.is_finite() && *v >= 0.0)
        .map(|(d, v)| (d, v / total * 100.0))
        .collect()
}

/// Shannon entropy of the allocation shares in bits, normalized by
/// `log2(domain_count)`. Fewer than two domains have no spread and score 0.
pub fn normalized_entropy(allocations: &Allocations) -> f64 {
    let n = allocations.len();
    let total: f64 = allocations.values().map(|v| v.max(0.0)).sum();
    if n < 2 || total <= 0.0 {
        return 0.0;
    }

    let entropy: f64 = allocations
        .values()
        .map(|v| v.max(0.0) / total)
        .filter(|p| *p > 0.0)
        .map(|p| -p * p.log2())
        .sum();
    (entropy / (n as f64).log2()).clamp(0.0, 1.0)
}

/// Gini coefficient of the allocations: 0 equal, approaching 1 when one
/// domain holds everything.
pub fn gini_coefficient(allocations: &Allocations) -> f64 {
    let mut values: Vec<f64> = allocations.values().map(|v| v.max(0.0)).collect();
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n == 0 || total <= 0.0 {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);

    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (2.0 * (i as f64 + 1.0) - n as f64 - 1.0) * v)
        .sum();
    (weighted / (n as f64 * total)).clamp(0.0, 1.0)
}

fn performance_of(performance: &Allocations, domain: StrategyDomain) -> f64 {
    performance.get(&domain).copied().unwrap_or(NEUTRAL_PERFORMANCE)
}

/// -10 per heavily funded underperformer, +5 per moderately funded performer.
pub fn alignment_adjustment(allocations: &Allocations, performance: &Allocations) -> f64 {
    allocations
        .iter()
        .map(|(domain, alloc)| {
            let perf = performance_of(performance, *domain);
            if *alloc > 25.0 && perf < 50.0 {
                -10.0
            } else if (15.0..=25.0).contains(alloc) && perf >= 60.0 {
                5.0
            } else {
                0.0
            }
        })
        .sum()
}

pub fn balance_score(entropy: f64, gini: f64, alignment: f64) -> f64 {
    (entropy * 50.0 + (1.0 - gini) * 30.0 + alignment + 20.0).clamp(0.0, 100.0)
}

/// Recommended allocation change for one domain, in percentage points.
pub fn recommended_shift(allocation: f64, performance: f64) -> f64 {
    if allocation > 20.0 && performance < 50.0 {
        -((allocation - 20.0) * 0.5).min(5.0)
    } else if allocation < 20.0 && performance >= 70.0 {
        ((20.0 - allocation) * 0.5).min(5.0)
    } else if performance < 40.0 {
        2.0
    } else {
        0.0
    }
}

pub fn detect_conflicts(
    allocations: &Allocations,
    performance: &Allocations,
    matrix: &DomainDependencyMatrix,
) -> Vec<DependencyConflict> {
    let alloc_of = |d: StrategyDomain| allocations.get(&d).copied().unwrap_or(0.0);

    matrix
        .dependencies()
        .iter()
        .filter_map(|dep| {
            let source_alloc = alloc_of(dep.source);
            let target_alloc = alloc_of(dep.target);
            let source_perf = performance_of(performance, dep.source);
            let target_perf = performance_of(performance, dep.target);

            if dep.strength < 0.0 && source_alloc > 30.0 && target_perf < 50.0 {
                Some(DependencyConflict {
                    source: dep.source,
                    target: dep.target,
                    strength: dep.strength,
                    kind: ConflictKind::SourceOverallocated,
                    description: format!(
                        "High {} allocation ({source_alloc:.0}%) may be hurting {} (performance {target_perf:.0})",
                        dep.source, dep.target
                    ),
                })
            } else if dep.strength > 0.5 && source_perf < 50.0 && target_alloc > 25.0 {
                Some(DependencyConflict {
                    source: dep.source,
                    target: dep.target,
                    strength: dep.strength,
                    kind: ConflictKind::TargetOverallocated,
                    description: format!(
                        "{} is over-allocated ({target_alloc:.0}%) but depends on underperforming {} (performance {source_perf:.0})",
                        dep.target, dep.source
                    ),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Full balance analysis of one allocation state.
pub fn compute_snapshot(
    organization_id: Uuid,
    cycle_id: Option<Uuid>,
    allocations: Allocations,
    performance: Allocations,
    matrix: &DomainDependencyMatrix,
) -> DomainBalanceSnapshot {
    let entropy = normalized_entropy(&allocations);
    let gini = gini_coefficient(&allocations);
    let score = balance_score(entropy, gini, alignment_adjustment(&allocations, &performance));

    let mut over_optimized = Vec::new();
    let mut under_invested = Vec::new();
    let mut recommended_shifts = BTreeMap::new();
    for (domain, alloc) in &allocations {
        let perf = performance_of(&performance, *domain);
        if *alloc > 30.0 && perf < 60.0 {
            over_optimized.push(*domain);
        }
        if *alloc < 15.0 && perf >= 50.0 {
            under_invested.push(*domain);
        }
        let shift = recommended_shift(*alloc, perf);
        if shift != 0.0 {
            recommended_shifts.insert(*domain, shift);
        }
    }

    let conflicts = detect_conflicts(&allocations, &performance, matrix);

    DomainBalanceSnapshot {
        id: Uuid::new_v4(),
        organization_id,
        cycle_id,
        allocations,
        performance_scores: performance,
        balance_score: score,
        entropy,
        gini,
        over_optimized,
        under_invested,
        recommended_shifts,
        conflicts,
        supersedes: None,
        created_at: Utc::now(),
    }
}

pub fn needs_rebalancing(snapshot: &DomainBalanceSnapshot, shift_threshold: f64) -> bool {
    snapshot.max_abs_shift() > shift_threshold || !snapshot.over_optimized.is_empty() || !snapshot.conflicts.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteBalanceSnapshotRepository, SqliteMetricsRepository,
        SqliteStrategyGraphRepository,
    };
    use crate::domain::models::{NodeType, StrategyNode};
    use StrategyDomain::{Ads, Content, Cro, Geo, Seo};

    fn map(entries: &[(StrategyDomain, f64)]) -> Allocations {
        entries.iter().copied().collect()
    }

    async fn setup() -> (DomainBalanceCoordinator, Arc<SqliteMetricsRepository>, Arc<SqliteStrategyGraphRepository>) {
        setup_with(BalanceConfig::default()).await
    }

    async fn setup_with(
        config: BalanceConfig,
    ) -> (DomainBalanceCoordinator, Arc<SqliteMetricsRepository>, Arc<SqliteStrategyGraphRepository>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let metrics = Arc::new(SqliteMetricsRepository::new(pool.clone()));
        let graph = Arc::new(SqliteStrategyGraphRepository::new(pool.clone()));
        let snapshots = Arc::new(SqliteBalanceSnapshotRepository::new(pool));
        let coordinator = DomainBalanceCoordinator::new(metrics.clone(), graph.clone(), snapshots, config);
        (coordinator, metrics, graph)
    }

    #[test]
    fn test_even_allocation_scores_full_marks() {
        let allocations = map(&[(Seo, 20.0), (Geo, 20.0), (Content, 20.0), (Ads, 20.0), (Cro, 20.0)]);
        let performance = map(&[(Seo, 70.0), (Geo, 70.0), (Content, 70.0), (Ads, 70.0), (Cro, 70.0)]);

        assert!((normalized_entropy(&allocations) - 1.0).abs() < 1e-9);
        assert!(gini_coefficient(&allocations).abs() < 1e-9);

        let snapshot = compute_snapshot(Uuid::new_v4(), None, allocations, performance, &DomainDependencyMatrix::default());
        assert_eq!(snapshot.balance_score, 100.0);
        assert!(snapshot.over_optimized.is_empty());
        assert!(snapshot.under_invested.is_empty());
    }

    #[test]
    fn test_concentrated_seo_is_over_optimized() {
        let allocations = map(&[(Seo, 40.0), (Geo, 15.0), (Content, 15.0), (Ads, 15.0), (Cro, 15.0)]);
        let performance = map(&[(Seo, 45.0), (Geo, 70.0), (Content, 70.0), (Ads, 70.0), (Cro, 70.0)]);

        let snapshot = compute_snapshot(Uuid::new_v4(), None, allocations, performance, &DomainDependencyMatrix::default());
        assert_eq!(snapshot.over_optimized, vec![Seo]);
        assert!(snapshot.under_invested.is_empty());
        assert_eq!(snapshot.recommended_shifts.get(&Seo), Some(&-5.0));
        assert!(needs_rebalancing(&snapshot, 15.0));
    }

    #[test]
    fn test_gini_grows_with_inequality() {
        let mild = map(&[(Seo, 40.0), (Ads, 60.0)]);
        let harsh = map(&[(Seo, 10.0), (Ads, 90.0)]);
        assert!(gini_coefficient(&harsh) > gini_coefficient(&mild));
        assert_eq!(gini_coefficient(&BTreeMap::new()), 0.0);
        assert_eq!(normalized_entropy(&map(&[(Seo, 100.0)])), 0.0);
    }

    #[test]
    fn test_zero_allocation_counts_toward_concentration() {
        let allocations = normalize(map(&[(Seo, 100.0), (Content, 0.0)]));
        assert_eq!(allocations.get(&Content), Some(&0.0));

        let snapshot = compute_snapshot(
            Uuid::new_v4(),
            None,
            allocations,
            BTreeMap::new(),
            &DomainDependencyMatrix::new(vec![]),
        );
        assert!((snapshot.gini - 0.5).abs() < 1e-9);
        assert_eq!(snapshot.entropy, 0.0);
        assert!(snapshot.balance_score < 50.0);
        assert_eq!(snapshot.under_invested, vec![Content]);
        assert_eq!(snapshot.recommended_shifts.get(&Content), None);
    }

    #[test]
    fn test_shift_rules() {
        assert_eq!(recommended_shift(40.0, 30.0), -5.0);
        assert_eq!(recommended_shift(24.0, 45.0), -2.0);
        assert_eq!(recommended_shift(10.0, 80.0), 5.0);
        assert_eq!(recommended_shift(18.0, 75.0), 1.0);
        assert_eq!(recommended_shift(15.0, 35.0), 2.0);
        assert_eq!(recommended_shift(20.0, 55.0), 0.0);
    }

    #[test]
    fn test_conflicts_from_dependency_matrix() {
        // ADS -> SEO is negative; CONTENT -> SEO is strongly positive
        let allocations = map(&[(Ads, 45.0), (Seo, 30.0), (Content, 25.0)]);
        let performance = map(&[(Ads, 70.0), (Seo, 40.0), (Content, 30.0)]);

        let conflicts = detect_conflicts(&allocations, &performance, &DomainDependencyMatrix::default());
        assert!(conflicts
            .iter()
            .any(|c| c.source == Ads && c.target == Seo && c.kind == ConflictKind::SourceOverallocated));
        assert!(conflicts
            .iter()
            .any(|c| c.source == Content && c.target == Seo && c.kind == ConflictKind::TargetOverallocated));

        assert!(detect_conflicts(&allocations, &performance, &DomainDependencyMatrix::new(vec![])).is_empty());
    }

    #[tokio::test]
    async fn test_analysis_derives_from_nodes_and_persists() {
        let (coordinator, metrics, graph) = setup().await;
        let org = Uuid::new_v4();

        for (domain, hours) in [(Seo, 30.0), (Content, 10.0)] {
            let node = StrategyNode::new(org, format!("{domain} work"), NodeType::Action, domain).with_duration(hours);
            graph.create_node(&node).await.unwrap();
        }
        let cancelled = StrategyNode::new(org, "dropped", NodeType::Action, Ads)
            .with_duration(100.0)
            .with_status(NodeStatus::Cancelled);
        graph.create_node(&cancelled).await.unwrap();
        metrics
            .record_performance(&PerformanceRecord::new(org, Seo, 40.0, false))
            .await
            .unwrap();

        let analysis = coordinator.analyze(org, None, None).await.unwrap();
        let snapshot = &analysis.snapshot;
        assert_eq!(snapshot.allocations.get(&Seo), Some(&75.0));
        assert_eq!(snapshot.allocations.get(&Content), Some(&25.0));
        assert!(!snapshot.allocations.contains_key(&Ads));
        assert_eq!(snapshot.performance_scores.get(&Seo), Some(&40.0));
        assert_eq!(snapshot.performance_scores.get(&Content), Some(&NEUTRAL_PERFORMANCE));
        assert!(analysis.needs_rebalancing);

        let latest = coordinator.latest_snapshot(org).await.unwrap().unwrap();
        assert_eq!(latest.id, snapshot.id);
    }

    #[tokio::test]
    async fn test_apply_shifts_supersedes_and_stores_allocations() {
        let (coordinator, metrics, _) = setup().await;
        let org = Uuid::new_v4();

        let allocations = map(&[(Seo, 40.0), (Geo, 15.0), (Content, 15.0), (Ads, 15.0), (Cro, 15.0)]);
        let performance = map(&[(Seo, 45.0), (Geo, 70.0), (Content, 70.0), (Ads, 70.0), (Cro, 70.0)]);
        let first = coordinator
            .analyze_allocations(org, None, allocations, performance)
            .await
            .unwrap();

        let second = coordinator.apply_shifts(first.snapshot.id).await.unwrap();
        assert_eq!(second.snapshot.supersedes, Some(first.snapshot.id));
        let total: f64 = second.snapshot.allocations.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!(second.snapshot.allocations[&Seo] < 40.0);

        let stored = metrics.get_domain_allocations(org).await.unwrap();
        assert_eq!(stored.len(), 5);

        // The source snapshot is untouched
        let history = coordinator.list_snapshots(org, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().any(|s| s.id == first.snapshot.id && s.supersedes.is_none()));

        assert!(matches!(
            coordinator.apply_shifts(Uuid::new_v4()).await.unwrap_err(),
            DomainError::SnapshotNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_defunded_domain_stays_in_snapshot() {
        let (coordinator, metrics, _) = setup().await;
        let org = Uuid::new_v4();

        let stored = coordinator
            .set_domain_allocations(org, map(&[(Seo, 90.0), (Content, 10.0), (Ads, 0.0)]))
            .await
            .unwrap();
        assert_eq!(stored.get(&Ads), Some(&0.0));
        assert_eq!(metrics.get_domain_allocations(org).await.unwrap(), stored);

        coordinator
            .record_performance(PerformanceRecord::new(org, Ads, 85.0, true))
            .await
            .unwrap();
        let analysis = coordinator.analyze(org, None, None).await.unwrap();
        let snapshot = &analysis.snapshot;
        assert_eq!(snapshot.allocations.get(&Ads), Some(&0.0));
        assert!(snapshot.under_invested.contains(&Ads));
        assert!(snapshot.under_invested.contains(&Content));
        assert_eq!(snapshot.recommended_shifts.get(&Ads), Some(&5.0));

        let shifted = coordinator.apply_shifts(snapshot.id).await.unwrap();
        assert!(shifted.snapshot.allocations[&Ads] > 0.0);
    }

    #[tokio::test]
    async fn test_derived_allocations_include_domains_with_outcomes_only() {
        let (coordinator, _, graph) = setup().await;
        let org = Uuid::new_v4();

        let node = StrategyNode::new(org, "Technical audit", NodeType::Action, Seo).with_duration(20.0);
        graph.create_node(&node).await.unwrap();
        coordinator
            .record_performance(PerformanceRecord::new(org, Cro, 80.0, true))
            .await
            .unwrap();

        let allocations = coordinator.current_allocations(org, None).await.unwrap();
        assert_eq!(allocations.get(&Seo), Some(&100.0));
        assert_eq!(allocations.get(&Cro), Some(&0.0));

        let analysis = coordinator.analyze(org, None, None).await.unwrap();
        assert!(analysis.snapshot.under_invested.contains(&Cro));
        assert_eq!(analysis.snapshot.performance_scores.get(&Cro), Some(&80.0));
    }

    #[tokio::test]
    async fn test_busy_domain_does_not_crowd_out_others() {
        let (coordinator, _, _) = setup_with(BalanceConfig {
            performance_window: 3,
            ..Default::default()
        })
        .await;
        let org = Uuid::new_v4();

        coordinator
            .record_performance(PerformanceRecord::new(org, Content, 90.0, true))
            .await
            .unwrap();
        for pct in [30.0, 35.0, 40.0, 45.0, 50.0] {
            coordinator
                .record_performance(PerformanceRecord::new(org, Seo, pct, false))
                .await
                .unwrap();
        }

        let performance = coordinator
            .current_performance(org, &map(&[(Seo, 50.0), (Content, 50.0), (Geo, 0.0)]))
            .await
            .unwrap();
        assert_eq!(performance.get(&Content), Some(&90.0));
        assert_eq!(performance.get(&Seo), Some(&45.0));
        assert_eq!(performance.get(&Geo), Some(&NEUTRAL_PERFORMANCE));
    }

    #[tokio::test]
    async fn test_set_allocations_normalizes_and_validates() {
        let (coordinator, metrics, _) = setup().await;
        let org = Uuid::new_v4();

        let stored = coordinator
            .set_domain_allocations(org, map(&[(Seo, 3.0), (Content, 1.0)]))
            .await
            .unwrap();
        assert_eq!(stored[&Seo], 75.0);
        assert_eq!(metrics.get_domain_allocations(org).await.unwrap(), stored);

        assert!(matches!(
            coordinator.set_domain_allocations(org, map(&[(Seo, -1.0)])).await.unwrap_err(),
            DomainError::ValidationFailed(_)
        ));
        assert!(matches!(
            coordinator.set_domain_allocations(org, map(&[(Seo, 0.0)])).await.unwrap_err(),
            DomainError::ValidationFailed(_)
        ));
        assert!(coordinator
            .record_performance(PerformanceRecord::new(org, Seo, f64::NAN, false))
            .await
            .is_err());
    }
}
