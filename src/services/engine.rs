//! Wires the SQLite repositories into the service graph.

use sqlx::SqlitePool;
use std::sync::Arc;

use super::adjustment_engine::ReinforcementAdjustmentEngine;
use super::domain_balance::DomainBalanceCoordinator;
use super::drift_detector::DriftDetector;
use super::refinement_loop::RefinementLoopOrchestrator;
use super::strategy_graph::StrategyGraphService;
use crate::adapters::sqlite::{
    SqliteAdjustmentRepository, SqliteBalanceSnapshotRepository, SqliteDriftSignalRepository,
    SqliteMetricsRepository, SqliteRefinementCycleRepository, SqliteStrategyGraphRepository,
};
use crate::domain::models::Config;
use crate::domain::ports::{
    AdjustmentRepository, BalanceSnapshotRepository, DriftSignalRepository, MetricsRepository,
    RefinementCycleRepository, StrategyGraphRepository,
};

/// Every service of the engine, sharing one set of repositories.
#[derive(Clone)]
pub struct StrategyEngine {
    pub graph: Arc<StrategyGraphService>,
    pub drift: Arc<DriftDetector>,
    pub balance: Arc<DomainBalanceCoordinator>,
    pub adjustments: Arc<ReinforcementAdjustmentEngine>,
    pub refinement: Arc<RefinementLoopOrchestrator>,
}

impl StrategyEngine {
    /// Build the services on top of a migrated pool.
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let graph_repo: Arc<dyn StrategyGraphRepository> = Arc::new(SqliteStrategyGraphRepository::new(pool.clone()));
        let metrics: Arc<dyn MetricsRepository> = Arc::new(SqliteMetricsRepository::new(pool.clone()));
        let signals: Arc<dyn DriftSignalRepository> = Arc::new(SqliteDriftSignalRepository::new(pool.clone()));
        let snapshots: Arc<dyn BalanceSnapshotRepository> = Arc::new(SqliteBalanceSnapshotRepository::new(pool.clone()));
        let adjustments: Arc<dyn AdjustmentRepository> = Arc::new(SqliteAdjustmentRepository::new(pool.clone()));
        let cycles: Arc<dyn RefinementCycleRepository> = Arc::new(SqliteRefinementCycleRepository::new(pool));

        let drift = Arc::new(DriftDetector::new(
            metrics.clone(),
            graph_repo.clone(),
            signals.clone(),
            config.drift.clone(),
        ));
        let balance = Arc::new(DomainBalanceCoordinator::new(
            metrics.clone(),
            graph_repo.clone(),
            snapshots,
            config.balance.clone(),
        ));
        let engine = Arc::new(ReinforcementAdjustmentEngine::new(
            adjustments,
            graph_repo.clone(),
            metrics,
            signals,
            config.adjustment.clone(),
        ));
        let refinement = Arc::new(RefinementLoopOrchestrator::new(
            graph_repo.clone(),
            cycles,
            drift.clone(),
            balance.clone(),
            engine.clone(),
            config.refinement.clone(),
        ));

        Self {
            graph: Arc::new(StrategyGraphService::new(graph_repo)),
            drift,
            balance,
            adjustments: engine,
            refinement,
        }
    }
}
