pub mod adjustment_engine;
pub mod domain_balance;
pub mod drift_detector;
pub mod engine;
pub mod refinement_loop;
pub mod strategy_graph;

pub use adjustment_engine::{AdjustmentRequest, ReinforcementAdjustmentEngine, SignalAggregate};
pub use domain_balance::{Allocations, DomainBalanceCoordinator};
pub use drift_detector::DriftDetector;
pub use engine::StrategyEngine;
pub use refinement_loop::RefinementLoopOrchestrator;
pub use strategy_graph::StrategyGraphService;
