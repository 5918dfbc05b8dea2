//! Port trait definitions (Hexagonal Architecture)
//!
//! Async repository traits the services depend on. The SQLite adapters in
//! `crate::adapters::sqlite` implement every one of them.

pub mod adjustment_repository;
pub mod balance_snapshot_repository;
pub mod drift_signal_repository;
pub mod metrics_repository;
pub mod refinement_cycle_repository;
pub mod strategy_graph_repository;

pub use adjustment_repository::AdjustmentRepository;
pub use balance_snapshot_repository::BalanceSnapshotRepository;
pub use drift_signal_repository::DriftSignalRepository;
pub use metrics_repository::MetricsRepository;
pub use refinement_cycle_repository::RefinementCycleRepository;
pub use strategy_graph_repository::{EdgeFilter, NodeFilter, StrategyGraphRepository};
