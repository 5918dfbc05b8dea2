pub mod adjustment;
pub mod balance;
pub mod config;
pub mod drift;
pub mod performance;
pub mod refinement;
pub mod strategy;

pub use adjustment::{
    AdjustmentChange, AdjustmentFailure, AdjustmentFilter, AdjustmentSubject, AdjustmentTarget,
    AdjustmentType, DomainShift, KpiAdjustment, PriorityAdjustment, ReinforcementAdjustment,
    ResourceAdjustment, Signal, SignalSource, StepAdjustment, TimelineAdjustment, ValueChange,
};
pub use balance::{
    BalanceAnalysis, ConflictKind, DependencyConflict, DomainBalanceSnapshot, DomainDependency,
    DomainDependencyMatrix,
};
pub use config::{
    AdjustmentConfig, BalanceConfig, Config, DatabaseConfig, DriftConfig, LoggingConfig,
    RefinementConfig,
};
pub use drift::{
    DriftDirection, DriftReport, DriftSeverity, DriftSignal, DriftSignalFilter, MetricObservation,
};
pub use performance::PerformanceRecord;
pub use refinement::{
    CycleStatus, CycleType, RefinementCycle, RefinementLoopResult, RefinementNeed,
    RefinementRunConfig, Urgency,
};
pub use strategy::{
    CriticalPath, EdgeSpec, EdgeType, NodeSpec, NodeStatus, NodeType, RiskLevel, StrategyDomain,
    StrategyEdge, StrategyGraphView, StrategyNode, DEFAULT_DURATION_HOURS, DEFAULT_PRIORITY,
};
