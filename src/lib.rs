//! Stratagem - strategy graph and adaptive refinement engine
//!
//! Stratagem models a marketing plan as a typed dependency graph of
//! objectives, tactics and actions, watches metric observations and node
//! schedules for drift, scores how investment is balanced across strategic
//! domains and turns both into reinforcement adjustments that a human can
//! approve, apply and grade.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and repository ports
//! - **Service Layer** (`services`): graph algorithms, drift detection,
//!   balance scoring, adjustment generation and the refinement loop
//! - **Adapters** (`adapters`): SQLite implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use stratagem::adapters::sqlite::initialize_database;
//! use stratagem::services::StrategyEngine;
//! use stratagem::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let pool = initialize_database(&config.database).await?;
//!     let engine = StrategyEngine::new(pool, &config);
//!     let need = engine.refinement.check_refinement_needed(org_id, None).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DriftSeverity, DriftSignal, NodeStatus, NodeType, RefinementCycle, RefinementLoopResult,
    ReinforcementAdjustment, StrategyDomain, StrategyEdge, StrategyNode,
};
pub use domain::ports::{NodeFilter, StrategyGraphRepository};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    DomainBalanceCoordinator, DriftDetector, RefinementLoopOrchestrator, ReinforcementAdjustmentEngine,
    StrategyEngine, StrategyGraphService,
};
