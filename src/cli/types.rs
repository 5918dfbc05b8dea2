//! CLI type definitions
//!
//! Top-level clap structures. Each command group's arguments live next to
//! its implementation under `commands/`.

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use super::commands::{
    adjustment::AdjustmentArgs, balance::BalanceArgs, drift::DriftArgs, edge::EdgeArgs, graph::GraphArgs,
    init::InitArgs, metric::{AllocationArgs, MetricArgs, PerformanceArgs}, node::NodeArgs, refine::RefineArgs,
};

#[derive(Parser, Debug)]
#[command(name = "stratagem")]
#[command(about = "Stratagem - strategy graph and adaptive refinement engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Log at debug level regardless of configuration
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the project directory, configuration and database
    Init(InitArgs),

    /// Strategy node management
    Node(NodeArgs),

    /// Strategy edge management
    Edge(EdgeArgs),

    /// Inspect the strategy graph
    Graph(GraphArgs),

    /// Record metric observations
    Metric(MetricArgs),

    /// Record domain performance outcomes
    Performance(PerformanceArgs),

    /// Set explicit domain allocations
    Allocation(AllocationArgs),

    /// Run and inspect refinement cycles
    Refine(RefineArgs),

    /// Inspect and resolve drift signals
    Drift(DriftArgs),

    /// Domain balance snapshots
    Balance(BalanceArgs),

    /// Review reinforcement adjustments
    Adjustment(AdjustmentArgs),
}

/// Organization scope shared by most commands.
#[derive(Args, Debug, Clone, Copy)]
pub struct OrgArg {
    /// Organization ID
    #[arg(long = "org", env = "STRATAGEM_ORG")]
    pub organization_id: Uuid,
}
