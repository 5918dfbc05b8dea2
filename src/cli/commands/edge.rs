//! Strategy edge CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::id_resolver::Entity;
use crate::cli::output::{output, short_id, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{EdgeSpec, StrategyEdge};

#[derive(Args, Debug)]
pub struct EdgeArgs {
    #[command(subcommand)]
    pub command: EdgeCommands,
}

#[derive(Subcommand, Debug)]
pub enum EdgeCommands {
    /// Connect two nodes; SOURCE precedes TARGET
    Add {
        #[command(flatten)]
        org: OrgArg,
        /// Source node ID or unique prefix
        source: String,
        /// Target node ID or unique prefix
        target: String,
        /// Edge type (depends_on, enables, conflicts_with, reinforces, measures, blocks, parallel)
        #[arg(short = 't', long = "type", default_value = "depends_on")]
        edge_type: String,
        /// Edge weight
        #[arg(short, long)]
        weight: Option<f64>,
        /// Mark the edge as part of the critical schedule
        #[arg(long)]
        critical: bool,
    },
    /// Remove an edge
    Remove {
        /// Edge ID or unique prefix
        id: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct EdgeOutput {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: String,
    pub weight: f64,
    pub is_critical: bool,
}

impl From<&StrategyEdge> for EdgeOutput {
    fn from(edge: &StrategyEdge) -> Self {
        Self {
            id: edge.id.to_string(),
            source_id: edge.source_id.to_string(),
            target_id: edge.target_id.to_string(),
            edge_type: edge.edge_type.as_str().to_string(),
            weight: edge.weight,
            is_critical: edge.is_critical,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct EdgeActionOutput {
    pub success: bool,
    pub message: String,
    pub edge: Option<EdgeOutput>,
}

impl CommandOutput for EdgeActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: EdgeArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        EdgeCommands::Add {
            org,
            source,
            target,
            edge_type,
            weight,
            critical,
        } => {
            let source_id = ctx.resolve(Entity::Node, &source).await?;
            let target_id = ctx.resolve(Entity::Node, &target).await?;
            let edge = ctx
                .engine
                .graph
                .add_edge(EdgeSpec {
                    organization_id: org.organization_id,
                    source_id,
                    target_id,
                    edge_type,
                    weight,
                    is_critical: critical,
                })
                .await?;
            output(
                &EdgeActionOutput {
                    success: true,
                    message: format!(
                        "Edge created: {} -[{}]-> {} ({})",
                        short_id(&edge.source_id),
                        edge.edge_type.as_str(),
                        short_id(&edge.target_id),
                        short_id(&edge.id)
                    ),
                    edge: Some(EdgeOutput::from(&edge)),
                },
                json_mode,
            );
        }

        EdgeCommands::Remove { id } => {
            let id = ctx.resolve(Entity::Edge, &id).await?;
            ctx.engine.graph.remove_edge(id).await?;
            output(
                &EdgeActionOutput {
                    success: true,
                    message: format!("Edge {} removed", short_id(&id)),
                    edge: None,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
