//! `stratagem graph show`: roots, paths and the critical path.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::collections::HashMap;
use uuid::Uuid;

use crate::cli::commands::edge::EdgeOutput;
use crate::cli::commands::node::NodeOutput;
use crate::cli::output::{list_table, output, short_id, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::services::strategy_graph::DEFAULT_MAX_PATHS;

#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(subcommand)]
    pub command: GraphCommands,
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Show the graph of an organization
    Show {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict to one plan
        #[arg(long)]
        plan: Option<Uuid>,
        /// Upper bound on enumerated root-to-leaf paths
        #[arg(long, default_value_t = DEFAULT_MAX_PATHS)]
        max_paths: usize,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct GraphOutput {
    pub nodes: Vec<NodeOutput>,
    pub edges: Vec<EdgeOutput>,
    pub roots: Vec<Uuid>,
    pub paths: Vec<Vec<Uuid>>,
    pub paths_truncated: bool,
    pub critical_path: Vec<Uuid>,
    pub critical_path_hours: f64,
    #[serde(skip)]
    names: HashMap<Uuid, String>,
}

impl GraphOutput {
    fn label(&self, id: &Uuid) -> String {
        self.names.get(id).cloned().unwrap_or_else(|| short_id(id))
    }
}

impl CommandOutput for GraphOutput {
    fn to_human(&self) -> String {
        if self.nodes.is_empty() {
            return "Graph is empty.".to_string();
        }

        let mut table = list_table(&["id", "name", "domain", "status", "hours"]);
        for node in &self.nodes {
            table.add_row(vec![
                node.id[..8].to_string(),
                node.name.clone(),
                node.domain.clone(),
                node.status.clone(),
                node.estimated_duration_hours.map_or_else(|| "-".to_string(), |h| format!("{h:.1}")),
            ]);
        }

        let mut lines = vec![
            format!("{} nodes, {} edges", self.nodes.len(), self.edges.len()),
            table.to_string(),
            format!(
                "\nRoots: {}",
                self.roots.iter().map(|id| self.label(id)).collect::<Vec<_>>().join(", ")
            ),
        ];

        if !self.critical_path.is_empty() {
            let chain: Vec<String> = self.critical_path.iter().map(|id| self.label(id)).collect();
            lines.push(format!(
                "Critical path ({:.1}h): {}",
                self.critical_path_hours,
                chain.join(" -> ")
            ));
        }

        lines.push(format!(
            "Paths: {}{}",
            self.paths.len(),
            if self.paths_truncated { " (truncated)" } else { "" }
        ));
        lines.join("\n")
    }
}

pub async fn execute(args: GraphArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        GraphCommands::Show { org, plan, max_paths } => {
            let view = ctx.engine.graph.get_graph(org.organization_id, plan, max_paths).await?;
            let out = GraphOutput {
                names: view.nodes.iter().map(|n| (n.id, n.name.clone())).collect(),
                nodes: view.nodes.iter().map(NodeOutput::from).collect(),
                edges: view.edges.iter().map(EdgeOutput::from).collect(),
                roots: view.roots,
                paths: view.paths,
                paths_truncated: view.paths_truncated,
                critical_path: view.critical_path.node_ids,
                critical_path_hours: view.critical_path.total_duration_hours,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
