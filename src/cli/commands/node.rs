//! Strategy node CLI commands.

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{NodeSpec, NodeStatus, NodeType, StrategyDomain, StrategyNode};
use crate::domain::ports::NodeFilter;

#[derive(Args, Debug)]
pub struct NodeArgs {
    #[command(subcommand)]
    pub command: NodeCommands,
}

#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Create a strategy node
    Add {
        #[command(flatten)]
        org: OrgArg,
        /// Node name
        name: String,
        /// Node type (objective, tactic, action, metric, milestone, constraint)
        #[arg(short = 't', long = "type", default_value = "action")]
        node_type: String,
        /// Strategic domain (seo, geo, content, ads, cro, social, email)
        #[arg(short, long)]
        domain: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Plan the node belongs to
        #[arg(long)]
        plan: Option<Uuid>,
        /// Priority 0-100
        #[arg(short, long)]
        priority: Option<u8>,
        /// Risk level (low, medium, high, critical)
        #[arg(long)]
        risk: Option<String>,
        /// Estimated duration in hours
        #[arg(long)]
        hours: Option<f64>,
        /// Planned start (RFC 3339)
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Due date (RFC 3339)
        #[arg(long)]
        due: Option<DateTime<Utc>>,
        /// KPI targets (format: "name=value")
        #[arg(short, long)]
        kpi: Vec<String>,
    },
    /// List strategy nodes
    List {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict to one plan
        #[arg(long)]
        plan: Option<Uuid>,
        /// Filter by domain
        #[arg(short, long)]
        domain: Option<String>,
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,
        /// Filter by node type
        #[arg(short = 't', long = "type")]
        node_type: Option<String>,
    },
    /// Show a node with its dependencies and dependents
    Show {
        /// Node ID or unique prefix
        id: String,
    },
    /// Move a node to a new status
    Status {
        /// Node ID or unique prefix
        id: String,
        /// New status (planned, in_progress, blocked, completed, cancelled)
        status: String,
    },
    /// Update a node's progress percentage
    Progress {
        /// Node ID or unique prefix
        id: String,
        /// Progress 0-100
        percent: u8,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct NodeOutput {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub domain: String,
    pub status: String,
    pub priority: u8,
    pub risk_level: String,
    pub progress: u8,
    pub estimated_duration_hours: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub plan_id: Option<String>,
    pub kpi_targets: BTreeMap<String, f64>,
}

impl From<&StrategyNode> for NodeOutput {
    fn from(node: &StrategyNode) -> Self {
        Self {
            id: node.id.to_string(),
            name: node.name.clone(),
            node_type: node.node_type.as_str().to_string(),
            domain: node.domain.as_str().to_string(),
            status: node.status.as_str().to_string(),
            priority: node.priority,
            risk_level: node.risk_level.as_str().to_string(),
            progress: node.progress,
            estimated_duration_hours: node.estimated_duration_hours,
            due_date: node.due_date,
            plan_id: node.plan_id.map(|id| id.to_string()),
            kpi_targets: node.kpi_targets.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct NodeListOutput {
    pub nodes: Vec<NodeOutput>,
    pub total: usize,
}

impl CommandOutput for NodeListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "type", "domain", "status", "priority", "progress"]);
        for node in &self.nodes {
            table.add_row(vec![
                node.id[..8].to_string(),
                truncate(&node.name, 32),
                node.node_type.clone(),
                node.domain.clone(),
                node.status.clone(),
                node.priority.to_string(),
                format!("{}%", node.progress),
            ]);
        }
        render_list("node", table, self.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct NodeDetailOutput {
    pub node: NodeOutput,
    pub dependencies: Vec<NodeOutput>,
    pub dependents: Vec<NodeOutput>,
}

impl CommandOutput for NodeDetailOutput {
    fn to_human(&self) -> String {
        let node = &self.node;
        let mut lines = vec![
            format!("Node: {}", node.name),
            format!("ID: {}", node.id),
            format!("Type: {}  Domain: {}", node.node_type, node.domain),
            format!("Status: {} ({}%)", node.status, node.progress),
            format!("Priority: {}  Risk: {}", node.priority, node.risk_level),
        ];
        if let Some(hours) = node.estimated_duration_hours {
            lines.push(format!("Estimated: {hours:.1}h"));
        }
        if let Some(due) = node.due_date {
            lines.push(format!("Due: {}", due.format("%Y-%m-%d %H:%M")));
        }
        if !node.kpi_targets.is_empty() {
            lines.push("\nKPI targets:".to_string());
            for (name, target) in &node.kpi_targets {
                lines.push(format!("  - {name}: {target}"));
            }
        }
        for (label, nodes) in [("Depends on", &self.dependencies), ("Required by", &self.dependents)] {
            if !nodes.is_empty() {
                lines.push(format!("\n{label}:"));
                for n in nodes {
                    lines.push(format!("  - {} {} [{}]", &n.id[..8], n.name, n.status));
                }
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct NodeActionOutput {
    pub success: bool,
    pub message: String,
    pub node: NodeOutput,
}

impl CommandOutput for NodeActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

fn parse_kpis(entries: &[String]) -> Result<BTreeMap<String, f64>> {
    let mut kpis = BTreeMap::new();
    for entry in entries {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid KPI '{entry}': expected name=value"))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid KPI value in '{entry}'"))?;
        kpis.insert(name.trim().to_string(), value);
    }
    Ok(kpis)
}

fn parse_filter_enum<T>(label: &str, value: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match value {
        Some(v) => match parse(&v) {
            Some(parsed) => Ok(Some(parsed)),
            None => bail!("Invalid {label}: {v}"),
        },
        None => Ok(None),
    }
}

pub async fn execute(args: NodeArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let graph = &ctx.engine.graph;

    match args.command {
        NodeCommands::Add {
            org,
            name,
            node_type,
            domain,
            description,
            plan,
            priority,
            risk,
            hours,
            start,
            due,
            kpi,
        } => {
            let node = graph
                .add_node(NodeSpec {
                    organization_id: org.organization_id,
                    plan_id: plan,
                    name,
                    description,
                    node_type,
                    domain,
                    priority,
                    risk_level: risk,
                    estimated_duration_hours: hours,
                    start_date: start,
                    due_date: due,
                    kpi_targets: parse_kpis(&kpi)?,
                })
                .await?;
            output(
                &NodeActionOutput {
                    success: true,
                    message: format!("Node created: {} ({})", node.name, short_id(&node.id)),
                    node: NodeOutput::from(&node),
                },
                json_mode,
            );
        }

        NodeCommands::List {
            org,
            plan,
            domain,
            status,
            node_type,
        } => {
            let filter = NodeFilter {
                organization_id: Some(org.organization_id),
                plan_id: plan,
                status: parse_filter_enum("status", status, NodeStatus::from_str)?,
                domain: parse_filter_enum("domain", domain, StrategyDomain::from_str)?,
                node_type: parse_filter_enum("node type", node_type, NodeType::from_str)?,
            };
            let nodes = graph.list_nodes(filter).await?;
            let out = NodeListOutput {
                total: nodes.len(),
                nodes: nodes.iter().map(NodeOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        NodeCommands::Show { id } => {
            let id = ctx.resolve(Entity::Node, &id).await?;
            let node = graph.get_node(id).await?;
            let dependencies = graph.dependencies(id).await?;
            let dependents = graph.dependents(id).await?;
            let out = NodeDetailOutput {
                node: NodeOutput::from(&node),
                dependencies: dependencies.iter().map(NodeOutput::from).collect(),
                dependents: dependents.iter().map(NodeOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        NodeCommands::Status { id, status } => {
            let id = ctx.resolve(Entity::Node, &id).await?;
            let status = NodeStatus::from_str(&status).ok_or_else(|| anyhow!("Invalid status: {status}"))?;
            let node = graph.update_node_status(id, status).await?;
            output(
                &NodeActionOutput {
                    success: true,
                    message: format!("Node {} is now {}", short_id(&node.id), node.status.as_str()),
                    node: NodeOutput::from(&node),
                },
                json_mode,
            );
        }

        NodeCommands::Progress { id, percent } => {
            let id = ctx.resolve(Entity::Node, &id).await?;
            let node = graph.update_node_progress(id, percent).await?;
            output(
                &NodeActionOutput {
                    success: true,
                    message: format!("Node {} progress set to {}%", short_id(&node.id), node.progress),
                    node: NodeOutput::from(&node),
                },
                json_mode,
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kpis() {
        let kpis = parse_kpis(&["organic_sessions=1200".to_string(), "ctr = 2.5".to_string()]).unwrap();
        assert_eq!(kpis["organic_sessions"], 1200.0);
        assert_eq!(kpis["ctr"], 2.5);
        assert!(parse_kpis(&["missing".to_string()]).is_err());
        assert!(parse_kpis(&["x=abc".to_string()]).is_err());
    }
}
