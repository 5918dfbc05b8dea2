//! Domain balance commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, short_id, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{BalanceAnalysis, DomainBalanceSnapshot};

#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[command(subcommand)]
    pub command: BalanceCommands,
}

#[derive(Subcommand, Debug)]
pub enum BalanceCommands {
    /// Show the most recent balance snapshot
    Latest {
        #[command(flatten)]
        org: OrgArg,
    },
    /// Analyze current allocations without storing a snapshot
    Preview {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict derivation to one plan
        #[arg(long)]
        plan: Option<Uuid>,
    },
    /// Apply a snapshot's recommended shifts as the new allocations
    ApplyShifts {
        /// Snapshot ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct SnapshotOutput {
    pub snapshot: Option<DomainBalanceSnapshot>,
    pub needs_rebalancing: Option<bool>,
}

impl From<BalanceAnalysis> for SnapshotOutput {
    fn from(analysis: BalanceAnalysis) -> Self {
        Self {
            snapshot: Some(analysis.snapshot),
            needs_rebalancing: Some(analysis.needs_rebalancing),
        }
    }
}

impl CommandOutput for SnapshotOutput {
    fn to_human(&self) -> String {
        let Some(snapshot) = &self.snapshot else {
            return "No balance snapshot recorded yet.".to_string();
        };

        let mut lines = vec![
            format!("Snapshot {} ({})", short_id(&snapshot.id), snapshot.created_at.format("%Y-%m-%d %H:%M")),
            format!(
                "Balance score: {:.1}  entropy {:.3}  gini {:.3}",
                snapshot.balance_score, snapshot.entropy, snapshot.gini
            ),
        ];
        if let Some(source) = snapshot.supersedes {
            lines.push(format!("Supersedes: {}", short_id(&source)));
        }

        let mut table = list_table(&["domain", "allocation", "performance", "shift", "flag"]);
        for (domain, allocation) in &snapshot.allocations {
            let flag = if snapshot.over_optimized.contains(domain) {
                "over-optimized"
            } else if snapshot.under_invested.contains(domain) {
                "under-invested"
            } else {
                ""
            };
            table.add_row(vec![
                domain.as_str().to_string(),
                format!("{allocation:.1}%"),
                snapshot
                    .performance_scores
                    .get(domain)
                    .map_or_else(|| "-".to_string(), |p| format!("{p:.1}")),
                snapshot
                    .recommended_shifts
                    .get(domain)
                    .map_or_else(String::new, |s| format!("{s:+.1}")),
                flag.to_string(),
            ]);
        }
        lines.push(table.to_string());

        if !snapshot.conflicts.is_empty() {
            lines.push("\nConflicts:".to_string());
            for conflict in &snapshot.conflicts {
                lines.push(format!("  - {}", conflict.description));
            }
        }
        if self.needs_rebalancing == Some(true) {
            lines.push("\nRebalancing recommended.".to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: BalanceArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let balance = &ctx.engine.balance;

    let out = match args.command {
        BalanceCommands::Latest { org } => {
            let snapshot = balance.latest_snapshot(org.organization_id).await?;
            SnapshotOutput {
                needs_rebalancing: snapshot.as_ref().map(|s| balance.needs_rebalancing(s)),
                snapshot,
            }
        }
        BalanceCommands::Preview { org, plan } => balance.preview(org.organization_id, plan).await?.into(),
        BalanceCommands::ApplyShifts { id } => {
            let id = ctx.resolve(Entity::Snapshot, &id).await?;
            balance.apply_shifts(id).await?.into()
        }
    };

    output(&out, json_mode);
    Ok(())
}
