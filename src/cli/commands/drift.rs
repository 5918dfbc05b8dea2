//! Drift signal commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{DriftSeverity, DriftSignal, DriftSignalFilter};

#[derive(Args, Debug)]
pub struct DriftArgs {
    #[command(subcommand)]
    pub command: DriftCommands,
}

#[derive(Subcommand, Debug)]
pub enum DriftCommands {
    /// List drift signals
    List {
        #[command(flatten)]
        org: OrgArg,
        /// Only unresolved signals
        #[arg(short, long)]
        unresolved: bool,
        /// Minimum severity (low, medium, high, critical)
        #[arg(short, long)]
        severity: Option<String>,
        /// Only signals detected in this cycle
        #[arg(long)]
        cycle: Option<Uuid>,
    },
    /// Mark a drift signal as handled
    Resolve {
        /// Signal ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct DriftListOutput {
    pub signals: Vec<DriftSignal>,
}

impl CommandOutput for DriftListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "severity", "domain", "subject", "direction", "drift", "resolved"]);
        for signal in &self.signals {
            let subject = match (&signal.metric_name, signal.node_id) {
                (Some(metric), _) => metric.clone(),
                (None, Some(node)) => format!("node {}", short_id(&node)),
                (None, None) => "-".to_string(),
            };
            table.add_row(vec![
                short_id(&signal.id),
                signal.severity.as_str().to_string(),
                signal.domain.as_str().to_string(),
                truncate(&subject, 28),
                signal.direction.as_str().to_string(),
                format!("{:+.1}%", signal.drift_percent),
                if signal.resolved { "yes" } else { "no" }.to_string(),
            ]);
        }
        render_list("drift signal", table, self.signals.len())
    }
}

#[derive(Debug, Serialize)]
pub struct DriftResolveOutput {
    pub success: bool,
    pub message: String,
    pub signal: DriftSignal,
}

impl CommandOutput for DriftResolveOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: DriftArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        DriftCommands::List {
            org,
            unresolved,
            severity,
            cycle,
        } => {
            let min_severity = severity
                .map(|s| DriftSeverity::from_str(&s).ok_or_else(|| anyhow!("Invalid severity: {s}")))
                .transpose()?;
            let signals = ctx
                .engine
                .drift
                .list_signals(
                    org.organization_id,
                    DriftSignalFilter {
                        cycle_id: cycle,
                        unresolved_only: unresolved,
                        min_severity,
                    },
                )
                .await?;
            output(&DriftListOutput { signals }, json_mode);
        }

        DriftCommands::Resolve { id } => {
            let id = ctx.resolve(Entity::DriftSignal, &id).await?;
            let signal = ctx.engine.drift.resolve_drift_signal(id).await?;
            output(
                &DriftResolveOutput {
                    success: true,
                    message: format!("Drift signal {} resolved", short_id(&signal.id)),
                    signal,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
