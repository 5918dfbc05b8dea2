//! Refinement loop commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{CycleType, RefinementCycle, RefinementLoopResult, RefinementNeed};

#[derive(Args, Debug)]
pub struct RefineArgs {
    #[command(subcommand)]
    pub command: RefineCommands,
}

#[derive(Subcommand, Debug)]
pub enum RefineCommands {
    /// Run one refinement cycle
    Run {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict to one plan
        #[arg(long)]
        plan: Option<Uuid>,
        /// Cycle type (manual, scheduled, drift_triggered, performance)
        #[arg(short = 't', long = "type", default_value = "manual")]
        cycle_type: String,
        /// Auto-apply adjustments for auto-correctable (LOW or MEDIUM) drift
        #[arg(long)]
        auto_apply: bool,
        /// Additional organizations to refine concurrently (the plan filter is ignored)
        #[arg(long = "also", value_delimiter = ',')]
        also: Vec<Uuid>,
    },
    /// Check whether a refinement run is warranted
    Check {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict to one plan
        #[arg(long)]
        plan: Option<Uuid>,
    },
    /// List past refinement cycles
    History {
        #[command(flatten)]
        org: OrgArg,
        /// Maximum number of cycles to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Cancel an in-progress cycle
    Cancel {
        /// Cycle ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct CycleSummary {
    pub id: Uuid,
    pub sequence_number: u64,
    pub cycle_type: String,
    pub status: String,
    pub drift_signals_found: u32,
    pub adjustments_generated: u32,
    pub adjustments_applied: u32,
    pub improvement_percent: Option<f64>,
    pub summary: Option<String>,
    pub error_message: Option<String>,
}

impl From<&RefinementCycle> for CycleSummary {
    fn from(cycle: &RefinementCycle) -> Self {
        Self {
            id: cycle.id,
            sequence_number: cycle.sequence_number,
            cycle_type: cycle.cycle_type.as_str().to_string(),
            status: cycle.status.as_str().to_string(),
            drift_signals_found: cycle.drift_signals_found,
            adjustments_generated: cycle.adjustments_generated,
            adjustments_applied: cycle.adjustments_applied,
            improvement_percent: cycle.improvement_percent,
            summary: cycle.summary.clone(),
            error_message: cycle.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub results: Vec<RunEntry>,
}

#[derive(Debug, Serialize)]
pub struct RunEntry {
    pub organization_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RefinementLoopResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for entry in &self.results {
            match (&entry.result, &entry.error) {
                (Some(result), _) => {
                    let cycle = &result.cycle;
                    lines.push(format!(
                        "Cycle #{} for {} {}: {} drift signals, {} adjustments ({} applied), balance score {:.1}",
                        cycle.sequence_number,
                        short_id(&entry.organization_id),
                        cycle.status.as_str(),
                        cycle.drift_signals_found,
                        cycle.adjustments_generated,
                        cycle.adjustments_applied,
                        result.balance.snapshot.balance_score,
                    ));
                    if let Some(improvement) = cycle.improvement_percent {
                        lines.push(format!("  Confidence change: {improvement:+.1}%"));
                    }
                    for failure in &result.application_failures {
                        lines.push(format!("  ! {} not applied: {}", short_id(&failure.adjustment_id), failure.error));
                    }
                    if !result.recommendations.is_empty() {
                        lines.push("  Recommendations:".to_string());
                        for rec in &result.recommendations {
                            lines.push(format!("    - {rec}"));
                        }
                    }
                }
                (None, Some(error)) => {
                    lines.push(format!("Cycle for {} failed: {error}", short_id(&entry.organization_id)));
                }
                (None, None) => {}
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    #[serde(flatten)]
    pub need: RefinementNeed,
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        if !self.need.needed {
            return "No refinement needed.".to_string();
        }
        let mut lines = vec![format!("Refinement recommended (urgency {}):", self.need.urgency.as_str())];
        for reason in &self.need.reasons {
            lines.push(format!("  - {reason}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryOutput {
    pub cycles: Vec<CycleSummary>,
}

impl CommandOutput for HistoryOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "id", "type", "status", "signals", "generated", "applied", "improvement"]);
        for cycle in &self.cycles {
            table.add_row(vec![
                cycle.sequence_number.to_string(),
                short_id(&cycle.id),
                cycle.cycle_type.clone(),
                cycle.status.clone(),
                cycle.drift_signals_found.to_string(),
                cycle.adjustments_generated.to_string(),
                cycle.adjustments_applied.to_string(),
                cycle
                    .improvement_percent
                    .map_or_else(|| "-".to_string(), |p| format!("{p:+.1}%")),
            ]);
        }
        render_list("cycle", table, self.cycles.len())
    }
}

#[derive(Debug, Serialize)]
pub struct CancelOutput {
    pub success: bool,
    pub message: String,
    pub cycle: CycleSummary,
}

impl CommandOutput for CancelOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: RefineArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let refinement = &ctx.engine.refinement;

    match args.command {
        RefineCommands::Run {
            org,
            plan,
            cycle_type,
            auto_apply,
            also,
        } => {
            let mut run = refinement.default_run_config();
            run.cycle_type =
                CycleType::from_str(&cycle_type).ok_or_else(|| anyhow!("Invalid cycle type: {cycle_type}"))?;
            run.auto_apply_low_severity |= auto_apply;

            if also.is_empty() {
                let result = refinement.run_refinement_loop(org.organization_id, plan, run).await?;
                let entry = RunEntry {
                    organization_id: org.organization_id,
                    result: Some(result),
                    error: None,
                };
                output(&RunOutput { results: vec![entry] }, json_mode);
                return Ok(());
            }

            let mut orgs = vec![org.organization_id];
            orgs.extend(also.into_iter().filter(|o| *o != org.organization_id));
            let outcomes = refinement.run_for_organizations(&orgs, run).await;

            let results = outcomes
                .into_iter()
                .map(|(organization_id, outcome)| match outcome {
                    Ok(result) => RunEntry {
                        organization_id,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => RunEntry {
                        organization_id,
                        result: None,
                        error: Some(err.to_string()),
                    },
                })
                .collect();
            output(&RunOutput { results }, json_mode);
        }

        RefineCommands::Check { org, plan } => {
            let need = refinement.check_refinement_needed(org.organization_id, plan).await?;
            output(&CheckOutput { need }, json_mode);
        }

        RefineCommands::History { org, limit } => {
            let cycles = refinement.list_cycles(org.organization_id, limit).await?;
            output(
                &HistoryOutput {
                    cycles: cycles.iter().map(CycleSummary::from).collect(),
                },
                json_mode,
            );
        }

        RefineCommands::Cancel { id } => {
            let id = ctx.resolve(Entity::Cycle, &id).await?;
            let cycle = refinement.cancel_cycle(id).await?;
            output(
                &CancelOutput {
                    success: true,
                    message: format!("Cycle #{} cancelled", cycle.sequence_number),
                    cycle: CycleSummary::from(&cycle),
                },
                json_mode,
            );
        }
    }

    Ok(())
}
