//! Adjustment review commands.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::id_resolver::Entity;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{AdjustmentFilter, AdjustmentTarget, PerformanceRecord, ReinforcementAdjustment};

#[derive(Args, Debug)]
pub struct AdjustmentArgs {
    #[command(subcommand)]
    pub command: AdjustmentCommands,
}

#[derive(Subcommand, Debug)]
pub enum AdjustmentCommands {
    /// List adjustments awaiting review
    Pending {
        #[command(flatten)]
        org: OrgArg,
    },
    /// List adjustments
    List {
        #[command(flatten)]
        org: OrgArg,
        /// Only adjustments generated in this cycle
        #[arg(long)]
        cycle: Option<Uuid>,
        /// Filter by target (step, domain, kpi_target, timeline, resource, priority)
        #[arg(short, long)]
        target: Option<String>,
    },
    /// Show one adjustment with its evidence
    Show {
        /// Adjustment ID or unique prefix
        id: String,
    },
    /// Approve without applying
    Approve {
        /// Adjustment ID or unique prefix
        id: String,
    },
    /// Reject a pending adjustment
    Reject {
        /// Adjustment ID or unique prefix
        id: String,
    },
    /// Approve and apply to the target node
    Apply {
        /// Adjustment ID or unique prefix
        id: String,
    },
    /// Record the realized outcome of an applied adjustment
    Outcome {
        /// Adjustment ID or unique prefix
        id: String,
        /// Realized impact
        actual_impact: f64,
        /// Achievement as a percentage of target
        achievement: f64,
    },
}

fn approval_state(adjustment: &ReinforcementAdjustment) -> &'static str {
    match (adjustment.approved, adjustment.is_applied()) {
        (_, true) => "APPLIED",
        (Some(true), false) => "APPROVED",
        (Some(false), _) => "REJECTED",
        (None, false) => "PENDING",
    }
}

#[derive(Debug, Serialize)]
pub struct AdjustmentListOutput {
    pub adjustments: Vec<ReinforcementAdjustment>,
}

impl CommandOutput for AdjustmentListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "target", "type", "change", "confidence", "impact", "state", "reason"]);
        for adj in &self.adjustments {
            let change = adj
                .change
                .headline()
                .map_or_else(|| "-".to_string(), |c| format!("{:.1} -> {:.1}", c.previous, c.new));
            table.add_row(vec![
                short_id(&adj.id),
                adj.target.as_str().to_string(),
                adj.adjustment_type.as_str().to_string(),
                change,
                format!("{:.2}", adj.confidence),
                format!("{:+.1}", adj.expected_impact),
                approval_state(adj).to_string(),
                truncate(&adj.trigger_reason, 40),
            ]);
        }
        render_list("adjustment", table, self.adjustments.len())
    }
}

#[derive(Debug, Serialize)]
pub struct AdjustmentDetailOutput {
    pub adjustment: ReinforcementAdjustment,
    pub state: &'static str,
}

impl CommandOutput for AdjustmentDetailOutput {
    fn to_human(&self) -> String {
        let adj = &self.adjustment;
        let mut lines = vec![
            format!("Adjustment {}", adj.id),
            format!("Target: {}  Type: {}  State: {}", adj.target.as_str(), adj.adjustment_type.as_str(), self.state),
            format!("Magnitude: {:.1}  Confidence: {:.2}", adj.magnitude, adj.confidence),
            format!("Expected impact: {:+.1}", adj.expected_impact),
        ];
        if let Some(actual) = adj.actual_impact {
            lines.push(format!("Actual impact: {actual:+.1}"));
        }
        if let Some(node) = adj.target_id {
            lines.push(format!("Node: {node}"));
        }
        lines.push(format!("Reason: {}", adj.trigger_reason));
        if !adj.supporting_evidence.is_empty() {
            lines.push("\nEvidence:".to_string());
            for signal in &adj.supporting_evidence {
                lines.push(format!(
                    "  - {} strength {:+.2} confidence {:.2}: {}",
                    signal.source.as_str(),
                    signal.strength,
                    signal.confidence,
                    signal.reason
                ));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct AdjustmentActionOutput {
    pub success: bool,
    pub message: String,
    pub adjustment: ReinforcementAdjustment,
}

impl CommandOutput for AdjustmentActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct OutcomeOutput {
    pub success: bool,
    pub message: String,
    pub record: PerformanceRecord,
}

impl CommandOutput for OutcomeOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: AdjustmentArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;
    let engine = &ctx.engine.adjustments;

    match args.command {
        AdjustmentCommands::Pending { org } => {
            let adjustments = engine.list_pending(org.organization_id).await?;
            output(&AdjustmentListOutput { adjustments }, json_mode);
        }

        AdjustmentCommands::List { org, cycle, target } => {
            let target = target
                .map(|t| AdjustmentTarget::from_str(&t).ok_or_else(|| anyhow!("Invalid target: {t}")))
                .transpose()?;
            let adjustments = engine
                .list_adjustments(
                    org.organization_id,
                    AdjustmentFilter {
                        cycle_id: cycle,
                        pending_only: false,
                        target,
                    },
                )
                .await?;
            output(&AdjustmentListOutput { adjustments }, json_mode);
        }

        AdjustmentCommands::Show { id } => {
            let id = ctx.resolve(Entity::Adjustment, &id).await?;
            let adjustment = engine.get_adjustment(id).await?;
            let state = approval_state(&adjustment);
            output(&AdjustmentDetailOutput { adjustment, state }, json_mode);
        }

        AdjustmentCommands::Approve { id } => {
            let id = ctx.resolve(Entity::Adjustment, &id).await?;
            let adjustment = engine.approve(id).await?;
            let message = format!("Adjustment {} approved", short_id(&adjustment.id));
            output(&AdjustmentActionOutput { success: true, message, adjustment }, json_mode);
        }

        AdjustmentCommands::Reject { id } => {
            let id = ctx.resolve(Entity::Adjustment, &id).await?;
            let adjustment = engine.reject(id).await?;
            let message = format!("Adjustment {} rejected", short_id(&adjustment.id));
            output(&AdjustmentActionOutput { success: true, message, adjustment }, json_mode);
        }

        AdjustmentCommands::Apply { id } => {
            let id = ctx.resolve(Entity::Adjustment, &id).await?;
            let adjustment = engine.apply_adjustment(id).await?;
            let message = match adjustment.change.node_id() {
                Some(node) => format!("Adjustment {} applied to node {}", short_id(&adjustment.id), short_id(&node)),
                None => format!("Adjustment {} approved (no node to mutate)", short_id(&adjustment.id)),
            };
            output(&AdjustmentActionOutput { success: true, message, adjustment }, json_mode);
        }

        AdjustmentCommands::Outcome {
            id,
            actual_impact,
            achievement,
        } => {
            let id = ctx.resolve(Entity::Adjustment, &id).await?;
            let record = engine.record_outcome(id, actual_impact, achievement).await?;
            let message = format!(
                "Outcome recorded for {}: {:.1}% ({})",
                short_id(&id),
                record.achievement_percent,
                if record.on_track { "on track" } else { "off track" }
            );
            output(&OutcomeOutput { success: true, message, record }, json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AdjustmentChange, AdjustmentType, DomainShift, StrategyDomain, ValueChange};
    use chrono::Utc;

    fn adjustment() -> ReinforcementAdjustment {
        let now = Utc::now();
        ReinforcementAdjustment {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            cycle_id: None,
            target: AdjustmentTarget::Domain,
            target_id: None,
            adjustment_type: AdjustmentType::Weaken,
            change: AdjustmentChange::Domain(DomainShift {
                domain: StrategyDomain::Seo,
                allocation_percent: ValueChange { previous: 40.0, new: 36.0 },
            }),
            magnitude: 10.0,
            confidence: 0.7,
            trigger_reason: "SEO over-optimized".to_string(),
            supporting_evidence: vec![],
            drift_signal_id: None,
            requires_approval: true,
            approved: None,
            applied_at: None,
            expected_impact: -0.7,
            actual_impact: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_approval_state() {
        let mut adj = adjustment();
        assert_eq!(approval_state(&adj), "PENDING");
        adj.approved = Some(false);
        assert_eq!(approval_state(&adj), "REJECTED");
        adj.approved = Some(true);
        assert_eq!(approval_state(&adj), "APPROVED");
        adj.applied_at = Some(Utc::now());
        assert_eq!(approval_state(&adj), "APPLIED");
    }
}
