//! Metrics ingestion commands: observations, performance outcomes and
//! explicit domain allocations.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::cli::{CliContext, OrgArg};
use crate::domain::models::{MetricObservation, PerformanceRecord, StrategyDomain};
use crate::services::Allocations;

fn parse_domain(value: &str) -> Result<StrategyDomain> {
    StrategyDomain::from_str(value).ok_or_else(|| anyhow!("Invalid domain: {value}"))
}

#[derive(Args, Debug)]
pub struct MetricArgs {
    #[command(subcommand)]
    pub command: MetricCommands,
}

#[derive(Subcommand, Debug)]
pub enum MetricCommands {
    /// Record one metric observation
    Record {
        #[command(flatten)]
        org: OrgArg,
        /// Strategic domain
        domain: String,
        /// Metric name
        name: String,
        /// Observed value
        value: f64,
        /// Target value at the time of observation
        #[arg(short, long)]
        target: Option<f64>,
        /// Observation time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Args, Debug)]
pub struct PerformanceArgs {
    #[command(subcommand)]
    pub command: PerformanceCommands,
}

#[derive(Subcommand, Debug)]
pub enum PerformanceCommands {
    /// Record how a domain performed against plan
    Record {
        #[command(flatten)]
        org: OrgArg,
        /// Strategic domain
        domain: String,
        /// Achievement as a percentage of target
        achievement: f64,
        /// Metric the outcome refers to
        #[arg(short, long)]
        metric: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct AllocationArgs {
    #[command(subcommand)]
    pub command: AllocationCommands,
}

#[derive(Subcommand, Debug)]
pub enum AllocationCommands {
    /// Replace explicit allocations (format: "domain=weight", normalized to 100)
    Set {
        #[command(flatten)]
        org: OrgArg,
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Show current allocations (explicit, or derived from node hours)
    Show {
        #[command(flatten)]
        org: OrgArg,
        /// Restrict derivation to one plan
        #[arg(long)]
        plan: Option<Uuid>,
    },
}

#[derive(Debug, Serialize)]
pub struct RecordOutput {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
}

impl CommandOutput for RecordOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct AllocationOutput {
    pub organization_id: Uuid,
    pub allocations: Allocations,
}

impl CommandOutput for AllocationOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["domain", "share"]);
        for (domain, share) in &self.allocations {
            table.add_row(vec![domain.as_str().to_string(), format!("{share:.1}%")]);
        }
        render_list("domain allocation", table, self.allocations.len())
    }
}

fn parse_allocations(entries: &[String]) -> Result<Allocations> {
    let mut allocations = Allocations::new();
    for entry in entries {
        let (domain, weight) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid allocation '{entry}': expected domain=weight"))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid weight in '{entry}'"))?;
        allocations.insert(parse_domain(domain.trim())?, weight);
    }
    Ok(allocations)
}

pub async fn execute_metric(args: MetricArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        MetricCommands::Record {
            org,
            domain,
            name,
            value,
            target,
            at,
        } => {
            let observation = MetricObservation::new(
                org.organization_id,
                parse_domain(&domain)?,
                name,
                value,
                target,
                at.unwrap_or_else(Utc::now),
            );
            let observation = ctx.engine.drift.record_observation(observation).await?;
            output(
                &RecordOutput {
                    success: true,
                    message: format!(
                        "Recorded {} {} = {}",
                        observation.domain.as_str(),
                        observation.metric_name,
                        observation.value
                    ),
                    id: observation.id,
                },
                json_mode,
            );
        }
    }

    Ok(())
}

pub async fn execute_performance(args: PerformanceArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        PerformanceCommands::Record {
            org,
            domain,
            achievement,
            metric,
        } => {
            let on_track = achievement >= ctx.config.adjustment.success_threshold_percent;
            let mut record = PerformanceRecord::new(org.organization_id, parse_domain(&domain)?, achievement, on_track);
            if let Some(metric) = metric {
                record = record.with_metric(metric);
            }
            let record = ctx.engine.balance.record_performance(record).await?;
            output(
                &RecordOutput {
                    success: true,
                    message: format!(
                        "Recorded {} performance {:.1}% ({})",
                        record.domain.as_str(),
                        record.achievement_percent,
                        if record.on_track { "on track" } else { "off track" }
                    ),
                    id: record.id,
                },
                json_mode,
            );
        }
    }

    Ok(())
}

pub async fn execute_allocation(args: AllocationArgs, json_mode: bool) -> Result<()> {
    let ctx = CliContext::open().await?;

    match args.command {
        AllocationCommands::Set { org, entries } => {
            let allocations = ctx
                .engine
                .balance
                .set_domain_allocations(org.organization_id, parse_allocations(&entries)?)
                .await?;
            output(
                &AllocationOutput {
                    organization_id: org.organization_id,
                    allocations,
                },
                json_mode,
            );
        }
        AllocationCommands::Show { org, plan } => {
            let allocations = ctx.engine.balance.current_allocations(org.organization_id, plan).await?;
            output(
                &AllocationOutput {
                    organization_id: org.organization_id,
                    allocations,
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
    fn test_parse_allocations() {
        let allocations = parse_allocations(&["seo=40".to_string(), "Content = 60".to_string()]).unwrap();
        assert_eq!(allocations[&StrategyDomain::Seo], 40.0);
        assert_eq!(allocations[&StrategyDomain::Content], 60.0);
        assert!(parse_allocations(&["print=10".to_string()]).is_err());
        assert!(parse_allocations(&["seo".to_string()]).is_err());
    }
}
