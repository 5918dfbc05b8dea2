//! Stratagem CLI entry point.

use anyhow::Context;
use clap::Parser;

use stratagem::cli::commands;
use stratagem::cli::{handle_error, Cli, Commands};
use stratagem::infrastructure::config::ConfigLoader;
use stratagem::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = ConfigLoader::load()
        .and_then(|config| LogConfig::try_from(&config.logging))
        .context("Failed to load configuration");
    let log_config = match log_config {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };
    let log_config = if cli.verbose { log_config.with_level("debug") } else { log_config };
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, cli.json).await,
        Commands::Node(args) => commands::node::execute(args, cli.json).await,
        Commands::Edge(args) => commands::edge::execute(args, cli.json).await,
        Commands::Graph(args) => commands::graph::execute(args, cli.json).await,
        Commands::Metric(args) => commands::metric::execute_metric(args, cli.json).await,
        Commands::Performance(args) => commands::metric::execute_performance(args, cli.json).await,
        Commands::Allocation(args) => commands::metric::execute_allocation(args, cli.json).await,
        Commands::Refine(args) => commands::refine::execute(args, cli.json).await,
        Commands::Drift(args) => commands::drift::execute(args, cli.json).await,
        Commands::Balance(args) => commands::balance::execute(args, cli.json).await,
        Commands::Adjustment(args) => commands::adjustment::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
