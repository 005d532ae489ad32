//! Idle shutdown agent
//!
//! Periodically sweeps the account's managed database instances, stops
//! the ones that look idle, and optionally tears down VPC endpoints
//! afterwards.

use anyhow::Result;
use clap::Parser;
use idle_shutdown_lib::decision::IdleStrategy;
use idle_shutdown_lib::observability::{DecisionLogger, SweepMetrics};
use idle_shutdown_lib::providers::{
    Ec2EndpointManager, EndpointManager, MySqlConnector, RdsApi, SsmParameterStore,
};
use idle_shutdown_lib::sweep::{Collaborators, ShutdownSweep, TeardownPolicy};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Stops idle managed database instances
#[derive(Parser)]
#[command(name = "idle-shutdown-agent", version, about, long_about = None)]
struct Cli {
    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Evaluate and log decisions without stopping anything
    #[arg(long)]
    dry_run: bool,

    /// Override the configured idle-detection strategy
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<IdleStrategy>,
}

fn parse_strategy(raw: &str) -> Result<IdleStrategy, String> {
    match raw {
        "log" => Ok(IdleStrategy::Log),
        "counter" => Ok(IdleStrategy::Counter),
        other => Err(format!(
            "unknown strategy '{other}', expected 'log' or 'counter'"
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let mut agent_config = config::AgentConfig::load()?;
    if let Some(strategy) = cli.strategy {
        agent_config.strategy = strategy;
    }
    info!(
        version = AGENT_VERSION,
        strategy = agent_config.strategy.label(),
        dry_run = cli.dry_run,
        "Starting idle-shutdown-agent"
    );

    let sdk_config = aws_config::from_env().load().await;
    let rds = Arc::new(RdsApi::new(&sdk_config));
    let params = Arc::new(SsmParameterStore::new(&sdk_config));
    let endpoints: Option<Arc<dyn EndpointManager>> = match agent_config.teardown {
        TeardownPolicy::Disabled => None,
        _ => Some(Arc::new(Ec2EndpointManager::new(&sdk_config)) as Arc<dyn EndpointManager>),
    };

    let collab = Collaborators {
        inventory: rds.clone(),
        tags: rds.clone(),
        params,
        connections: Arc::new(MySqlConnector),
        control: rds,
        endpoints,
    };

    let metrics = SweepMetrics::new();
    let logger = DecisionLogger::new(agent_config.strategy.label());
    let sweep = ShutdownSweep::new(
        collab,
        agent_config.sweep_config(cli.dry_run),
        metrics.clone(),
        logger,
    );

    if cli.once {
        let report = sweep.run().await?;
        info!(summary = %report.summary(), "Sweep finished");
        return Ok(());
    }

    let state = Arc::new(api::AppState::default());
    tokio::spawn(api::serve(agent_config.api_port, state.clone()));

    // Sweeps run inline on the ticker, never concurrently: the baseline
    // read-modify-write in the parameter store is not atomic.
    let mut ticker = tokio::time::interval(Duration::from_secs(agent_config.check_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep.run().await {
                    Ok(report) => {
                        state.record_success(report.summary()).await;
                    }
                    Err(err) => {
                        error!(error = ?err, "Sweep failed");
                        metrics.inc_sweep_failures();
                        state.record_failure(format!("{err:#}")).await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
