mod alert;
mod config;
mod monitoring;
mod orchestrator;
mod registry;
mod storage;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, level_filters::LevelFilter};

use crate::alert::HttpAlertDispatcher;
use crate::config::{Config, Secrets};
use crate::monitoring::browser::ChromeLauncher;
use crate::monitoring::{BrowserTuning, CheckExecutor};
use crate::orchestrator::RunOrchestrator;
use crate::registry::HttpProjectRegistry;
use crate::storage::ResultStore;

/// Deep health verification for monitored web properties.
///
/// Runs one pass over every registered project and exits non-zero when any
/// of them is down; an external scheduler handles recurrence.
#[derive(Debug, Parser)]
#[command(name = "vigil-monitor", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the output directory for status and history artifacts
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Secrets may live in a local .env during development.
    let _ = dotenvy::dotenv();

    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            error!("Monitoring pass failed: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::from_config(cli.config.as_deref())?;
    let secrets = Secrets::from_env();

    let token = secrets.registry_token.clone().context("VIGIL_REGISTRY_TOKEN is not set")?;
    let registry = HttpProjectRegistry::new(config.registry.endpoint.clone(), token)?;

    let executor = CheckExecutor::new(
        Duration::from_secs(config.timing.http_timeout_seconds),
        BrowserTuning::from_config(&config),
        secrets.fallback_login.clone(),
    )?;

    let launcher = Arc::new(ChromeLauncher {
        navigation_timeout: Duration::from_secs(config.timing.navigation_timeout_seconds),
    });

    let alerts = Arc::new(HttpAlertDispatcher::new(
        config.alerts.mail_endpoint.clone(),
        secrets.mail_api_key.clone(),
        config.alerts.from_email.clone(),
        secrets.webhook_url.clone(),
    )?);

    let out_dir = cli.out_dir.unwrap_or_else(|| PathBuf::from(&config.storage.out_dir));
    let store = ResultStore::new(out_dir, config.storage.history_cap);

    let orchestrator =
        RunOrchestrator::new(Arc::new(registry), executor, launcher, alerts, store);
    let summary = orchestrator.run().await?;

    Ok(if summary.exit_code() == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
