//! Reward Distributor - batched reward transfers with finality tracking
//!
//! Reads a recipients CSV and submits it to a distribution contract one batch
//! at a time, waiting for each transaction to be confirmed before sending the
//! next.

use anyhow::{Context, Result};
use clap::Parser;
use ethers::types::Address;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod chain;
mod config;
mod distribution;
mod error;
mod metrics;
mod tx;

use chain::EthersClient;
use config::{CallKind, Settings};
use distribution::{BatchOutcome, BatchPlan, BatchPlanner, DistributionCall, RunReport};
use tx::{NonceState, TransactionBuilder};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the CSV file with rewarding data
    #[arg(long = "file", short = 'p', alias = "filePath", default_value = "rewards.csv")]
    file_path: PathBuf,

    /// Month for which rewards will be distributed (RNat only)
    #[arg(long, short)]
    month: Option<u64>,

    /// Configuration file
    #[arg(long, short, env = "DISTRIBUTOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    init_logging();

    let cli = Cli::parse();
    info!("Starting Reward Distributor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(month) = cli.month {
        settings.distribution.month = Some(month);
    }
    info!(
        "Loaded configuration for {:?} (chain {})",
        settings.network.name,
        settings.chain_id()
    );

    let result = run(&cli, &settings).await;

    if let Some(path) = &settings.metrics.textfile_path {
        if let Err(e) = metrics::write_textfile(path) {
            error!("Failed to write metrics: {}", e);
        }
    }

    let report = result?;
    log_summary(&report);
    if report.has_failures() {
        anyhow::bail!(
            "{} of {} batches failed; re-run with the unconfirmed entries only",
            report.failed(),
            report.batches.len()
        );
    }

    info!("Reward Distributor finished");
    Ok(())
}

async fn run(cli: &Cli, settings: &Settings) -> Result<RunReport> {
    let call = distribution_call(settings)?;

    let key_env = &settings.wallet.private_key_env;
    let private_key =
        std::env::var(key_env).with_context(|| format!("{} env variable is required", key_env))?;
    let builder = TransactionBuilder::from_private_key(&private_key, settings.chain_id())?;

    // Validate input before touching the network
    let recipients = distribution::read_csv(&cli.file_path)
        .with_context(|| format!("Failed to read recipients from {:?}", cli.file_path))?;
    info!(
        "Loaded {} recipients, {} total",
        recipients.len(),
        distribution::total_amount(&recipients)
    );

    let contract: Address = settings
        .contract_address()?
        .parse()
        .context("Invalid contract address")?;

    let client = Arc::new(EthersClient::connect(settings.chain_id(), &settings.rpc_urls()).await?);
    info!("Chain connection initialized");

    let planner = BatchPlanner::new(
        client,
        builder,
        BatchPlan {
            contract,
            call,
            batch_size: settings.distribution.batch_size,
        },
        &settings.gas,
        &settings.finality,
    );
    info!("Signing with wallet {:?}", planner.sender());

    let mut nonces = NonceState::new();
    Ok(planner.run(&mut nonces, &recipients).await?)
}

/// One line per batch, so unconfirmed entries can be picked out for a re-run
fn log_summary(report: &RunReport) {
    for batch in &report.batches {
        match &batch.outcome {
            BatchOutcome::Confirmed { tx_hash, block } => info!(
                batch = batch.index + 1,
                recipients = batch.recipients,
                nonce = batch.nonce,
                ?tx_hash,
                block,
                "confirmed"
            ),
            BatchOutcome::Failed { kind, reason } => error!(
                batch = batch.index + 1,
                recipients = batch.recipients,
                nonce = batch.nonce,
                %kind,
                "failed: {}",
                reason
            ),
        }
    }
}

fn distribution_call(settings: &Settings) -> Result<DistributionCall> {
    match settings.distribution.call {
        CallKind::Dist => Ok(DistributionCall::Dist),
        CallKind::Rnat => Ok(DistributionCall::RNat {
            project_id: settings.project_id()?,
            month: settings
                .distribution
                .month
                .context("month is required for RNat distribution")?,
        }),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reward_distributor=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
