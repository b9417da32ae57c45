//! # CropGuard CLI
//!
//! Evaluates crop-insurance claims and settles them through the insurance
//! pool's oracle contract.
//!
//! ## Usage
//!
//! ```bash
//! # Evaluate a claim request and submit the verdict
//! cropguard evaluate --request claim.json
//!
//! # Same, but wait for the transaction to be mined
//! cropguard evaluate --request claim.json --wait
//!
//! # Reconcile a claim with the ledger
//! cropguard status --claim-id 12
//!
//! # Keep reconciling pending claims until interrupted
//! cropguard reconcile --watch
//!
//! # Offline run against the in-memory ledger
//! cropguard --simulate evaluate --request claim.json --wait
//! ```
//!
//! ## Environment
//!
//! - `LEDGER_RPC_URL` / `SEPOLIA_RPC`: signing node JSON-RPC endpoint
//! - `WALLET_ADDRESS`: oracle account, `INSURANCE_POOL`: pool contract
//! - `PUSH_TO_CHAINLINK`, `CHAINLINK_WEBHOOK_URL`, `CHAINLINK_API_KEY`: verdict webhook
//! - `CROPGUARD_DATA_DIR`: claim store and `lands.json` location
//!
//! Variables are also read from a `.env` file in the working directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cropguard::claims::{ClaimId, ClaimStatus, FileClaimStore};
use cropguard::config::RuntimeConfig;
use cropguard::error::ClaimError;
use cropguard::pipeline::{ClaimPipeline, EvaluateRequest, ReconcileQueue, ReconcileWorker};
use cropguard::prediction::PredictionService;
use cropguard::registry::StaticLandRegistry;
use cropguard::services::{JsonRpcLedger, Ledger, LedgerAdmin, PredictionWebhook, SimulatedLedger};
use cropguard::settlement::SubmissionMode;
use cropguard::utils::time;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "cropguard")]
#[command(about = "Crop-stress claim evaluation with on-chain oracle settlement")]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding claims/ and lands.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Model coefficient file; heuristics are used without one
    #[arg(long, global = true)]
    models: Option<PathBuf>,

    /// Use the in-memory ledger instead of a JSON-RPC node
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a claim from a request file, evaluate it and submit the verdict
    Evaluate {
        /// JSON file with farmer_id, land_id, model1 and model2
        #[arg(short, long)]
        request: PathBuf,
        /// Wait for the transaction to be mined before answering
        #[arg(long)]
        wait: bool,
    },
    /// Reconcile one claim with the ledger and show its status
    Status {
        #[arg(short, long)]
        claim_id: u64,
    },
    /// Submit a stored verdict again after an on-chain error
    Resubmit {
        #[arg(short, long)]
        claim_id: u64,
    },
    /// Reconcile every claim still awaiting a ledger result
    Reconcile {
        /// Keep running until interrupted
        #[arg(long)]
        watch: bool,
        /// Seconds between sweeps in watch mode
        #[arg(long)]
        interval: Option<u64>,
    },
    /// List stored claims
    List {
        /// Only claims in this status (e.g. onchain_submitted)
        #[arg(short, long)]
        status: Option<ClaimStatus>,
    },
    /// Allow another account to submit oracle data (admin account)
    AuthorizeOracle {
        #[arg(long)]
        address: String,
    },
    /// Release the payout recorded for a claim (admin account)
    ExecutePayout {
        #[arg(short, long)]
        claim_id: u64,
    },
}

/// Ledger handles shared by every command
struct LedgerHandles {
    ledger: Arc<dyn Ledger>,
    admin: Arc<dyn LedgerAdmin>,
}

impl LedgerHandles {
    fn connect(simulate: bool) -> Result<Self> {
        if simulate {
            log::warn!("Using the simulated ledger; nothing leaves this process");
            let ledger = Arc::new(SimulatedLedger::auto_settling());
            return Ok(Self {
                ledger: ledger.clone(),
                admin: ledger,
            });
        }

        let ledger = Arc::new(JsonRpcLedger::from_env().context("ledger configuration")?);
        log::debug!("Ledger endpoint: {}", ledger.config().rpc_url);
        Ok(Self {
            ledger: ledger.clone(),
            admin: ledger,
        })
    }
}

/// Exit status for a failed command: 2 for bad input, 3 for unknown claims
/// or missing submissions, 1 otherwise
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ClaimError>() {
        Some(e) if e.is_user_error() => 2,
        Some(e) if e.is_not_found() => 3,
        _ => 1,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut runtime = RuntimeConfig::from_env();
    if let Some(dir) = &cli.data_dir {
        runtime.data_dir = dir.clone();
    }
    if let Some(models) = &cli.models {
        runtime.models_path = Some(models.clone());
    }

    let handles = LedgerHandles::connect(cli.simulate)?;

    match cli.command {
        Commands::Evaluate { request, wait } => {
            let mode = if wait {
                SubmissionMode::WaitForConfirmation
            } else {
                SubmissionMode::FireAndForget
            };
            evaluate(&runtime, &handles, &request, mode).await?;
        }
        Commands::Status { claim_id } => {
            let pipeline = build_pipeline(&runtime, &handles, SubmissionMode::default(), None)?;
            print_json(&pipeline.tx_status(ClaimId(claim_id)).await?)?;
        }
        Commands::Resubmit { claim_id } => {
            let pipeline = build_pipeline(&runtime, &handles, SubmissionMode::default(), None)?;
            let record = pipeline.submit_verdict(ClaimId(claim_id)).await?;
            println!("Claim {} is now {}", record.id, record.status());
            if let Some(error) = &record.submission_error {
                println!("Ledger error: {}", error);
            }
            if let Some(tx) = &record.onchain_tx {
                println!("Transaction: {}", tx);
            }
        }
        Commands::Reconcile { watch, interval } => {
            if let Some(secs) = interval {
                runtime.reconcile_interval = Duration::from_secs(secs);
            }
            if watch {
                watch_pending(&runtime, &handles).await?;
            } else {
                let pipeline =
                    build_pipeline(&runtime, &handles, SubmissionMode::default(), None)?;
                print_json(&pipeline.reconcile_pending().await?)?;
            }
        }
        Commands::List { status } => {
            let pipeline = build_pipeline(&runtime, &handles, SubmissionMode::default(), None)?;
            list_claims(&pipeline, status)?;
        }
        Commands::AuthorizeOracle { address } => {
            let tx = handles.admin.authorize_oracle(&address).await?;
            println!("authorizeOracle({}) sent: {}", address, tx);
        }
        Commands::ExecutePayout { claim_id } => {
            let tx = handles.admin.execute_payout(claim_id).await?;
            println!("executePayout({}) sent: {}", claim_id, tx);
        }
    }

    Ok(())
}

fn build_pipeline(
    runtime: &RuntimeConfig,
    handles: &LedgerHandles,
    mode: SubmissionMode,
    queue: Option<ReconcileQueue>,
) -> Result<ClaimPipeline> {
    let store = FileClaimStore::open(&runtime.claims_dir())
        .with_context(|| format!("opening claim store {}", runtime.claims_dir().display()))?;
    log::debug!("Claim store: {}", store.storage_path().display());
    let registry = StaticLandRegistry::from_file(&runtime.lands_file())
        .with_context(|| format!("loading land registry {}", runtime.lands_file().display()))?;
    let predictor = match &runtime.models_path {
        Some(path) => PredictionService::from_artifacts(path)?,
        None => PredictionService::heuristic(),
    };

    let mut builder = ClaimPipeline::builder(
        Arc::new(registry),
        Arc::new(store),
        handles.ledger.clone(),
    )
    .predictor(predictor)
    .webhook(PredictionWebhook::from_env()?)
    .mode(mode)
    .runtime(runtime.clone());
    if let Some(queue) = queue {
        builder = builder.reconcile_queue(queue);
    }
    Ok(builder.build())
}

async fn evaluate(
    runtime: &RuntimeConfig,
    handles: &LedgerHandles,
    request_file: &Path,
    mode: SubmissionMode,
) -> Result<()> {
    let content = std::fs::read_to_string(request_file)
        .with_context(|| format!("reading {}", request_file.display()))?;
    let request: EvaluateRequest =
        serde_json::from_str(&content).context("parsing evaluate request")?;

    let pipeline = build_pipeline(runtime, handles, mode, None)?;
    let response = pipeline.submit_claim(request).await?;
    print_json(&response)
}

async fn watch_pending(runtime: &RuntimeConfig, handles: &LedgerHandles) -> Result<()> {
    let (queue, receiver) = ReconcileQueue::channel();
    let pipeline = Arc::new(build_pipeline(
        runtime,
        handles,
        SubmissionMode::default(),
        Some(queue),
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReconcileWorker::new(pipeline, receiver, runtime.reconcile_interval);
    let handle = worker.spawn(shutdown_rx);

    println!(
        "Reconciling every {}; press Ctrl+C to stop",
        time::format_duration(runtime.reconcile_interval)
    );
    tokio::signal::ctrl_c().await?;
    shutdown_tx.send(true).ok();
    handle.await??;
    Ok(())
}

fn list_claims(pipeline: &ClaimPipeline, status: Option<ClaimStatus>) -> Result<()> {
    let claims = pipeline.claims(status)?;
    if claims.is_empty() {
        println!("No claims found");
        return Ok(());
    }

    println!(
        "{:<8} {:<8} {:<8} {:<18} {:<10} {:<14} {}",
        "CLAIM", "LAND", "FARMER", "STATUS", "PAYOUT", "TX", "UPDATED"
    );
    for claim in claims {
        let payout = claim
            .verdict
            .as_ref()
            .map(|v| format!("{:.2}%", v.payout_percentage))
            .unwrap_or_else(|| "-".to_string());
        let tx = claim
            .onchain_tx
            .as_ref()
            .map(|tx| tx.short())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<8} {:<8} {:<18} {:<10} {:<14} {}",
            claim.id.0,
            claim.land_id,
            claim.farmer_id,
            claim.status().as_str(),
            payout,
            tx,
            time::format_timestamp(&claim.updated_at)
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
