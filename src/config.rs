//! # Configuration Constants
//!
//! Constants and environment-driven settings for the claim pipeline, the
//! ledger client and the prediction webhook.

use std::path::PathBuf;
use std::time::Duration;

/// Ledger and JSON-RPC configuration
pub mod ledger {
    use std::time::Duration;

    /// Gas limit attached to every oracle transaction
    pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

    /// Gas price in wei (20 gwei)
    pub const DEFAULT_GAS_PRICE_WEI: u64 = 20_000_000_000;

    /// `submitOracleData(uint256,uint8,uint256)`
    pub const SUBMIT_ORACLE_DATA_SELECTOR: &str = "5243aaf6";

    /// `authorizeOracle(address)`
    pub const AUTHORIZE_ORACLE_SELECTOR: &str = "0f13b763";

    /// `executePayout(uint256)`
    pub const EXECUTE_PAYOUT_SELECTOR: &str = "21814f90";

    /// Fixed-point base the pool contract uses for payout percentages.
    ///
    /// A payout of 37.5% is sent as 375_000, i.e. percentage × 10_000.
    pub const PAYOUT_SCALE: u64 = 1_000_000;

    /// HTTP timeout for a single JSON-RPC request
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

    /// Maximum attempts for read-only ledger calls
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;

    /// Base delay between read retries (doubled on every attempt)
    pub const RETRY_DELAY: Duration = Duration::from_millis(500);
}

/// Pipeline timing
pub mod pipeline {
    use std::time::Duration;

    /// Upper bound on a single oracle submission call.
    ///
    /// Distinct from [`CONFIRMATION_TIMEOUT`]: this bounds the time to get a
    /// transaction hash back, not the time until the transaction is mined.
    pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(20);

    /// How long the synchronous confirmation mode waits for a receipt
    pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

    /// Receipt polling cadence while waiting for confirmation
    pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Background reconciliation cadence
    pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

    /// Probability at or above which a parcel is classified as stressed
    pub const STRESS_THRESHOLD: f64 = 0.5;
}

/// Prediction webhook
pub mod webhook {
    use std::time::Duration;

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    pub const API_KEY_HEADER: &str = "X-API-Key";
}

/// File paths and names
pub mod files {
    /// Data directory under the user's home when none is configured
    pub const DEFAULT_DATA_DIR: &str = ".cropguard";

    /// Claim records, one JSON file per claim
    pub const CLAIMS_DIR: &str = "claims";

    /// Land registry export consumed by the CLI
    pub const LANDS_FILE: &str = "lands.json";
}

/// Environment variable names
pub mod env {
    /// Ledger JSON-RPC URL
    pub const LEDGER_RPC_URL: &str = "LEDGER_RPC_URL";

    /// Ledger JSON-RPC URL (name used by existing deployments)
    pub const SEPOLIA_RPC: &str = "SEPOLIA_RPC";

    /// Oracle signer account
    pub const WALLET_ADDRESS: &str = "WALLET_ADDRESS";

    /// Insurance pool contract
    pub const INSURANCE_POOL: &str = "INSURANCE_POOL";

    /// Privileged account for administrative calls
    pub const ADMIN_WALLET_ADDRESS: &str = "ADMIN_WALLET_ADDRESS";

    /// Bearer credential for the signing node
    pub const LEDGER_RPC_AUTH: &str = "LEDGER_RPC_AUTH";

    /// Selector override for `submitOracleData`
    pub const ORACLE_SUBMIT_SELECTOR: &str = "ORACLE_SUBMIT_SELECTOR";

    pub const PUSH_TO_CHAINLINK: &str = "PUSH_TO_CHAINLINK";
    pub const CHAINLINK_WEBHOOK_URL: &str = "CHAINLINK_WEBHOOK_URL";
    pub const CHAINLINK_API_KEY: &str = "CHAINLINK_API_KEY";

    pub const DATA_DIR: &str = "CROPGUARD_DATA_DIR";
    pub const MODELS: &str = "CROPGUARD_MODELS";

    pub const SUBMIT_TIMEOUT_SECS: &str = "SUBMIT_TIMEOUT_SECS";
    pub const CONFIRMATION_TIMEOUT_SECS: &str = "CONFIRMATION_TIMEOUT_SECS";
    pub const RECONCILE_INTERVAL_SECS: &str = "RECONCILE_INTERVAL_SECS";
}

/// Pipeline settings resolved from the environment
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub models_path: Option<PathBuf>,
    pub submit_timeout: Duration,
    pub confirmation_timeout: Duration,
    pub receipt_poll_interval: Duration,
    pub reconcile_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_path: None,
            submit_timeout: pipeline::SUBMIT_TIMEOUT,
            confirmation_timeout: pipeline::CONFIRMATION_TIMEOUT,
            receipt_poll_interval: pipeline::RECEIPT_POLL_INTERVAL,
            reconcile_interval: pipeline::RECONCILE_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Load settings from the environment (and `.env`), falling back to defaults
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        Self {
            data_dir: std::env::var(env::DATA_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            models_path: std::env::var(env::MODELS).ok().map(PathBuf::from),
            submit_timeout: secs_from_env(env::SUBMIT_TIMEOUT_SECS)
                .unwrap_or(defaults.submit_timeout),
            confirmation_timeout: secs_from_env(env::CONFIRMATION_TIMEOUT_SECS)
                .unwrap_or(defaults.confirmation_timeout),
            receipt_poll_interval: defaults.receipt_poll_interval,
            reconcile_interval: secs_from_env(env::RECONCILE_INTERVAL_SECS)
                .unwrap_or(defaults.reconcile_interval),
        }
    }

    pub fn claims_dir(&self) -> PathBuf {
        self.data_dir.join(files::CLAIMS_DIR)
    }

    pub fn lands_file(&self) -> PathBuf {
        self.data_dir.join(files::LANDS_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(files::DEFAULT_DATA_DIR)
}

fn secs_from_env(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a whole number of seconds", name, raw);
            None
        }
    }
}
