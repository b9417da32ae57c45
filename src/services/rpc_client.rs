use crate::config::{env as config_env, ledger};
use crate::error::{ClaimError, ClaimResult, LedgerError, LedgerResult};
use crate::services::ledger::{
    Ledger, LedgerAdmin, LedgerEffects, LedgerReceipt, OracleSubmission, ReceiptStatus, TxHash,
};
use crate::utils::retry;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Connection and account settings for the pool contract
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Account the signing node uses for oracle submissions
    pub oracle_address: String,
    /// Privileged account for administrative calls
    pub admin_address: String,
    pub pool_address: String,
    pub auth_token: Option<String>,
    pub submit_selector: String,
    pub gas_limit: u64,
    pub gas_price_wei: u64,
    pub request_timeout: Duration,
}

impl LedgerConfig {
    /// Build a configuration with default gas settings
    pub fn new(rpc_url: &str, oracle_address: &str, pool_address: &str) -> ClaimResult<Self> {
        let config = Self {
            rpc_url: rpc_url.to_string(),
            oracle_address: oracle_address.to_string(),
            admin_address: oracle_address.to_string(),
            pool_address: pool_address.to_string(),
            auth_token: None,
            submit_selector: ledger::SUBMIT_ORACLE_DATA_SELECTOR.to_string(),
            gas_limit: ledger::DEFAULT_GAS_LIMIT,
            gas_price_wei: ledger::DEFAULT_GAS_PRICE_WEI,
            request_timeout: ledger::REQUEST_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load ledger settings from environment (and `.env`)
    pub fn from_env() -> ClaimResult<Self> {
        dotenv::dotenv().ok();

        let rpc_url = std::env::var(config_env::LEDGER_RPC_URL)
            .or_else(|_| std::env::var(config_env::SEPOLIA_RPC))
            .map_err(|_| {
                ClaimError::config(format!(
                    "{} (or {}) must be set",
                    config_env::LEDGER_RPC_URL,
                    config_env::SEPOLIA_RPC
                ))
            })?;
        let oracle_address = required_var(config_env::WALLET_ADDRESS)?;
        let pool_address = required_var(config_env::INSURANCE_POOL)?;

        let mut config = Self::new(&rpc_url, &oracle_address, &pool_address)?;
        if let Ok(admin) = std::env::var(config_env::ADMIN_WALLET_ADDRESS) {
            config.admin_address = admin;
        }
        config.auth_token = std::env::var(config_env::LEDGER_RPC_AUTH).ok();
        if let Ok(selector) = std::env::var(config_env::ORACLE_SUBMIT_SELECTOR) {
            config.submit_selector = selector.trim_start_matches("0x").to_ascii_lowercase();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ClaimResult<()> {
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(ClaimError::config(format!(
                "Ledger RPC URL must be http(s): {}",
                self.rpc_url
            )));
        }
        for (name, address) in [
            ("oracle", &self.oracle_address),
            ("admin", &self.admin_address),
            ("pool", &self.pool_address),
        ] {
            abi::address_word(address)
                .map_err(|e| ClaimError::config(format!("Invalid {} address: {}", name, e)))?;
        }
        if self.submit_selector.len() != 8 || hex::decode(&self.submit_selector).is_err() {
            return Err(ClaimError::config(format!(
                "Oracle submit selector must be 4 hex bytes: {}",
                self.submit_selector
            )));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> ClaimResult<String> {
    std::env::var(name).map_err(|_| ClaimError::config(format!("{} must be set", name)))
}

/// Contract call encoding for the handful of functions the pool exposes
pub mod abi {
    use crate::error::{LedgerError, LedgerResult};

    /// Left-pad an unsigned integer to a 32-byte word
    pub fn uint_word(value: u64) -> String {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        hex::encode(word)
    }

    /// Left-pad a 20-byte account address to a 32-byte word
    pub fn address_word(address: &str) -> LedgerResult<String> {
        let digits = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::invalid_response(format!("{}: {}", address, e)))?;
        if bytes.len() != 20 {
            return Err(LedgerError::invalid_response(format!(
                "{}: expected 20 bytes, got {}",
                address,
                bytes.len()
            )));
        }
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&bytes);
        Ok(hex::encode(word))
    }

    /// `0x` + selector + argument words
    pub fn call_data(selector: &str, words: &[String]) -> String {
        let mut data = String::with_capacity(2 + 8 + words.len() * 64);
        data.push_str("0x");
        data.push_str(selector);
        for word in words {
            data.push_str(word);
        }
        data
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Ethereum-style JSON-RPC client for the insurance pool contract.
///
/// Transactions are signed by the node (`eth_sendTransaction`), so no key
/// material passes through this process.
#[derive(Debug)]
pub struct JsonRpcLedger {
    client: Client,
    config: LedgerConfig,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(config: LedgerConfig) -> ClaimResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClaimError::config(format!("HTTP client creation failed: {}", e)))?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a client with configuration from environment
    pub fn from_env() -> ClaimResult<Self> {
        Self::new(LedgerConfig::from_env()?)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.config.rpc_url).json(&body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout {
                    seconds: self.config.request_timeout.as_secs(),
                }
            } else if e.is_connect() {
                LedgerError::unavailable(e.to_string())
            } else {
                LedgerError::Network { source: e }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: RpcResponse = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = envelope.result.unwrap_or(Value::Null);
        serde_json::from_value(result).map_err(|e| {
            LedgerError::invalid_response(format!("{} result could not be decoded: {}", method, e))
        })
    }

    /// Send a transaction to the pool from the given account
    async fn send_transaction(&self, from: &str, data: String) -> LedgerResult<TxHash> {
        let tx = json!({
            "from": from,
            "to": self.config.pool_address,
            "data": data,
            "gas": quantity(self.config.gas_limit),
            "gasPrice": quantity(self.config.gas_price_wei),
        });
        let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        TxHash::parse(&hash)
    }

    /// Current block height, used as a connectivity check
    pub async fn block_number(&self) -> LedgerResult<u64> {
        let raw: String = retry::with_backoff(
            ledger::MAX_RETRY_ATTEMPTS,
            ledger::RETRY_DELAY,
            LedgerError::is_retryable,
            || self.call("eth_blockNumber", json!([])),
        )
        .await?;
        parse_quantity(&raw)
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn submit_oracle_data(&self, submission: &OracleSubmission) -> LedgerResult<TxHash> {
        let data = abi::call_data(
            &self.config.submit_selector,
            &[
                abi::uint_word(submission.claim_id),
                abi::uint_word(u64::from(submission.stress_level)),
                abi::uint_word(submission.payout_scaled),
            ],
        );

        log::debug!(
            "submitOracleData(claim={}, stress={}, payout={}) from {}",
            submission.claim_id,
            submission.stress_level,
            submission.payout_scaled,
            self.config.oracle_address
        );

        // Not retried: a resend after a lost response could mine twice.
        self.send_transaction(&self.config.oracle_address, data).await
    }

    async fn get_receipt(&self, tx: &TxHash) -> LedgerResult<LedgerReceipt> {
        let raw: Value = retry::with_backoff(
            ledger::MAX_RETRY_ATTEMPTS,
            ledger::RETRY_DELAY,
            LedgerError::is_retryable,
            || self.call("eth_getTransactionReceipt", json!([tx.as_str()])),
        )
        .await?;
        parse_receipt(raw)
    }
}

#[async_trait]
impl LedgerAdmin for JsonRpcLedger {
    async fn authorize_oracle(&self, address: &str) -> LedgerResult<TxHash> {
        let data = abi::call_data(
            ledger::AUTHORIZE_ORACLE_SELECTOR,
            &[abi::address_word(address)?],
        );
        self.send_transaction(&self.config.admin_address, data).await
    }

    async fn execute_payout(&self, claim_id: u64) -> LedgerResult<TxHash> {
        let data = abi::call_data(ledger::EXECUTE_PAYOUT_SELECTOR, &[abi::uint_word(claim_id)]);
        self.send_transaction(&self.config.admin_address, data).await
    }
}

fn quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn parse_quantity(raw: &str) -> LedgerResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::invalid_response(format!("quantity without 0x: {}", raw)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::invalid_response(format!("bad quantity {}: {}", raw, e)))
}

/// Interpret an `eth_getTransactionReceipt` result
fn parse_receipt(raw: Value) -> LedgerResult<LedgerReceipt> {
    if raw.is_null() {
        return Ok(LedgerReceipt::unknown());
    }

    let status = match raw.get("status").and_then(Value::as_str) {
        Some(s) => match parse_quantity(s)? {
            1 => ReceiptStatus::Success,
            0 => ReceiptStatus::Failed,
            other => {
                return Err(LedgerError::invalid_response(format!(
                    "unexpected receipt status {}",
                    other
                )))
            }
        },
        None => return Err(LedgerError::invalid_response("receipt has no status field")),
    };

    let block_number = match raw.get("blockNumber").and_then(Value::as_str) {
        Some(s) => Some(parse_quantity(s)?),
        None => None,
    };
    let gas_used = match raw.get("gasUsed").and_then(Value::as_str) {
        Some(s) => Some(parse_quantity(s)?),
        None => None,
    };
    let logs = raw
        .get("logs")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(LedgerReceipt {
        status,
        effects: Some(LedgerEffects {
            block_number,
            gas_used,
            logs,
            raw,
        }),
    })
}
