//! Ledger boundary: what the pipeline needs from the settlement chain.

use crate::error::{LedgerError, LedgerResult};
use crate::prediction::Verdict;
use crate::utils::{payout, txid};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ledger transaction identifier, `0x` followed by 64 lowercase hex digits
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(String);

impl TxHash {
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        txid::validate(&normalized).map_err(LedgerError::invalid_response)?;
        Ok(Self(normalized))
    }

    /// Hash from a 32-byte digest
    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        debug_assert_eq!(digest.len(), 32);
        Self(format!("0x{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> String {
        txid::format_short(&self.0)
    }
}

impl TryFrom<String> for TxHash {
    type Error = LedgerError;

    fn try_from(value: String) -> LedgerResult<Self> {
        Self::parse(&value)
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments of one `submitOracleData` call
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct OracleSubmission {
    pub claim_id: u64,
    /// 0 or 1
    pub stress_level: u8,
    /// Payout percentage on the pool's fixed-point scale
    pub payout_scaled: u64,
}

impl OracleSubmission {
    pub fn from_verdict(claim_id: u64, verdict: &Verdict) -> Self {
        Self {
            claim_id,
            stress_level: verdict.stress_level(),
            payout_scaled: payout::scale_percentage(verdict.payout_percentage),
        }
    }
}

/// Ledger-side view of a transaction
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// No receipt yet: unmined, dropped or never seen
    Unknown,
    Success,
    Failed,
}

/// Observable results of a mined transaction
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct LedgerEffects {
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub logs: Vec<Value>,
    /// Receipt exactly as the ledger returned it
    #[serde(default)]
    pub raw: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LedgerReceipt {
    pub status: ReceiptStatus,
    pub effects: Option<LedgerEffects>,
}

impl LedgerReceipt {
    pub fn unknown() -> Self {
        Self {
            status: ReceiptStatus::Unknown,
            effects: None,
        }
    }
}

/// Oracle-facing ledger operations used on the evaluation path
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Send the verdict for a claim. Returns once the ledger has accepted the
    /// transaction into its pending pool, not once it is mined.
    async fn submit_oracle_data(&self, submission: &OracleSubmission) -> LedgerResult<TxHash>;

    /// Look up the receipt of a previously submitted transaction
    async fn get_receipt(&self, tx: &TxHash) -> LedgerResult<LedgerReceipt>;
}

/// Privileged pool operations, kept off the evaluation path
#[async_trait]
pub trait LedgerAdmin: Send + Sync {
    /// Allow another account to submit oracle data
    async fn authorize_oracle(&self, address: &str) -> LedgerResult<TxHash>;

    /// Release the payout recorded for a claim
    async fn execute_payout(&self, claim_id: u64) -> LedgerResult<TxHash>;
}
