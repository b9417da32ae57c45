//! In-memory ledger for tests and offline runs.
//!
//! Transaction hashes are SHA-256 digests of the submission and a running
//! nonce, so runs are reproducible. Every failure mode the pipeline has to
//! survive can be scripted: rejected, unreachable or stalled submissions,
//! reverted transactions and failing receipt reads.

use crate::error::{LedgerError, LedgerResult};
use crate::services::ledger::{
    Ledger, LedgerAdmin, LedgerEffects, LedgerReceipt, OracleSubmission, ReceiptStatus, TxHash,
};
use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const FIRST_BLOCK: u64 = 5_000_000;
const GAS_PER_SUBMISSION: u64 = 46_544;

/// How the next submissions are answered
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitBehaviour {
    Accept,
    Reject(String),
    Unreachable,
    /// Hold the call for this long, then accept
    Stall(Duration),
}

#[derive(Debug)]
struct SimulatedState {
    nonce: u64,
    block: u64,
    behaviour: SubmitBehaviour,
    auto_settle: bool,
    failing_receipt_reads: u32,
    submissions: Vec<(TxHash, OracleSubmission)>,
    outcomes: HashMap<TxHash, (ReceiptStatus, u64)>,
    authorized_oracles: Vec<String>,
    executed_payouts: Vec<u64>,
}

#[derive(Debug)]
pub struct SimulatedLedger {
    state: Mutex<SimulatedState>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    /// Accept everything, never mine on its own
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                nonce: 0,
                block: FIRST_BLOCK,
                behaviour: SubmitBehaviour::Accept,
                auto_settle: false,
                failing_receipt_reads: 0,
                submissions: Vec::new(),
                outcomes: HashMap::new(),
                authorized_oracles: Vec::new(),
                executed_payouts: Vec::new(),
            }),
        }
    }

    /// Every accepted transaction is mined successfully straight away
    pub fn auto_settling() -> Self {
        let ledger = Self::new();
        ledger.lock().auto_settle = true;
        ledger
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimulatedState> {
        // A panicking test thread must not hide the ledger from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_behaviour(&self, behaviour: SubmitBehaviour) {
        self.lock().behaviour = behaviour;
    }

    pub fn reject_submissions(&self, reason: &str) {
        self.set_behaviour(SubmitBehaviour::Reject(reason.to_string()));
    }

    pub fn make_unreachable(&self) {
        self.set_behaviour(SubmitBehaviour::Unreachable);
    }

    pub fn stall_submissions(&self, delay: Duration) {
        self.set_behaviour(SubmitBehaviour::Stall(delay));
    }

    pub fn accept_submissions(&self) {
        self.set_behaviour(SubmitBehaviour::Accept);
    }

    /// Make the next `count` receipt reads fail as if the node were down
    pub fn fail_receipt_reads(&self, count: u32) {
        self.lock().failing_receipt_reads = count;
    }

    /// Mine a pending transaction successfully
    pub fn confirm(&self, tx: &TxHash) {
        self.settle(tx, ReceiptStatus::Success);
    }

    /// Mine a pending transaction as reverted
    pub fn revert(&self, tx: &TxHash) {
        self.settle(tx, ReceiptStatus::Failed);
    }

    fn settle(&self, tx: &TxHash, status: ReceiptStatus) {
        let mut state = self.lock();
        state.block += 1;
        let block = state.block;
        state.outcomes.insert(tx.clone(), (status, block));
    }

    /// Every accepted submission, oldest first
    pub fn submissions(&self) -> Vec<(TxHash, OracleSubmission)> {
        self.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.lock().submissions.len()
    }

    pub fn authorized_oracles(&self) -> Vec<String> {
        self.lock().authorized_oracles.clone()
    }

    pub fn executed_payouts(&self) -> Vec<u64> {
        self.lock().executed_payouts.clone()
    }

    fn accept(&self, submission: &OracleSubmission) -> TxHash {
        let mut state = self.lock();
        state.nonce += 1;

        let mut hasher = Sha256::new();
        hasher.update(state.nonce.to_be_bytes());
        hasher.update(submission.claim_id.to_be_bytes());
        hasher.update([submission.stress_level]);
        hasher.update(submission.payout_scaled.to_be_bytes());
        let hash = TxHash::from_digest(&hasher.finalize());
        state.submissions.push((hash.clone(), *submission));

        if state.auto_settle {
            state.block += 1;
            let block = state.block;
            state.outcomes.insert(hash.clone(), (ReceiptStatus::Success, block));
        }
        hash
    }

    fn admin_hash(&self, label: &str, argument: &str) -> TxHash {
        let mut state = self.lock();
        state.nonce += 1;
        TxHash::from_digest(&Sha256::digest(format!("{}:{}:{}", label, argument, state.nonce)))
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn submit_oracle_data(&self, submission: &OracleSubmission) -> LedgerResult<TxHash> {
        let behaviour = self.lock().behaviour.clone();
        match behaviour {
            SubmitBehaviour::Accept => {}
            SubmitBehaviour::Reject(reason) => return Err(LedgerError::rejected(reason)),
            SubmitBehaviour::Unreachable => {
                return Err(LedgerError::unavailable("connection refused"))
            }
            SubmitBehaviour::Stall(delay) => tokio::time::sleep(delay).await,
        }

        let hash = self.accept(submission);
        log::debug!("Simulated ledger accepted {} for claim {}", hash.short(), submission.claim_id);
        Ok(hash)
    }

    async fn get_receipt(&self, tx: &TxHash) -> LedgerResult<LedgerReceipt> {
        let mut state = self.lock();
        if state.failing_receipt_reads > 0 {
            state.failing_receipt_reads -= 1;
            return Err(LedgerError::unavailable("receipt lookup failed"));
        }

        let Some((status, block)) = state.outcomes.get(tx).copied() else {
            return Ok(LedgerReceipt::unknown());
        };

        let raw = json!({
            "transactionHash": tx.as_str(),
            "blockNumber": format!("0x{:x}", block),
            "gasUsed": format!("0x{:x}", GAS_PER_SUBMISSION),
            "status": if status == ReceiptStatus::Success { "0x1" } else { "0x0" },
            "logs": [],
        });

        Ok(LedgerReceipt {
            status,
            effects: Some(LedgerEffects {
                block_number: Some(block),
                gas_used: Some(GAS_PER_SUBMISSION),
                logs: Vec::new(),
                raw,
            }),
        })
    }
}

#[async_trait]
impl LedgerAdmin for SimulatedLedger {
    async fn authorize_oracle(&self, address: &str) -> LedgerResult<TxHash> {
        let hash = self.admin_hash("authorizeOracle", address);
        self.lock().authorized_oracles.push(address.to_ascii_lowercase());
        Ok(hash)
    }

    async fn execute_payout(&self, claim_id: u64) -> LedgerResult<TxHash> {
        let hash = self.admin_hash("executePayout", &claim_id.to_string());
        self.lock().executed_payouts.push(claim_id);
        Ok(hash)
    }
}
