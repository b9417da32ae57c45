use crate::error::{ClaimError, ClaimResult};
use crate::services::ledger::{Ledger, LedgerEffects, ReceiptStatus, TxHash};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Ledger view of one transaction, as reported to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    Success { effects: LedgerEffects },
    Failed { effects: LedgerEffects },
}

impl LedgerStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LedgerStatus::Pending)
    }

    pub fn effects(&self) -> Option<&LedgerEffects> {
        match self {
            LedgerStatus::Pending => None,
            LedgerStatus::Success { effects } | LedgerStatus::Failed { effects } => Some(effects),
        }
    }
}

/// Looks transactions up on the ledger. Holds no claim state.
#[derive(Clone)]
pub struct ReceiptReconciler {
    ledger: Arc<dyn Ledger>,
}

impl ReceiptReconciler {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn check_status(&self, tx: &TxHash) -> ClaimResult<LedgerStatus> {
        let receipt = self
            .ledger
            .get_receipt(tx)
            .await
            .map_err(|source| ClaimError::Reconciliation {
                transaction: tx.to_string(),
                source,
            })?;

        let effects = receipt.effects.unwrap_or_default();
        Ok(match receipt.status {
            ReceiptStatus::Unknown => LedgerStatus::Pending,
            ReceiptStatus::Success => LedgerStatus::Success { effects },
            ReceiptStatus::Failed => LedgerStatus::Failed { effects },
        })
    }

    /// Poll until the transaction settles or `timeout` elapses.
    ///
    /// Lookup errors are logged and retried on the next poll. Returns
    /// [`LedgerStatus::Pending`] if nothing terminal was seen in time.
    pub async fn wait_for_outcome(
        &self,
        tx: &TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> LedgerStatus {
        let deadline = Instant::now() + timeout;
        log::info!("Waiting up to {:?} for {}", timeout, tx.short());

        loop {
            match self.check_status(tx).await {
                Ok(status) if status.is_terminal() => return status,
                Ok(_) => log::debug!("{} still pending", tx.short()),
                Err(e) => log::warn!("Receipt lookup failed, will retry: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                log::info!("{} not settled after {:?}", tx.short(), timeout);
                return LedgerStatus::Pending;
            }
            sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
