use crate::error::{ClaimError, ClaimResult, LedgerError};
use crate::services::ledger::{Ledger, OracleSubmission, TxHash};
use std::sync::Arc;
use std::time::Duration;

/// How long an evaluate call waits on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionMode {
    /// Return as soon as the transaction is accepted; reconcile later
    #[default]
    FireAndForget,
    /// Poll for the receipt until a terminal result or the confirmation timeout
    WaitForConfirmation,
}

/// Sends verdicts to the ledger under a bounded timeout
#[derive(Clone)]
pub struct OracleSubmitter {
    ledger: Arc<dyn Ledger>,
    submit_timeout: Duration,
}

impl OracleSubmitter {
    pub fn new(ledger: Arc<dyn Ledger>, submit_timeout: Duration) -> Self {
        Self {
            ledger,
            submit_timeout,
        }
    }

    /// Submit one verdict.
    ///
    /// A call that outlives the submit timeout is abandoned and reported as a
    /// [`LedgerError::Timeout`]; the caller records it like any other failure.
    pub async fn submit(&self, submission: &OracleSubmission) -> ClaimResult<TxHash> {
        let claim_id = submission.claim_id;
        let result = tokio::time::timeout(
            self.submit_timeout,
            self.ledger.submit_oracle_data(submission),
        )
        .await;

        match result {
            Ok(Ok(tx)) => {
                log::info!(
                    "Claim {} submitted on-chain: {} (stress={}, payout={})",
                    claim_id,
                    tx.short(),
                    submission.stress_level,
                    submission.payout_scaled
                );
                Ok(tx)
            }
            Ok(Err(source)) => {
                log::error!("Claim {} submission failed: {}", claim_id, source);
                Err(ClaimError::Submission { claim_id, source })
            }
            Err(_) => {
                log::error!(
                    "Claim {} submission timed out after {:?}",
                    claim_id,
                    self.submit_timeout
                );
                Err(ClaimError::Submission {
                    claim_id,
                    source: LedgerError::Timeout {
                        seconds: self.submit_timeout.as_secs(),
                    },
                })
            }
        }
    }
}
