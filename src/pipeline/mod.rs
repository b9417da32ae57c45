//! # Claim Pipeline
//!
//! Orchestrates one claim from evaluation to on-chain settlement:
//!
//! 1. check the land/farmer reference against the registry
//! 2. merge and validate both feature payloads
//! 3. predict and store the verdict (`submitted -> predicted`)
//! 4. submit the verdict to the ledger (`onchain_submitted` or `onchain_error`)
//! 5. reconcile the transaction later, on demand or from the background worker
//!
//! A failed submission never rolls back the verdict. Each claim has at most
//! one submission in flight, and every state change goes through the claim
//! store's compare-and-swap transition. A transaction the ledger accepted but
//! the store could not record is held until recording succeeds; the claim is
//! never submitted a second time meanwhile.

pub mod worker;

mod tests;

use crate::claims::{
    ClaimId, ClaimRecord, ClaimStatus, ClaimStore, LedgerOutcome, OnchainStatus, Transition,
};
use crate::config::RuntimeConfig;
use crate::error::{ClaimError, ClaimResult};
use crate::features::{FeatureMap, FeatureMerger};
use crate::prediction::PredictionService;
use crate::registry::LandRegistry;
use crate::services::ledger::{Ledger, LedgerEffects, OracleSubmission, TxHash};
use crate::services::webhook_client::{NotificationOutcome, PredictionNotice, PredictionWebhook};
use crate::settlement::{LedgerStatus, OracleSubmitter, ReceiptReconciler, SubmissionMode};
use crate::utils::payout;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use worker::{ReconcileQueue, ReconcileWorker};

/// Conceptual evaluate request: claim references plus both model payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub farmer_id: u64,
    pub land_id: u64,
    /// Stress-classifier features
    #[serde(default)]
    pub model1: FeatureMap,
    /// Payout-estimator features
    #[serde(default)]
    pub model2: FeatureMap,
}

/// Outcome of the submission step of an evaluation
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OnchainSubmission {
    Submitted {
        transaction_id: TxHash,
        onchain_status: OnchainStatus,
    },
    Error {
        error: String,
    },
}

impl OnchainSubmission {
    /// `unrecorded` is a transaction the ledger accepted for this claim that
    /// the store has not recorded yet.
    fn from_record(record: &ClaimRecord, unrecorded: Option<TxHash>) -> Self {
        match (&record.onchain_tx, unrecorded, &record.submission_error) {
            (Some(tx), _, _) => OnchainSubmission::Submitted {
                transaction_id: tx.clone(),
                onchain_status: record.onchain_status.unwrap_or(OnchainStatus::Pending),
            },
            (None, Some(tx), _) => OnchainSubmission::Submitted {
                transaction_id: tx,
                onchain_status: OnchainStatus::Pending,
            },
            (None, None, Some(error)) => OnchainSubmission::Error {
                error: error.clone(),
            },
            (None, None, None) => OnchainSubmission::Error {
                error: "not submitted".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluateResponse {
    pub claim_id: ClaimId,
    pub land_id: u64,
    pub farmer_id: u64,
    pub is_stressed: bool,
    /// Four decimals
    pub probability: f64,
    /// Two decimals
    pub payout_percentage: f64,
    pub status: ClaimStatus,
    pub onchain_submission: OnchainSubmission,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationOutcome>,
    pub ts: DateTime<Utc>,
}

/// Answer to a status query
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub claim_id: ClaimId,
    pub claim_status: ClaimStatus,
    pub onchain_status: Option<OnchainStatus>,
    pub transaction_id: TxHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects: Option<LedgerEffects>,
}

/// Counts from one sweep over pending claims
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub checked: usize,
    pub settled: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Releases a claim's in-flight slot when the submission attempt ends
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<ClaimId>>,
    claim_id: ClaimId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<ClaimId>>, claim_id: ClaimId) -> ClaimResult<Self> {
        let mut claims = in_flight
            .lock()
            .map_err(|_| ClaimError::storage("in-flight set lock poisoned"))?;
        if !claims.insert(claim_id) {
            return Err(ClaimError::SubmissionInFlight {
                claim_id: claim_id.0,
            });
        }
        Ok(Self {
            in_flight,
            claim_id,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.in_flight.lock() {
            claims.remove(&self.claim_id);
        }
    }
}

/// Claim evaluation and settlement orchestrator
pub struct ClaimPipeline {
    registry: Arc<dyn LandRegistry>,
    store: Arc<dyn ClaimStore>,
    predictor: PredictionService,
    merger: FeatureMerger,
    submitter: OracleSubmitter,
    reconciler: ReceiptReconciler,
    webhook: Option<PredictionWebhook>,
    reconcile_queue: Option<ReconcileQueue>,
    mode: SubmissionMode,
    confirmation_timeout: Duration,
    receipt_poll_interval: Duration,
    in_flight: Mutex<HashSet<ClaimId>>,
    /// Accepted by the ledger, not yet recorded by the store
    unrecorded: Mutex<HashMap<ClaimId, TxHash>>,
}

/// Builder for [`ClaimPipeline`]
pub struct ClaimPipelineBuilder {
    registry: Arc<dyn LandRegistry>,
    store: Arc<dyn ClaimStore>,
    ledger: Arc<dyn Ledger>,
    predictor: PredictionService,
    webhook: Option<PredictionWebhook>,
    reconcile_queue: Option<ReconcileQueue>,
    mode: SubmissionMode,
    runtime: RuntimeConfig,
}

impl ClaimPipelineBuilder {
    pub fn predictor(mut self, predictor: PredictionService) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn webhook(mut self, webhook: PredictionWebhook) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn reconcile_queue(mut self, queue: ReconcileQueue) -> Self {
        self.reconcile_queue = Some(queue);
        self
    }

    pub fn mode(mut self, mode: SubmissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn build(self) -> ClaimPipeline {
        ClaimPipeline {
            registry: self.registry,
            store: self.store,
            predictor: self.predictor,
            merger: FeatureMerger::new(),
            submitter: OracleSubmitter::new(self.ledger.clone(), self.runtime.submit_timeout),
            reconciler: ReceiptReconciler::new(self.ledger),
            webhook: self.webhook,
            reconcile_queue: self.reconcile_queue,
            mode: self.mode,
            confirmation_timeout: self.runtime.confirmation_timeout,
            receipt_poll_interval: self.runtime.receipt_poll_interval,
            in_flight: Mutex::new(HashSet::new()),
            unrecorded: Mutex::new(HashMap::new()),
        }
    }
}

impl ClaimPipeline {
    /// Start a pipeline over the given collaborators, with heuristic models,
    /// fire-and-forget submission and default timings.
    pub fn builder(
        registry: Arc<dyn LandRegistry>,
        store: Arc<dyn ClaimStore>,
        ledger: Arc<dyn Ledger>,
    ) -> ClaimPipelineBuilder {
        ClaimPipelineBuilder {
            registry,
            store,
            ledger,
            predictor: PredictionService::heuristic(),
            webhook: None,
            reconcile_queue: None,
            mode: SubmissionMode::default(),
            runtime: RuntimeConfig::default(),
        }
    }

    pub fn mode(&self) -> SubmissionMode {
        self.mode
    }

    /// Register a new claim in `submitted`
    pub fn create_claim(&self, land_id: u64, farmer_id: u64) -> ClaimResult<ClaimRecord> {
        self.registry.verify(land_id, farmer_id)?;
        self.store.create(land_id, farmer_id)
    }

    /// Create a claim and evaluate it in one go
    pub async fn submit_claim(&self, request: EvaluateRequest) -> ClaimResult<EvaluateResponse> {
        let claim = self.create_claim(request.land_id, request.farmer_id)?;
        self.evaluate(claim.id, &request.model1, &request.model2)
            .await
    }

    /// Evaluate a `submitted` claim and attempt its submission.
    ///
    /// Errors before the verdict is stored leave the claim untouched. Once it
    /// is stored, the response always carries the verdict, whatever the
    /// ledger did.
    pub async fn evaluate(
        &self,
        claim_id: ClaimId,
        model1: &FeatureMap,
        model2: &FeatureMap,
    ) -> ClaimResult<EvaluateResponse> {
        let claim = self.store.get(claim_id)?;
        if claim.status() != ClaimStatus::Submitted {
            return Err(ClaimError::AlreadyEvaluated {
                claim_id: claim_id.0,
            });
        }

        let land = self.registry.verify(claim.land_id, claim.farmer_id)?;
        let features = self.merger.merge(model1, model2, &land.crop_type)?;
        let verdict = self.predictor.predict(&features)?;

        let predicted = self
            .store
            .transition(claim_id, Transition::RecordVerdict { verdict, features })?
            .record;
        log::info!(
            "Claim {} predicted: stressed={} payout={:.2}%",
            claim_id,
            predicted.verdict.as_ref().map_or(false, |v| v.is_stressed),
            predicted.verdict.as_ref().map_or(0.0, |v| v.payout_percentage)
        );

        let record = match self.submit_verdict(claim_id).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("Claim {} kept its verdict; submission step failed: {}", claim_id, e);
                self.store.get(claim_id)?
            }
        };

        let notification = match &self.webhook {
            Some(webhook) => {
                let notice = self.notice(&record, land.farmer_wallet.clone())?;
                Some(webhook.push(&notice).await)
            }
            None => None,
        };

        self.response(&record, notification)
    }

    /// Send a stored verdict to the ledger, from `predicted` or `onchain_error`.
    ///
    /// A ledger failure is recorded on the claim and is not an error here; the
    /// returned record tells which way it went. If an earlier attempt left an
    /// unrecorded transaction, that transaction is recorded instead and
    /// nothing is sent.
    pub async fn submit_verdict(&self, claim_id: ClaimId) -> ClaimResult<ClaimRecord> {
        let _guard = InFlightGuard::acquire(&self.in_flight, claim_id)?;

        if let Some(tx) = self.unrecorded_tx(claim_id)? {
            log::warn!(
                "Claim {}: recording earlier transaction {} instead of resubmitting",
                claim_id,
                tx.short()
            );
            let record = self.record_submission(claim_id, &tx)?;
            return self.follow_submission(claim_id, record, &tx).await;
        }

        let claim = self.store.get(claim_id)?;
        let status = claim.status();
        if !status.is_submittable() {
            return Err(match &claim.onchain_tx {
                Some(existing) => ClaimError::DuplicateSubmission {
                    claim_id: claim_id.0,
                    existing: existing.to_string(),
                },
                None => ClaimError::transition(status, ClaimStatus::OnchainSubmitted),
            });
        }
        let verdict = claim
            .verdict
            .as_ref()
            .ok_or_else(|| ClaimError::transition(status, ClaimStatus::OnchainSubmitted))?;

        let submission = OracleSubmission::from_verdict(claim_id.0, verdict);
        let tx = match self.submitter.submit(&submission).await {
            Ok(tx) => tx,
            Err(e) => {
                let outcome = self.store.transition(
                    claim_id,
                    Transition::RecordSubmissionFailure {
                        reason: e.to_string(),
                    },
                )?;
                log::warn!("Claim {} is now onchain_error", claim_id);
                return Ok(outcome.record);
            }
        };

        let record = self.record_submission(claim_id, &tx)?;
        self.follow_submission(claim_id, record, &tx).await
    }

    /// One reconciliation step for a claim holding a transaction
    pub async fn reconcile(&self, claim_id: ClaimId) -> ClaimResult<(ClaimRecord, LedgerStatus)> {
        let claim = self.store.get(claim_id)?;
        let tx = match (claim.onchain_tx.clone(), self.unrecorded_tx(claim_id)?) {
            (Some(tx), _) => tx,
            (None, Some(tx)) => {
                self.record_submission(claim_id, &tx)?;
                tx
            }
            (None, None) => {
                return Err(ClaimError::NoSubmission {
                    claim_id: claim_id.0,
                })
            }
        };

        let status = self.reconciler.check_status(&tx).await.map_err(|e| {
            log::warn!("Reconciliation of claim {} failed: {}", claim_id, e);
            e
        })?;
        let record = self.apply_ledger_status(claim_id, &status)?;
        Ok((record, status))
    }

    /// Status query: reconcile once, then report
    pub async fn tx_status(&self, claim_id: ClaimId) -> ClaimResult<StatusResponse> {
        let (record, status) = self.reconcile(claim_id).await?;
        let transaction_id = record.onchain_tx.clone().ok_or(ClaimError::NoSubmission {
            claim_id: claim_id.0,
        })?;

        Ok(StatusResponse {
            claim_id,
            claim_status: record.status(),
            onchain_status: record.onchain_status,
            transaction_id,
            effects: status.effects().cloned(),
        })
    }

    /// Reconcile every claim currently in `onchain_submitted`
    pub async fn reconcile_pending(&self) -> ClaimResult<ReconcileSummary> {
        let pending = self.store.list(Some(ClaimStatus::OnchainSubmitted))?;
        let mut summary = ReconcileSummary::default();

        for claim in pending {
            summary.checked += 1;
            match self.reconcile(claim.id).await {
                Ok((record, _)) if record.status().is_terminal() => summary.settled += 1,
                Ok(_) => summary.still_pending += 1,
                Err(_) => summary.errors += 1,
            }
        }

        if summary.checked > 0 {
            log::info!(
                "Reconciled {} claims: {} settled, {} pending, {} errors",
                summary.checked,
                summary.settled,
                summary.still_pending,
                summary.errors
            );
        }
        Ok(summary)
    }

    pub fn claim(&self, claim_id: ClaimId) -> ClaimResult<ClaimRecord> {
        self.store.get(claim_id)
    }

    pub fn claims(&self, status: Option<ClaimStatus>) -> ClaimResult<Vec<ClaimRecord>> {
        self.store.list(status)
    }

    fn unrecorded_tx(&self, claim_id: ClaimId) -> ClaimResult<Option<TxHash>> {
        let unrecorded = self
            .unrecorded
            .lock()
            .map_err(|_| ClaimError::storage("unrecorded transaction map lock poisoned"))?;
        Ok(unrecorded.get(&claim_id).cloned())
    }

    /// Store an accepted transaction on its claim. On failure the hash is kept
    /// for the next attempt and the claim is queued so the worker retries.
    fn record_submission(&self, claim_id: ClaimId, tx: &TxHash) -> ClaimResult<ClaimRecord> {
        let recorded = self
            .store
            .transition(claim_id, Transition::RecordSubmission { tx: tx.clone() });
        let mut unrecorded = self
            .unrecorded
            .lock()
            .map_err(|_| ClaimError::storage("unrecorded transaction map lock poisoned"))?;

        match recorded {
            Ok(outcome) => {
                unrecorded.remove(&claim_id);
                Ok(outcome.record)
            }
            Err(e @ ClaimError::DuplicateSubmission { .. }) => {
                log::error!("Claim {}: dropping transaction {}: {}", claim_id, tx, e);
                unrecorded.remove(&claim_id);
                Err(e)
            }
            Err(e) => {
                log::error!(
                    "Claim {}: transaction {} was sent but could not be recorded: {}",
                    claim_id,
                    tx,
                    e
                );
                unrecorded.insert(claim_id, tx.clone());
                drop(unrecorded);
                if let Some(queue) = &self.reconcile_queue {
                    queue.enqueue(claim_id);
                }
                Err(e)
            }
        }
    }

    /// What happens after a recorded submission depends on the mode
    async fn follow_submission(
        &self,
        claim_id: ClaimId,
        record: ClaimRecord,
        tx: &TxHash,
    ) -> ClaimResult<ClaimRecord> {
        match self.mode {
            SubmissionMode::FireAndForget => {
                if let Some(queue) = &self.reconcile_queue {
                    queue.enqueue(claim_id);
                }
                Ok(record)
            }
            SubmissionMode::WaitForConfirmation => {
                let status = self
                    .reconciler
                    .wait_for_outcome(tx, self.confirmation_timeout, self.receipt_poll_interval)
                    .await;
                if !status.is_terminal() {
                    if let Some(queue) = &self.reconcile_queue {
                        queue.enqueue(claim_id);
                    }
                }
                self.apply_ledger_status(claim_id, &status)
            }
        }
    }

    fn apply_ledger_status(
        &self,
        claim_id: ClaimId,
        status: &LedgerStatus,
    ) -> ClaimResult<ClaimRecord> {
        let outcome = match status {
            LedgerStatus::Pending => return self.store.get(claim_id),
            LedgerStatus::Success { .. } => LedgerOutcome::Success,
            LedgerStatus::Failed { .. } => LedgerOutcome::Failed,
        };

        let result = self
            .store
            .transition(claim_id, Transition::RecordLedgerOutcome { outcome })?;
        if result.changed {
            log::info!("Claim {} settled: {}", claim_id, result.record.status());
        }
        Ok(result.record)
    }

    fn notice(
        &self,
        record: &ClaimRecord,
        farmer_wallet: Option<String>,
    ) -> ClaimResult<PredictionNotice> {
        let verdict = record
            .verdict
            .as_ref()
            .ok_or_else(|| ClaimError::transition(record.status(), ClaimStatus::Predicted))?;
        Ok(PredictionNotice {
            policy_id: record.land_id,
            claim_id: record.id.0,
            land_id: record.land_id,
            is_stressed: verdict.is_stressed,
            payout: payout::round_to(verdict.payout_percentage, 2),
            probability: payout::round_to(verdict.stress_probability, 4),
            farmer_wallet,
        })
    }

    fn response(
        &self,
        record: &ClaimRecord,
        notification: Option<NotificationOutcome>,
    ) -> ClaimResult<EvaluateResponse> {
        let verdict = record
            .verdict
            .as_ref()
            .ok_or_else(|| ClaimError::transition(record.status(), ClaimStatus::Predicted))?;
        let unrecorded = self.unrecorded_tx(record.id)?;

        Ok(EvaluateResponse {
            claim_id: record.id,
            land_id: record.land_id,
            farmer_id: record.farmer_id,
            is_stressed: verdict.is_stressed,
            probability: payout::round_to(verdict.stress_probability, 4),
            payout_percentage: payout::round_to(verdict.payout_percentage, 2),
            status: record.status(),
            onchain_submission: OnchainSubmission::from_record(record, unrecorded),
            notification,
            ts: Utc::now(),
        })
    }
}
