//! Background reconciliation.
//!
//! Fire-and-forget submissions hand their claim id to a [`ReconcileQueue`].
//! The [`ReconcileWorker`] owns the set of claims awaiting a ledger result and
//! re-checks them on a fixed interval until each one settles.

use super::{ClaimPipeline, ReconcileSummary};
use crate::claims::{ClaimId, ClaimStatus};
use crate::error::ClaimResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sending half held by the pipeline
#[derive(Debug, Clone)]
pub struct ReconcileQueue {
    sender: mpsc::UnboundedSender<ClaimId>,
}

impl ReconcileQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClaimId>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, claim_id: ClaimId) {
        if self.sender.send(claim_id).is_err() {
            log::debug!("Reconcile worker gone; claim {} left for the next sweep", claim_id);
        }
    }
}

pub struct ReconcileWorker {
    pipeline: Arc<ClaimPipeline>,
    receiver: mpsc::UnboundedReceiver<ClaimId>,
    interval: Duration,
    pending: BTreeSet<ClaimId>,
}

impl ReconcileWorker {
    pub fn new(
        pipeline: Arc<ClaimPipeline>,
        receiver: mpsc::UnboundedReceiver<ClaimId>,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            receiver,
            interval,
            pending: BTreeSet::new(),
        }
    }

    /// Pick up stored claims in `onchain_submitted`, including those written
    /// by earlier runs or other processes. Returns how many were new.
    pub fn seed(&mut self) -> ClaimResult<usize> {
        let before = self.pending.len();
        for claim in self.pipeline.claims(Some(ClaimStatus::OnchainSubmitted))? {
            self.pending.insert(claim.id);
        }
        Ok(self.pending.len() - before)
    }

    pub fn pending(&self) -> Vec<ClaimId> {
        self.pending.iter().copied().collect()
    }

    fn drain_queue(&mut self) {
        while let Ok(claim_id) = self.receiver.try_recv() {
            self.pending.insert(claim_id);
        }
    }

    /// Check every pending claim once. Settled claims leave the set; lookup
    /// failures stay for the next round.
    pub async fn poll_once(&mut self) -> ReconcileSummary {
        self.drain_queue();
        let mut summary = ReconcileSummary::default();

        for claim_id in self.pending.clone() {
            summary.checked += 1;
            match self.pipeline.reconcile(claim_id).await {
                Ok((record, _)) if record.status() == ClaimStatus::OnchainSubmitted => {
                    summary.still_pending += 1;
                }
                Ok((record, _)) => {
                    summary.settled += 1;
                    self.pending.remove(&claim_id);
                    log::debug!("Claim {} left the reconcile set as {}", claim_id, record.status());
                }
                Err(e) if e.is_not_found() => {
                    summary.errors += 1;
                    self.pending.remove(&claim_id);
                    log::warn!("Dropping claim {} from reconciliation: {}", claim_id, e);
                }
                Err(e) => {
                    summary.errors += 1;
                    log::debug!("Claim {} stays pending: {}", claim_id, e);
                }
            }
        }
        summary
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ClaimResult<()> {
        let seeded = self.seed()?;
        log::info!(
            "Reconcile worker started: {} claims pending, every {:?}",
            seeded,
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(claim_id) = self.receiver.recv() => {
                    self.pending.insert(claim_id);
                }
                _ = ticker.tick() => {
                    // Other processes may have submitted claims since the last sweep.
                    if let Err(e) = self.seed() {
                        log::warn!("Could not list pending claims: {}", e);
                    }
                    if !self.pending.is_empty() {
                        self.poll_once().await;
                    }
                }
            }
        }

        log::info!("Reconcile worker stopped with {} claims pending", self.pending.len());
        Ok(())
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<ClaimResult<()>> {
        tokio::spawn(self.run(shutdown))
    }
}
