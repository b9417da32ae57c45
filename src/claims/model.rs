use crate::error::{ClaimError, ClaimResult};
use crate::features::MergedFeatures;
use crate::prediction::Verdict;
use crate::services::ledger::TxHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sequential claim identifier, also used as the on-chain policy argument
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ClaimId(pub u64);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle position of a claim
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Submitted,
    Predicted,
    OnchainSubmitted,
    OnchainError,
    PaidOut,
    NoPayout,
    OnchainFailed,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 7] = [
        ClaimStatus::Submitted,
        ClaimStatus::Predicted,
        ClaimStatus::OnchainSubmitted,
        ClaimStatus::OnchainError,
        ClaimStatus::PaidOut,
        ClaimStatus::NoPayout,
        ClaimStatus::OnchainFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::Predicted => "predicted",
            ClaimStatus::OnchainSubmitted => "onchain_submitted",
            ClaimStatus::OnchainError => "onchain_error",
            ClaimStatus::PaidOut => "paid_out",
            ClaimStatus::NoPayout => "no_payout",
            ClaimStatus::OnchainFailed => "onchain_failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClaimStatus::PaidOut | ClaimStatus::NoPayout | ClaimStatus::OnchainFailed
        )
    }

    /// A verdict exists that may be (re)sent to the ledger
    pub fn is_submittable(self) -> bool {
        matches!(self, ClaimStatus::Predicted | ClaimStatus::OnchainError)
    }

    /// Edges of the lifecycle graph. Staying in place is always allowed.
    pub fn can_advance_to(self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        self == next
            || matches!(
                (self, next),
                (Submitted, Predicted)
                    | (Predicted, OnchainSubmitted)
                    | (Predicted, OnchainError)
                    | (OnchainError, OnchainSubmitted)
                    | (OnchainSubmitted, PaidOut)
                    | (OnchainSubmitted, NoPayout)
                    | (OnchainSubmitted, OnchainFailed)
            )
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClaimStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = ClaimStatus::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown claim status '{}', expected one of {}", s, names.join(", "))
            })
    }
}

/// Ledger-side state of the recorded transaction
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnchainStatus {
    Pending,
    Success,
    Failed,
}

impl fmt::Display for OnchainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnchainStatus::Pending => write!(f, "pending"),
            OnchainStatus::Success => write!(f, "success"),
            OnchainStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal ledger result observed by reconciliation
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOutcome {
    Success,
    Failed,
}

impl From<LedgerOutcome> for OnchainStatus {
    fn from(outcome: LedgerOutcome) -> Self {
        match outcome {
            LedgerOutcome::Success => OnchainStatus::Success,
            LedgerOutcome::Failed => OnchainStatus::Failed,
        }
    }
}

/// Persisted claim. The lifecycle status is derived from these fields rather
/// than stored, so it cannot disagree with them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClaimRecord {
    pub id: ClaimId,
    pub land_id: u64,
    pub farmer_id: u64,
    pub verdict: Option<Verdict>,
    /// Exact model inputs behind the verdict
    pub features: Option<MergedFeatures>,
    pub onchain_tx: Option<TxHash>,
    pub onchain_status: Option<OnchainStatus>,
    /// Reason the latest submission attempt produced no transaction
    pub submission_error: Option<String>,
    #[serde(default)]
    pub submission_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested change to a claim
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `submitted -> predicted`
    RecordVerdict {
        verdict: Verdict,
        features: MergedFeatures,
    },
    /// `predicted | onchain_error -> onchain_submitted`
    RecordSubmission { tx: TxHash },
    /// `predicted | onchain_error -> onchain_error`
    RecordSubmissionFailure { reason: String },
    /// `onchain_submitted -> paid_out | no_payout | onchain_failed`
    RecordLedgerOutcome { outcome: LedgerOutcome },
}

impl ClaimRecord {
    pub fn new(id: ClaimId, land_id: u64, farmer_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            land_id,
            farmer_id,
            verdict: None,
            features: None,
            onchain_tx: None,
            onchain_status: None,
            submission_error: None,
            submission_attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ClaimStatus {
        let Some(verdict) = &self.verdict else {
            return ClaimStatus::Submitted;
        };

        if self.onchain_tx.is_none() {
            return if self.submission_error.is_some() {
                ClaimStatus::OnchainError
            } else {
                ClaimStatus::Predicted
            };
        }

        match self.onchain_status {
            Some(OnchainStatus::Success) if verdict.is_stressed => ClaimStatus::PaidOut,
            Some(OnchainStatus::Success) => ClaimStatus::NoPayout,
            Some(OnchainStatus::Failed) => ClaimStatus::OnchainFailed,
            Some(OnchainStatus::Pending) | None => ClaimStatus::OnchainSubmitted,
        }
    }

    /// Apply a transition in place.
    ///
    /// Returns `Ok(false)` when the claim already reflects the transition
    /// (same transaction recorded again, same ledger outcome observed again),
    /// so callers can treat repeats as no-ops.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> ClaimResult<bool> {
        let current = self.status();

        match transition {
            Transition::RecordVerdict { verdict, features } => {
                if current != ClaimStatus::Submitted {
                    return Err(ClaimError::AlreadyEvaluated {
                        claim_id: self.id.0,
                    });
                }
                self.verdict = Some(verdict);
                self.features = Some(features);
            }

            Transition::RecordSubmission { tx } => {
                if let Some(existing) = &self.onchain_tx {
                    if *existing == tx {
                        return Ok(false);
                    }
                    return Err(ClaimError::DuplicateSubmission {
                        claim_id: self.id.0,
                        existing: existing.to_string(),
                    });
                }
                if !current.is_submittable() {
                    return Err(ClaimError::transition(current, "onchain_submitted"));
                }
                self.onchain_tx = Some(tx);
                self.onchain_status = Some(OnchainStatus::Pending);
                self.submission_error = None;
                self.submission_attempts += 1;
            }

            Transition::RecordSubmissionFailure { reason } => {
                if !current.is_submittable() {
                    return Err(ClaimError::transition(current, "onchain_error"));
                }
                self.submission_error = Some(reason);
                self.submission_attempts += 1;
            }

            Transition::RecordLedgerOutcome { outcome } => {
                let observed = OnchainStatus::from(outcome);
                match current {
                    ClaimStatus::OnchainSubmitted => {
                        self.onchain_status = Some(observed);
                    }
                    _ if current.is_terminal() && self.onchain_status == Some(observed) => {
                        return Ok(false);
                    }
                    _ => {
                        return Err(ClaimError::transition(
                            current,
                            format!("ledger {}", observed),
                        ))
                    }
                }
            }
        }

        let next = self.status();
        debug_assert!(current.can_advance_to(next), "{} -> {}", current, next);
        self.updated_at = now;
        log::debug!("Claim {}: {} -> {}", self.id, current, next);
        Ok(true)
    }
}
