//! # Claims Module
//!
//! Claim records and their lifecycle.
//!
//! ## Lifecycle
//!
//! ```text
//! submitted -> predicted -> onchain_submitted -> paid_out | no_payout | onchain_failed
//!                  |               ^
//!                  v               |
//!            onchain_error --------+
//! ```
//!
//! A claim's status is derived from its verdict and ledger fields. Every change
//! goes through [`ClaimRecord::apply`], which only moves forward along the
//! graph above and never replaces a recorded transaction.

pub mod model;
pub mod store;

mod tests;

pub use model::{ClaimId, ClaimRecord, ClaimStatus, LedgerOutcome, OnchainStatus, Transition};
pub use store::{ClaimStore, FileClaimStore, InMemoryClaimStore, TransitionOutcome};
