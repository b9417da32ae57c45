//! # Settlement Module
//!
//! The two ledger-facing halves of claim settlement:
//!
//! - **OracleSubmitter**: phase one, best effort. Sends a verdict and returns
//!   the transaction hash, bounded by the submit timeout.
//! - **ReceiptReconciler**: phase two. Reads the ledger's verdict on a
//!   transaction; the pipeline decides what that means for the claim.

pub mod reconciler;
pub mod submitter;

pub use reconciler::{LedgerStatus, ReceiptReconciler};
pub use submitter::{OracleSubmitter, SubmissionMode};
