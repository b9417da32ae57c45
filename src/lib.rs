//! # CropGuard: Crop-Stress Claim Evaluation and Settlement
//!
//! Core library for evaluating parametric crop-insurance claims from remote
//! sensing features and settling the verdicts through an on-chain oracle
//! contract.
//!
//! ```text
//! submitted ──> predicted ──> onchain_submitted ──> paid_out | no_payout | onchain_failed
//!                   │                 ▲
//!                   └──> onchain_error┘ (resubmit)
//! ```

pub mod claims;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod prediction;
pub mod registry;
pub mod services;
pub mod settlement;
pub mod utils;

// Re-export commonly used types
pub use claims::{ClaimId, ClaimRecord, ClaimStatus, ClaimStore, FileClaimStore, InMemoryClaimStore};
pub use error::{ClaimError, ClaimResult, LedgerError};
pub use pipeline::{ClaimPipeline, EvaluateRequest, EvaluateResponse, ReconcileWorker};
pub use prediction::{PredictionService, Verdict};
pub use registry::{LandRecord, LandRegistry, StaticLandRegistry};
pub use services::{JsonRpcLedger, Ledger, SimulatedLedger, TxHash};
