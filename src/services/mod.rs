//! # Services Module
//!
//! External service integrations for claim settlement.
//!
//! ## Components
//!
//! - **Ledger**: the boundary the pipeline settles through, with a JSON-RPC
//!   client for the insurance pool contract and an in-memory simulation
//! - **Webhook Client**: pushes evaluated verdicts to an oracle node job

pub mod ledger;
pub mod rpc_client;
pub mod simulated_ledger;
pub mod webhook_client;

pub use ledger::{
    Ledger, LedgerAdmin, LedgerEffects, LedgerReceipt, OracleSubmission, ReceiptStatus, TxHash,
};
pub use rpc_client::{JsonRpcLedger, LedgerConfig};
pub use simulated_ledger::{SimulatedLedger, SubmitBehaviour};
pub use webhook_client::{NotificationOutcome, PredictionNotice, PredictionWebhook, WebhookConfig};
