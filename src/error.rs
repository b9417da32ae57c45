//! # Error Types for Claim Evaluation and Settlement
//!
//! Errors raised while evaluating claims, persisting their lifecycle and
//! talking to the settlement ledger.

use thiserror::Error;

/// Main error type for claim pipeline operations
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Land does not exist or belongs to a different farmer
    #[error("Invalid reference: land {land_id} is not registered to farmer {farmer_id}")]
    InvalidReference { land_id: u64, farmer_id: u64 },

    /// Required feature keys still unset after merging and fallbacks
    #[error("Incomplete {schema} features: missing {}", missing.join(", "))]
    IncompleteFeatures {
        schema: &'static str,
        missing: Vec<String>,
    },

    /// Prediction failed or produced an unusable value
    #[error("Inference error: {message}")]
    Inference { message: String },

    /// Ledger rejected or never acknowledged the oracle submission
    #[error("Submission for claim {claim_id} failed: {source}")]
    Submission {
        claim_id: u64,
        #[source]
        source: LedgerError,
    },

    /// Ledger query for a submitted transaction failed
    #[error("Reconciliation of {transaction} failed: {source}")]
    Reconciliation {
        transaction: String,
        #[source]
        source: LedgerError,
    },

    #[error("Claim {claim_id} not found")]
    ClaimNotFound { claim_id: u64 },

    /// Status was queried for a claim that never obtained a transaction
    #[error("No on-chain submission recorded for claim {claim_id}")]
    NoSubmission { claim_id: u64 },

    /// Verdicts are write-once; a fresh claim is needed to re-evaluate
    #[error("Claim {claim_id} has already been evaluated")]
    AlreadyEvaluated { claim_id: u64 },

    /// Another caller is currently submitting this claim
    #[error("Submission already in flight for claim {claim_id}")]
    SubmissionInFlight { claim_id: u64 },

    /// A second, different transaction was offered for a claim
    #[error("Claim {claim_id} already holds transaction {existing}")]
    DuplicateSubmission { claim_id: u64, existing: String },

    /// Invalid state transitions in the claim lifecycle
    #[error("Invalid claim state transition from {current} to {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// Missing or malformed startup configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Persistence failures other than I/O and encoding
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for claim operations
pub type ClaimResult<T> = Result<T, ClaimError>;

impl ClaimError {
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn transition(current: impl ToString, requested: impl ToString) -> Self {
        Self::InvalidStateTransition {
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Caller errors: bad input, never worth retrying
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ClaimError::InvalidReference { .. }
                | ClaimError::IncompleteFeatures { .. }
                | ClaimError::AlreadyEvaluated { .. }
        )
    }

    /// Check if this error is retryable (ledger/network trouble)
    pub fn is_retryable(&self) -> bool {
        match self {
            ClaimError::Submission { .. } | ClaimError::SubmissionInFlight { .. } => true,
            ClaimError::Reconciliation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if this error maps to a "not found" answer
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClaimError::ClaimNotFound { .. } | ClaimError::NoSubmission { .. }
        )
    }
}

/// Ledger boundary errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// HTTP request failures
    #[error("HTTP request failed: {status} - {message}")]
    Http { status: u16, message: String },

    /// JSON-RPC error object returned by the node
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Network request failures
    #[error("Network request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    /// Timeout errors
    #[error("Request timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The ledger refused the transaction
    #[error("Transaction rejected: {message}")]
    Rejected { message: String },

    /// Ledger could not be reached at all
    #[error("Ledger unavailable: {message}")]
    Unavailable { message: String },

    /// API response validation errors
    #[error("Invalid ledger response: {message}")]
    InvalidResponse { message: String },
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Transient failures: the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Network { .. }
            | LedgerError::Timeout { .. }
            | LedgerError::Unavailable { .. } => true,
            LedgerError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
