//! The engine's error taxonomy.
//!
//! Typed variants replace ad-hoc error-text matching: the edge maps
//! each variant to a transport status with one table, and the Display
//! prefixes stay stable for callers that log them. Nothing here is
//! fatal to the process; every failure is scoped to one request.

use thiserror::Error;

use stipend_auth::AuthError;
use stipend_core::CoreError;
use stipend_ledger::{BuilderError, LedgerError};
use stipend_policy::PolicyError;
use stipend_store::StoreError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad/expired/wrong-kind credential, failed proof, replay. Never
    /// retried by the core.
    #[error("{0}")]
    AuthRejected(#[from] AuthError),

    /// Over budget or no budget configured. The transfer path turns
    /// this into the approval-proposal branch rather than a dead end.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Malformed instruction batch, disallowed program, out-of-range
    /// note/justification. Raised before any network or storage call.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Submission itself threw. Zero off-chain writes happened.
    #[error("Failed to submit transaction: {0}")]
    LedgerSubmitFailed(String),

    /// Submission succeeded but confirmation threw or timed out. The
    /// action may or may not have landed; zero off-chain writes
    /// happened and the caller must not assume success.
    #[error("Transaction failed to confirm: {0}")]
    LedgerConfirmFailed(String),

    /// A Phase-1 read of on-chain state failed.
    #[error("Failed to read ledger state: {0}")]
    LedgerReadFailed(String),

    /// Agent/workspace/request missing.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("validation failed: {0}")]
    Builder(#[from] BuilderError),
}

impl From<PolicyError> for EngineError {
    fn from(e: PolicyError) -> Self {
        EngineError::ValidationFailed(e.to_string())
    }
}

impl EngineError {
    /// Classify a ledger error raised during a Phase-1 read.
    pub(crate) fn read(e: LedgerError) -> Self {
        EngineError::LedgerReadFailed(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
