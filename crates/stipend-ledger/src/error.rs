//! Error types for ledger collaborators.

use thiserror::Error;

/// Failures from the ledger RPC or the remote signer. All four RPC
/// calls are fallible network calls and are treated as such.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport-level RPC failure.
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The ledger rejected a submitted transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// Confirmation did not arrive inside the blockhash window.
    #[error("confirmation timed out: {0}")]
    ConfirmTimeout(String),

    /// The remote custody signer failed.
    #[error("remote signer failure: {0}")]
    Signer(String),

    /// On-chain account bytes failed to decode.
    #[error("account data decoding failed: {0}")]
    Decode(String),

    /// A required account does not exist on-chain.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("{0}")]
    Core(#[from] stipend_core::CoreError),
}

/// Failures composing a transaction.
#[derive(Debug, Error)]
pub enum BuilderError {
    /// The fee sponsor appeared where an authority or member belongs.
    /// The sponsor is only ever the fee/rent payer.
    #[error("the fee sponsor may not be a settings authority or member")]
    SponsorIsAuthority,

    /// A draw or proposal for zero value.
    #[error("amount must be positive")]
    ZeroAmount,
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
