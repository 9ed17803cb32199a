//! Error types for the auth protocol.

use thiserror::Error;

use crate::proof::ProofError;

/// Authentication failures. All of these map to an auth rejection at
/// the edge, never a 5xx; none are retried by the core.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired connect code")]
    InvalidConnectCode,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,

    /// A v2 session was presented without a proof-of-possession proof.
    #[error("proof-of-possession proof required")]
    ProofRequired,

    /// The proof failed one of its checks.
    #[error("proof rejected: {0}")]
    Proof(#[from] ProofError),

    /// The proof's unique id was already consumed.
    #[error("replay detected")]
    ReplayDetected,

    /// Caller exceeded the connect-code exchange window.
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("agent not found")]
    AgentNotFound,

    #[error("agent is revoked")]
    AgentRevoked,

    #[error("storage error: {0}")]
    Store(#[from] stipend_store::StoreError),

    #[error("{0}")]
    Core(#[from] stipend_core::CoreError),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
