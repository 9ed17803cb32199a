//! # stipend-auth
//!
//! The agent authentication protocol:
//!
//! - **Connect codes** - short-lived, single-use, exchanged once for
//!   session credentials ([`issue_connect_code`], [`exchange_connect_code`])
//! - **Sessions** - v1 plain bearer, or v2 access+refresh pairs bound to
//!   a proof-of-possession key
//! - **Rotation** - refresh is revoke-all-then-issue with a family id
//!   and monotonically increasing sequence ([`refresh_session`])
//! - **Protected calls** - token resolution plus mandatory proof
//!   verification and replay-nonce claiming for v2 ([`authenticate`])
//! - **Rate limiting** - a fixed sliding counter keyed by caller
//!   identity ([`RateLimiter`])
//!
//! All state goes through the injected [`stipend_store::Store`] port.

pub mod authenticate;
pub mod connect;
pub mod error;
pub mod proof;
pub mod ratelimit;
pub mod refresh;
pub mod token;

pub use authenticate::{authenticate, AuthContext, RequestContext};
pub use connect::{exchange_connect_code, issue_connect_code, ConnectOutcome};
pub use error::{AuthError, Result};
pub use proof::{
    sign_proof, verify_proof, ProofClaims, ProofError, ProofExpectations, ProofHeader,
    VerifiedProof, MAX_CLOCK_SKEW_SECS, PROOF_ALG, PROOF_TYPE,
};
pub use ratelimit::RateLimiter;
pub use refresh::{refresh_session, RefreshOutcome};
pub use token::{generate_token, token_hash, CredentialBundle};
