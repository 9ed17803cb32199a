//! Protected-call authentication.
//!
//! Resolves a presented token to an agent. For v2 sessions a
//! proof-of-possession proof is mandatory, and its replay nonce is
//! claimed strictly after signature verification succeeds - probing
//! the nonce store cannot bypass the signature check.

use stipend_core::{AgentId, AgentStatus, Protocol, SessionId, WorkspaceId};
use stipend_store::{NonceClaim, Store};

use crate::error::{AuthError, Result};
use crate::proof::{verify_proof, ProofExpectations, MAX_CLOCK_SKEW_SECS};
use crate::token::token_hash;

/// How long a claimed nonce stays in the store before the sweep may
/// drop it. Twice the proof acceptance window.
const NONCE_TTL_MS: i64 = 2 * MAX_CLOCK_SKEW_SECS * 2 * 1_000;

/// The resolved caller of a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub session_id: SessionId,
    pub protocol: Protocol,
}

/// The actual request the credential was presented on.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    pub method: &'a str,
    pub url: &'a str,
    /// The proof header value, when one was sent.
    pub proof: Option<&'a str>,
}

/// Authenticate a protected call.
pub async fn authenticate(
    store: &dyn Store,
    token: &str,
    request: &RequestContext<'_>,
    now: i64,
) -> Result<AuthContext> {
    let session = store
        .get_session_by_hash(&token_hash(token))
        .await?
        .ok_or(AuthError::InvalidToken)?;
    if !session.is_presentable() || session.is_expired(now) {
        return Err(AuthError::InvalidToken);
    }

    let agent = store
        .get_agent(&session.agent_id)
        .await?
        .ok_or(AuthError::AgentNotFound)?;
    if agent.status == AgentStatus::Revoked {
        return Err(AuthError::AgentRevoked);
    }

    if session.protocol == Protocol::V2 {
        let proof = request.proof.ok_or(AuthError::ProofRequired)?;
        let verified = verify_proof(
            proof,
            &ProofExpectations {
                method: request.method,
                url: request.url,
                access_token: token,
                registered_key: agent.pop_public_key,
                now_secs: now / 1_000,
            },
        )?;

        // Replay check comes after the signature held up.
        let claim = store
            .claim_nonce(&verified.jti, now + NONCE_TTL_MS)
            .await?;
        if claim == NonceClaim::Replayed {
            tracing::warn!(agent = %agent.id, jti = %verified.jti, "proof replay detected");
            return Err(AuthError::ReplayDetected);
        }
    }

    store.touch_session(&session.id, now).await?;

    Ok(AuthContext {
        agent_id: session.agent_id,
        workspace_id: session.workspace_id,
        session_id: session.id,
        protocol: session.protocol,
    })
}
