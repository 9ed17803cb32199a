//! Refresh-token rotation.
//!
//! Rotation is revoke-all-then-issue, not sliding renewal: a refresh
//! invalidates every session the agent holds and issues a new
//! access+refresh pair at sequence = previous + 1 in the same family.
//! A stolen refresh token used after the holder already rotated simply
//! no longer resolves. Two concurrent refreshes race safely: the loser
//! sees an ordinary invalid-refresh-token error.

use stipend_core::{AgentId, AgentStatus, FamilyId, SessionKind, WorkspaceId};
use stipend_store::Store;

use crate::connect::issue_v2_pair;
use crate::error::{AuthError, Result};
use crate::token::{token_hash, CredentialBundle};

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub credentials: CredentialBundle,
    /// Sequence number of the newly issued refresh token.
    pub sequence: u64,
}

/// Rotate an agent's credentials by presenting its refresh token.
pub async fn refresh_session(
    store: &dyn Store,
    refresh_token: &str,
    now: i64,
) -> Result<RefreshOutcome> {
    let hash = token_hash(refresh_token);
    let session = store
        .get_session_by_hash(&hash)
        .await?
        .ok_or(AuthError::InvalidRefreshToken)?;
    if session.kind != SessionKind::Refresh || session.is_expired(now) {
        return Err(AuthError::InvalidRefreshToken);
    }

    let agent = store
        .get_agent(&session.agent_id)
        .await?
        .ok_or(AuthError::AgentNotFound)?;
    if agent.status == AgentStatus::Revoked {
        return Err(AuthError::AgentRevoked);
    }

    let family = session.family.unwrap_or_else(FamilyId::generate);
    let sequence = session.sequence.unwrap_or(0) + 1;

    // Full rotation: every session for this agent dies, then the new
    // pair is issued. A concurrent refresh loses at the lookup above.
    let revoked = store.delete_sessions_for_agent(&agent.id).await?;
    let credentials = issue_v2_pair(store, &agent, family, sequence, now).await?;

    tracing::info!(
        agent = %agent.id,
        sequence,
        revoked,
        "refresh rotation completed"
    );

    Ok(RefreshOutcome {
        agent_id: agent.id,
        workspace_id: agent.workspace_id,
        credentials,
        sequence,
    })
}
