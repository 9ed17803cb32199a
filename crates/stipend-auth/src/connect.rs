//! Connect-code issuance and exchange.
//!
//! A connect code is single-use: the exchange deletes its session row
//! before any credential is issued, so a second presentation fails the
//! lookup. Exchange failure writes no partial state.

use stipend_core::{
    Agent, AgentId, AgentStatus, Ed25519PublicKey, FamilyId, Protocol, Session, SessionKind,
    WorkspaceId, ACCESS_TTL_MS, CONNECT_CODE_TTL_MS, REFRESH_TTL_MS, SESSION_TTL_MS,
};
use stipend_store::Store;

use crate::error::{AuthError, Result};
use crate::token::{generate_token, token_hash, CredentialBundle};

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub credentials: CredentialBundle,
}

/// Issue a fresh one-time connect code for an agent.
///
/// The raw code is returned exactly once; only its hash is stored (on
/// the agent record and as a `ConnectCode` session).
pub async fn issue_connect_code(store: &dyn Store, agent_id: &AgentId, now: i64) -> Result<String> {
    let mut agent = store
        .get_agent(agent_id)
        .await?
        .ok_or(AuthError::AgentNotFound)?;
    if agent.status == AgentStatus::Revoked {
        return Err(AuthError::AgentRevoked);
    }

    // Retire any previous outstanding code.
    if let Some(previous) = agent.connect_code_hash.take() {
        if let Some(session) = store.get_session_by_hash(&previous).await? {
            store.delete_session(&session.id).await?;
        }
    }

    let code = generate_token();
    let hash = token_hash(&code);
    let expires_at = now + CONNECT_CODE_TTL_MS;

    store
        .insert_session(&Session::new(
            agent.id,
            agent.workspace_id,
            hash,
            SessionKind::ConnectCode,
            Protocol::V1,
            expires_at,
            now,
        ))
        .await?;

    agent.connect_code_hash = Some(hash);
    agent.connect_code_expires_at = Some(expires_at);
    agent.updated_at = now;
    store.update_agent(&agent).await?;

    Ok(code)
}

/// Exchange a connect code for session credentials.
///
/// When the caller supplies a proof-of-possession public key, a v2
/// access+refresh pair is issued (fresh family, sequence 0) and the key
/// is persisted on the agent; otherwise a v1 bearer session.
pub async fn exchange_connect_code(
    store: &dyn Store,
    code: &str,
    pop_key: Option<Ed25519PublicKey>,
    now: i64,
) -> Result<ConnectOutcome> {
    let hash = token_hash(code);
    let session = store
        .get_session_by_hash(&hash)
        .await?
        .ok_or(AuthError::InvalidConnectCode)?;
    if session.kind != SessionKind::ConnectCode || session.is_expired(now) {
        return Err(AuthError::InvalidConnectCode);
    }

    let mut agent = store
        .get_agent(&session.agent_id)
        .await?
        .ok_or(AuthError::AgentNotFound)?;
    if agent.status == AgentStatus::Revoked {
        return Err(AuthError::AgentRevoked);
    }

    // Single use: the code is gone before anything is issued.
    store.delete_session(&session.id).await?;

    agent.connect_code_hash = None;
    agent.connect_code_expires_at = None;
    if agent.status == AgentStatus::Provisioning {
        agent.transition(AgentStatus::Connected, now)?;
    } else {
        agent.updated_at = now;
    }

    let credentials = match pop_key {
        Some(key) => {
            agent.pop_public_key = Some(key);
            issue_v2_pair(store, &agent, FamilyId::generate(), 0, now).await?
        }
        None => {
            let token = generate_token();
            let expires_at = now + SESSION_TTL_MS;
            store
                .insert_session(&Session::new(
                    agent.id,
                    agent.workspace_id,
                    token_hash(&token),
                    SessionKind::Session,
                    Protocol::V1,
                    expires_at,
                    now,
                ))
                .await?;
            CredentialBundle::V1 { token, expires_at }
        }
    };

    store.update_agent(&agent).await?;
    tracing::info!(agent = %agent.id, "connect code exchanged");

    Ok(ConnectOutcome {
        agent_id: agent.id,
        workspace_id: agent.workspace_id,
        credentials,
    })
}

/// Issue a v2 access+refresh pair sharing a rotation family.
pub(crate) async fn issue_v2_pair(
    store: &dyn Store,
    agent: &Agent,
    family: FamilyId,
    sequence: u64,
    now: i64,
) -> Result<CredentialBundle> {
    let access_token = generate_token();
    let access_expires_at = now + ACCESS_TTL_MS;
    store
        .insert_session(&Session::new(
            agent.id,
            agent.workspace_id,
            token_hash(&access_token),
            SessionKind::Access,
            Protocol::V2,
            access_expires_at,
            now,
        ))
        .await?;

    let refresh_token = generate_token();
    let refresh_expires_at = now + REFRESH_TTL_MS;
    store
        .insert_session(
            &Session::new(
                agent.id,
                agent.workspace_id,
                token_hash(&refresh_token),
                SessionKind::Refresh,
                Protocol::V2,
                refresh_expires_at,
                now,
            )
            .with_family(family, sequence),
        )
        .await?;

    Ok(CredentialBundle::V2 {
        access_token,
        access_expires_at,
        refresh_token,
        refresh_expires_at,
    })
}
