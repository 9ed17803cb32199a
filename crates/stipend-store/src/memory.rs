//! In-memory implementation of the Store trait.
//!
//! Primarily for tests. Same semantics as SQLite - including both
//! uniqueness structures - but nothing is persisted.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use stipend_core::{
    ActivityEntry, Agent, AgentId, Blake3Hash, RequestId, Session, SessionId, SpendingLimit,
    TransferRequest, Workspace, WorkspaceId,
};

use crate::error::{Result, StoreError};
use crate::traits::{NonceClaim, Store};

/// In-memory store. Thread-safe via RwLock; all data is lost on drop.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    workspaces: HashMap<WorkspaceId, Workspace>,
    agents: HashMap<AgentId, Agent>,
    sessions: HashMap<SessionId, Session>,
    /// Uniqueness index: token hash -> session.
    sessions_by_hash: HashMap<Blake3Hash, SessionId>,
    /// Uniqueness index: jti -> expiry.
    nonces: HashMap<String, i64>,
    limits: HashMap<AgentId, SpendingLimit>,
    requests: HashMap<RequestId, TransferRequest>,
    activity: Vec<ActivityEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_workspace(&self, workspace: &Workspace) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.workspaces.insert(workspace.id, workspace.clone());
        Ok(())
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.workspaces.get(id).cloned())
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.workspaces.contains_key(&workspace.id) {
            return Err(StoreError::NotFound(format!(
                "workspace {}",
                workspace.id
            )));
        }
        inner.workspaces.insert(workspace.id, workspace.clone());
        Ok(())
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.agents.get(id).cloned())
    }

    async fn get_agent_by_connect_code(&self, hash: &Blake3Hash) -> Result<Option<Agent>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .agents
            .values()
            .find(|a| a.connect_code_hash.as_ref() == Some(hash))
            .cloned())
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.agents.contains_key(&agent.id) {
            return Err(StoreError::NotFound(format!("agent {}", agent.id)));
        }
        inner.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.sessions_by_hash.contains_key(&session.token_hash) {
            return Err(StoreError::DuplicateTokenHash);
        }
        inner
            .sessions_by_hash
            .insert(session.token_hash, session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session_by_hash(&self, hash: &Blake3Hash) -> Result<Option<Session>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .sessions_by_hash
            .get(hash)
            .and_then(|id| inner.sessions.get(id))
            .cloned())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(session) = inner.sessions.remove(id) {
            inner.sessions_by_hash.remove(&session.token_hash);
        }
        Ok(())
    }

    async fn delete_sessions_for_agent(&self, agent: &AgentId) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let doomed: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| &s.agent_id == agent)
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            if let Some(session) = inner.sessions.remove(id) {
                inner.sessions_by_hash.remove(&session.token_hash);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn touch_session(&self, id: &SessionId, at: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.sessions.get_mut(id) {
            Some(session) => {
                session.last_used_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("session {}", id))),
        }
    }

    async fn sweep_expired_sessions(&self, now: i64) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let doomed: Vec<SessionId> = inner
            .sessions
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.id)
            .collect();
        for id in &doomed {
            if let Some(session) = inner.sessions.remove(id) {
                inner.sessions_by_hash.remove(&session.token_hash);
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn claim_nonce(&self, jti: &str, expires_at: i64) -> Result<NonceClaim> {
        let mut inner = self.inner.write().unwrap();
        if inner.nonces.contains_key(jti) {
            return Ok(NonceClaim::Replayed);
        }
        inner.nonces.insert(jti.to_string(), expires_at);
        Ok(NonceClaim::Claimed)
    }

    async fn sweep_expired_nonces(&self, now: i64) -> Result<u64> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.nonces.len();
        inner.nonces.retain(|_, expires_at| *expires_at > now);
        Ok((before - inner.nonces.len()) as u64)
    }

    async fn upsert_limit(&self, limit: &SpendingLimit) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.limits.insert(limit.agent_id, limit.clone());
        Ok(())
    }

    async fn get_limit(&self, agent: &AgentId) -> Result<Option<SpendingLimit>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.limits.get(agent).cloned())
    }

    async fn delete_limit(&self, agent: &AgentId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.limits.remove(agent);
        Ok(())
    }

    async fn insert_request(&self, request: &TransferRequest) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<TransferRequest>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.requests.get(id).cloned())
    }

    async fn update_request(&self, request: &TransferRequest) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.requests.contains_key(&request.id) {
            return Err(StoreError::NotFound(format!("request {}", request.id)));
        }
        inner.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn list_requests_for_agent(&self, agent: &AgentId) -> Result<Vec<TransferRequest>> {
        let inner = self.inner.read().unwrap();
        let mut requests: Vec<TransferRequest> = inner
            .requests
            .values()
            .filter(|r| &r.agent_id == agent)
            .cloned()
            .collect();
        requests.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(requests)
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.activity.push(entry.clone());
        Ok(())
    }

    async fn list_activity(
        &self,
        workspace: &WorkspaceId,
        limit: u32,
    ) -> Result<Vec<ActivityEntry>> {
        let inner = self.inner.read().unwrap();
        let mut entries: Vec<ActivityEntry> = inner
            .activity
            .iter()
            .filter(|e| &e.workspace_id == workspace)
            .cloned()
            .collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stipend_core::{Protocol, SessionKind};

    fn session(hash: Blake3Hash) -> Session {
        Session::new(
            AgentId::generate(),
            WorkspaceId::generate(),
            hash,
            SessionKind::Session,
            Protocol::V1,
            10_000,
            0,
        )
    }

    #[tokio::test]
    async fn duplicate_token_hash_rejected() {
        let store = MemoryStore::new();
        let hash = Blake3Hash::hash(b"token");

        store.insert_session(&session(hash)).await.unwrap();
        let err = store.insert_session(&session(hash)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTokenHash));
    }

    #[tokio::test]
    async fn nonce_claimed_once() {
        let store = MemoryStore::new();
        assert_eq!(
            store.claim_nonce("jti-1", 5_000).await.unwrap(),
            NonceClaim::Claimed
        );
        assert_eq!(
            store.claim_nonce("jti-1", 5_000).await.unwrap(),
            NonceClaim::Replayed
        );
    }

    #[tokio::test]
    async fn nonce_sweep_removes_expired_only() {
        let store = MemoryStore::new();
        store.claim_nonce("old", 1_000).await.unwrap();
        store.claim_nonce("new", 9_000).await.unwrap();

        assert_eq!(store.sweep_expired_nonces(5_000).await.unwrap(), 1);
        // The swept id can be claimed again only if it reappears - which
        // for expired proofs is rejected upstream by the iat window.
        assert_eq!(
            store.claim_nonce("new", 9_000).await.unwrap(),
            NonceClaim::Replayed
        );
    }

    #[tokio::test]
    async fn delete_sessions_for_agent_clears_hash_index() {
        let store = MemoryStore::new();
        let agent = AgentId::generate();
        let hash = Blake3Hash::hash(b"t1");
        let mut s = session(hash);
        s.agent_id = agent;
        store.insert_session(&s).await.unwrap();

        assert_eq!(store.delete_sessions_for_agent(&agent).await.unwrap(), 1);
        assert!(store.get_session_by_hash(&hash).await.unwrap().is_none());
        // Hash is free again.
        store.insert_session(&session(hash)).await.unwrap();
    }

    #[tokio::test]
    async fn limit_is_one_per_agent() {
        let store = MemoryStore::new();
        let agent = AgentId::generate();
        let mint_a = stipend_core::Address::from_bytes([1u8; 32]);
        let mint_b = stipend_core::Address::from_bytes([2u8; 32]);

        store
            .upsert_limit(&SpendingLimit::new(agent, mint_a, 100, "daily", 0))
            .await
            .unwrap();
        store
            .upsert_limit(&SpendingLimit::new(agent, mint_b, 900, "weekly", 0))
            .await
            .unwrap();

        let limit = store.get_limit(&agent).await.unwrap().unwrap();
        assert_eq!(limit.token_mint, mint_b);
        assert_eq!(limit.limit_amount, 900);
    }
}
