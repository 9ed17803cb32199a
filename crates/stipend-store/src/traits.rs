//! Store trait: the abstract interface for off-chain persistence.
//!
//! The engine and auth protocol never touch a process-global table; they
//! go through this port. Implementations include SQLite (primary) and
//! in-memory (for tests).

use async_trait::async_trait;
use stipend_core::{
    ActivityEntry, Agent, AgentId, Blake3Hash, RequestId, Session, SessionId, SpendingLimit,
    TransferRequest, Workspace, WorkspaceId,
};

use crate::error::Result;

/// Result of claiming a replay nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceClaim {
    /// First use of this id.
    Claimed,
    /// The id was already consumed - a replay.
    Replayed,
}

/// The Store trait: async interface for off-chain persistence.
///
/// # Design Notes
///
/// - **Two uniqueness structures**: the session-by-token-hash index and
///   the nonce-by-id index are the only places requiring storage-level
///   uniqueness; everything else is append/patch without cross-record
///   locking.
/// - **Activity is append-only**: there is deliberately no update or
///   delete operation for activity entries.
/// - **No speculative writes**: callers only invoke the mutating
///   operations after ledger confirmation (the engine enforces this).
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Workspace Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_workspace(&self, workspace: &Workspace) -> Result<()>;

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>>;

    async fn update_workspace(&self, workspace: &Workspace) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Agent Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_agent(&self, agent: &Agent) -> Result<()>;

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>>;

    /// Find the agent holding a given connect-code hash.
    async fn get_agent_by_connect_code(&self, hash: &Blake3Hash) -> Result<Option<Agent>>;

    async fn update_agent(&self, agent: &Agent) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a session. The token hash is the unique lookup key;
    /// inserting a second live session with the same hash fails with
    /// [`StoreError::DuplicateTokenHash`](crate::StoreError).
    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn get_session_by_hash(&self, hash: &Blake3Hash) -> Result<Option<Session>>;

    async fn delete_session(&self, id: &SessionId) -> Result<()>;

    /// Delete every session belonging to an agent (revocation, refresh
    /// rotation). Returns how many were removed.
    async fn delete_sessions_for_agent(&self, agent: &AgentId) -> Result<u64>;

    /// Record that a session was just used.
    async fn touch_session(&self, id: &SessionId, at: i64) -> Result<()>;

    /// Remove expired sessions. Returns how many were removed.
    async fn sweep_expired_sessions(&self, now: i64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Replay Nonce Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Atomically claim a proof's unique id. A given `jti` can be
    /// claimed at most once; the second attempt reports `Replayed`.
    async fn claim_nonce(&self, jti: &str, expires_at: i64) -> Result<NonceClaim>;

    /// Remove expired nonces. Returns how many were removed.
    async fn sweep_expired_nonces(&self, now: i64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Spending Limit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace the budget for an agent. One record per agent;
    /// changing the token replaces the record.
    async fn upsert_limit(&self, limit: &SpendingLimit) -> Result<()>;

    async fn get_limit(&self, agent: &AgentId) -> Result<Option<SpendingLimit>>;

    async fn delete_limit(&self, agent: &AgentId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Transfer Request Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_request(&self, request: &TransferRequest) -> Result<()>;

    async fn get_request(&self, id: &RequestId) -> Result<Option<TransferRequest>>;

    async fn update_request(&self, request: &TransferRequest) -> Result<()>;

    async fn list_requests_for_agent(&self, agent: &AgentId) -> Result<Vec<TransferRequest>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Activity Log Operations (append-only)
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<()>;

    /// Most recent entries for a workspace, newest first.
    async fn list_activity(
        &self,
        workspace: &WorkspaceId,
        limit: u32,
    ) -> Result<Vec<ActivityEntry>>;
}
