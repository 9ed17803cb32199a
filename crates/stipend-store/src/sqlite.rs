//! SQLite implementation of the Store trait.
//!
//! The primary backend: rusqlite with bundled SQLite, wrapped in async
//! via `tokio::task::spawn_blocking`. Both uniqueness structures are
//! enforced by the schema (UNIQUE token_hash, jti PRIMARY KEY).

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use stipend_core::{
    ActivityEntry, ActivityId, Agent, AgentId, AgentStatus, Blake3Hash, Ed25519PublicKey,
    FamilyId, Protocol, RequestId, RequestStatus, Session, SessionId, SessionKind, SpendingLimit,
    TransferRequest, Workspace, WorkspaceId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{NonceClaim, Store};

/// SQLite-based store.
///
/// Thread-safe via an internal mutex; every operation runs on the
/// blocking pool to keep the async runtime free.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a database at the given path, creating and migrating it as
    /// needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(&path)?;
        migration::migrate(&mut conn)?;
        tracing::debug!(path = %path.as_ref().display(), "opened stipend database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database. Useful for tests.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run an operation on the blocking pool with the connection held.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::InvalidData(format!("mutex poisoned: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column helpers
// ─────────────────────────────────────────────────────────────────────────────

fn blob<const N: usize>(row: &rusqlite::Row<'_>, col: &str) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(col)?;
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(0, col.to_string(), rusqlite::types::Type::Blob)
    })
}

fn opt_blob<const N: usize>(
    row: &rusqlite::Row<'_>,
    col: &str,
) -> rusqlite::Result<Option<[u8; N]>> {
    let bytes: Option<Vec<u8>> = row.get(col)?;
    match bytes {
        None => Ok(None),
        Some(b) => b.try_into().map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, col.to_string(), rusqlite::types::Type::Blob)
        }),
    }
}

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_workspace(row: &rusqlite::Row<'_>) -> Result<Workspace> {
    let allowlist: Option<Vec<u8>> = row.get("program_allowlist")?;
    Ok(Workspace {
        id: WorkspaceId::from_bytes(blob(row, "workspace_id")?),
        name: row.get("name")?,
        settings_address: stipend_core::Address::from_bytes(blob(row, "settings_address")?),
        vault_address: stipend_core::Address::from_bytes(blob(row, "vault_address")?),
        creator: stipend_core::Address::from_bytes(blob(row, "creator")?),
        program_allowlist: allowlist.map(|b| from_cbor(&b)).transpose()?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> Result<Agent> {
    let status: String = row.get("status")?;
    Ok(Agent {
        id: AgentId::from_bytes(blob(row, "agent_id")?),
        workspace_id: WorkspaceId::from_bytes(blob(row, "workspace_id")?),
        name: row.get("name")?,
        custody_key_id: row.get("custody_key_id")?,
        public_key: stipend_core::Address::from_bytes(blob(row, "public_key")?),
        status: AgentStatus::parse(&status)
            .ok_or_else(|| StoreError::InvalidData(format!("agent status: {}", status)))?,
        pop_public_key: opt_blob(row, "pop_public_key")?.map(Ed25519PublicKey::from_bytes),
        connect_code_hash: opt_blob(row, "connect_code_hash")?.map(Blake3Hash::from_bytes),
        connect_code_expires_at: row.get("connect_code_expires_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session> {
    let kind: String = row.get("kind")?;
    let protocol: String = row.get("protocol")?;
    let sequence: Option<i64> = row.get("sequence")?;
    Ok(Session {
        id: SessionId::from_bytes(blob(row, "session_id")?),
        agent_id: AgentId::from_bytes(blob(row, "agent_id")?),
        workspace_id: WorkspaceId::from_bytes(blob(row, "workspace_id")?),
        token_hash: Blake3Hash::from_bytes(blob(row, "token_hash")?),
        kind: SessionKind::parse(&kind)
            .ok_or_else(|| StoreError::InvalidData(format!("session kind: {}", kind)))?,
        protocol: Protocol::parse(&protocol)
            .ok_or_else(|| StoreError::InvalidData(format!("protocol: {}", protocol)))?,
        expires_at: row.get("expires_at")?,
        last_used_at: row.get("last_used_at")?,
        created_at: row.get("created_at")?,
        family: opt_blob(row, "family")?.map(FamilyId::from_bytes),
        sequence: sequence.map(|s| s as u64),
    })
}

fn row_to_limit(row: &rusqlite::Row<'_>) -> Result<SpendingLimit> {
    Ok(SpendingLimit {
        agent_id: AgentId::from_bytes(blob(row, "agent_id")?),
        token_mint: stipend_core::Address::from_bytes(blob(row, "token_mint")?),
        limit_amount: row.get::<_, i64>("limit_amount")? as u64,
        spent_amount: row.get::<_, i64>("spent_amount")? as u64,
        period_type: row.get("period_type")?,
        period_start: row.get("period_start")?,
        onchain_key: opt_blob(row, "onchain_key")?.map(stipend_core::Address::from_bytes),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_request(row: &rusqlite::Row<'_>) -> Result<TransferRequest> {
    let status: String = row.get("status")?;
    let snapshot: Option<Vec<u8>> = row.get("limit_snapshot")?;
    Ok(TransferRequest {
        id: RequestId::from_bytes(blob(row, "request_id")?),
        workspace_id: WorkspaceId::from_bytes(blob(row, "workspace_id")?),
        agent_id: AgentId::from_bytes(blob(row, "agent_id")?),
        recipient: stipend_core::Address::from_bytes(blob(row, "recipient")?),
        amount: row.get::<_, i64>("amount")? as u64,
        token_mint: stipend_core::Address::from_bytes(blob(row, "token_mint")?),
        note: row.get("note")?,
        justification: row.get("justification")?,
        status: RequestStatus::parse(&status)
            .ok_or_else(|| StoreError::InvalidData(format!("request status: {}", status)))?,
        limit_snapshot: snapshot.map(|b| from_cbor(&b)).transpose()?,
        proposal_ref: opt_blob(row, "proposal_ref")?.map(stipend_core::Address::from_bytes),
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> Result<ActivityEntry> {
    let actor: Vec<u8> = row.get("actor")?;
    let metadata: Vec<u8> = row.get("metadata")?;
    let amount: Option<i64> = row.get("amount")?;
    Ok(ActivityEntry {
        id: ActivityId::from_bytes(blob(row, "activity_id")?),
        workspace_id: WorkspaceId::from_bytes(blob(row, "workspace_id")?),
        actor: from_cbor(&actor)?,
        ledger_signature: row.get("ledger_signature")?,
        amount: amount.map(|a| a as u64),
        metadata: from_cbor(&metadata)?,
        created_at: row.get("created_at")?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_workspace(&self, workspace: &Workspace) -> Result<()> {
        let ws = workspace.clone();
        self.blocking(move |conn| {
            let allowlist = ws.program_allowlist.as_ref().map(to_cbor).transpose()?;
            conn.execute(
                "INSERT INTO workspaces (
                    workspace_id, name, settings_address, vault_address,
                    creator, program_allowlist, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    ws.id.as_bytes().as_slice(),
                    ws.name,
                    ws.settings_address.as_bytes().as_slice(),
                    ws.vault_address.as_bytes().as_slice(),
                    ws.creator.as_bytes().as_slice(),
                    allowlist,
                    ws.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
        let id = *id;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM workspaces WHERE workspace_id = ?1",
                params![id.as_bytes().as_slice()],
                |row| Ok(row_to_workspace(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> Result<()> {
        let ws = workspace.clone();
        self.blocking(move |conn| {
            let allowlist = ws.program_allowlist.as_ref().map(to_cbor).transpose()?;
            let changed = conn.execute(
                "UPDATE workspaces SET name = ?2, settings_address = ?3,
                    vault_address = ?4, creator = ?5, program_allowlist = ?6
                 WHERE workspace_id = ?1",
                params![
                    ws.id.as_bytes().as_slice(),
                    ws.name,
                    ws.settings_address.as_bytes().as_slice(),
                    ws.vault_address.as_bytes().as_slice(),
                    ws.creator.as_bytes().as_slice(),
                    allowlist,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("workspace {}", ws.id)));
            }
            Ok(())
        })
        .await
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let a = agent.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO agents (
                    agent_id, workspace_id, name, custody_key_id, public_key,
                    status, pop_public_key, connect_code_hash,
                    connect_code_expires_at, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    a.id.as_bytes().as_slice(),
                    a.workspace_id.as_bytes().as_slice(),
                    a.name,
                    a.custody_key_id,
                    a.public_key.as_bytes().as_slice(),
                    a.status.as_str(),
                    a.pop_public_key.as_ref().map(|k| k.as_bytes().as_slice()),
                    a.connect_code_hash.as_ref().map(|h| h.as_bytes().as_slice()),
                    a.connect_code_expires_at,
                    a.created_at,
                    a.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        let id = *id;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM agents WHERE agent_id = ?1",
                params![id.as_bytes().as_slice()],
                |row| Ok(row_to_agent(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn get_agent_by_connect_code(&self, hash: &Blake3Hash) -> Result<Option<Agent>> {
        let hash = *hash;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM agents WHERE connect_code_hash = ?1",
                params![hash.as_bytes().as_slice()],
                |row| Ok(row_to_agent(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        let a = agent.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE agents SET workspace_id = ?2, name = ?3,
                    custody_key_id = ?4, public_key = ?5, status = ?6,
                    pop_public_key = ?7, connect_code_hash = ?8,
                    connect_code_expires_at = ?9, updated_at = ?10
                 WHERE agent_id = ?1",
                params![
                    a.id.as_bytes().as_slice(),
                    a.workspace_id.as_bytes().as_slice(),
                    a.name,
                    a.custody_key_id,
                    a.public_key.as_bytes().as_slice(),
                    a.status.as_str(),
                    a.pop_public_key.as_ref().map(|k| k.as_bytes().as_slice()),
                    a.connect_code_hash.as_ref().map(|h| h.as_bytes().as_slice()),
                    a.connect_code_expires_at,
                    a.updated_at,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("agent {}", a.id)));
            }
            Ok(())
        })
        .await
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        let s = session.clone();
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO sessions (
                    session_id, agent_id, workspace_id, token_hash, kind,
                    protocol, expires_at, last_used_at, created_at, family,
                    sequence
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    s.id.as_bytes().as_slice(),
                    s.agent_id.as_bytes().as_slice(),
                    s.workspace_id.as_bytes().as_slice(),
                    s.token_hash.as_bytes().as_slice(),
                    s.kind.as_str(),
                    s.protocol.as_str(),
                    s.expires_at,
                    s.last_used_at,
                    s.created_at,
                    s.family.as_ref().map(|f| f.as_bytes().as_slice()),
                    s.sequence.map(|n| n as i64),
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::DuplicateTokenHash)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_session_by_hash(&self, hash: &Blake3Hash) -> Result<Option<Session>> {
        let hash = *hash;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM sessions WHERE token_hash = ?1",
                params![hash.as_bytes().as_slice()],
                |row| Ok(row_to_session(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<()> {
        let id = *id;
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM sessions WHERE session_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_sessions_for_agent(&self, agent: &AgentId) -> Result<u64> {
        let agent = *agent;
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE agent_id = ?1",
                params![agent.as_bytes().as_slice()],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn touch_session(&self, id: &SessionId, at: i64) -> Result<()> {
        let id = *id;
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions SET last_used_at = ?2 WHERE session_id = ?1",
                params![id.as_bytes().as_slice(), at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("session {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn sweep_expired_sessions(&self, now: i64) -> Result<u64> {
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn claim_nonce(&self, jti: &str, expires_at: i64) -> Result<NonceClaim> {
        let jti = jti.to_string();
        self.blocking(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO replay_nonces (jti, expires_at) VALUES (?1, ?2)",
                params![jti, expires_at],
            )?;
            Ok(if inserted == 1 {
                NonceClaim::Claimed
            } else {
                NonceClaim::Replayed
            })
        })
        .await
    }

    async fn sweep_expired_nonces(&self, now: i64) -> Result<u64> {
        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM replay_nonces WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn upsert_limit(&self, limit: &SpendingLimit) -> Result<()> {
        let l = limit.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO spending_limits (
                    agent_id, token_mint, limit_amount, spent_amount,
                    period_type, period_start, onchain_key, created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(agent_id) DO UPDATE SET
                    token_mint = excluded.token_mint,
                    limit_amount = excluded.limit_amount,
                    spent_amount = excluded.spent_amount,
                    period_type = excluded.period_type,
                    period_start = excluded.period_start,
                    onchain_key = excluded.onchain_key,
                    updated_at = excluded.updated_at",
                params![
                    l.agent_id.as_bytes().as_slice(),
                    l.token_mint.as_bytes().as_slice(),
                    l.limit_amount as i64,
                    l.spent_amount as i64,
                    l.period_type,
                    l.period_start,
                    l.onchain_key.as_ref().map(|a| a.as_bytes().as_slice()),
                    l.created_at,
                    l.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_limit(&self, agent: &AgentId) -> Result<Option<SpendingLimit>> {
        let agent = *agent;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM spending_limits WHERE agent_id = ?1",
                params![agent.as_bytes().as_slice()],
                |row| Ok(row_to_limit(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn delete_limit(&self, agent: &AgentId) -> Result<()> {
        let agent = *agent;
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM spending_limits WHERE agent_id = ?1",
                params![agent.as_bytes().as_slice()],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_request(&self, request: &TransferRequest) -> Result<()> {
        let r = request.clone();
        self.blocking(move |conn| {
            let snapshot = r.limit_snapshot.as_ref().map(to_cbor).transpose()?;
            conn.execute(
                "INSERT INTO transfer_requests (
                    request_id, workspace_id, agent_id, recipient, amount,
                    token_mint, note, justification, status, limit_snapshot,
                    proposal_ref, error, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    r.id.as_bytes().as_slice(),
                    r.workspace_id.as_bytes().as_slice(),
                    r.agent_id.as_bytes().as_slice(),
                    r.recipient.as_bytes().as_slice(),
                    r.amount as i64,
                    r.token_mint.as_bytes().as_slice(),
                    r.note,
                    r.justification,
                    r.status.as_str(),
                    snapshot,
                    r.proposal_ref.as_ref().map(|a| a.as_bytes().as_slice()),
                    r.error,
                    r.created_at,
                    r.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_request(&self, id: &RequestId) -> Result<Option<TransferRequest>> {
        let id = *id;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT * FROM transfer_requests WHERE request_id = ?1",
                params![id.as_bytes().as_slice()],
                |row| Ok(row_to_request(row)),
            )
            .optional()?
            .transpose()
        })
        .await
    }

    async fn update_request(&self, request: &TransferRequest) -> Result<()> {
        let r = request.clone();
        self.blocking(move |conn| {
            let snapshot = r.limit_snapshot.as_ref().map(to_cbor).transpose()?;
            let changed = conn.execute(
                "UPDATE transfer_requests SET status = ?2, limit_snapshot = ?3,
                    proposal_ref = ?4, error = ?5, updated_at = ?6
                 WHERE request_id = ?1",
                params![
                    r.id.as_bytes().as_slice(),
                    r.status.as_str(),
                    snapshot,
                    r.proposal_ref.as_ref().map(|a| a.as_bytes().as_slice()),
                    r.error,
                    r.updated_at,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("request {}", r.id)));
            }
            Ok(())
        })
        .await
    }

    async fn list_requests_for_agent(&self, agent: &AgentId) -> Result<Vec<TransferRequest>> {
        let agent = *agent;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM transfer_requests WHERE agent_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![agent.as_bytes().as_slice()], |row| {
                Ok(row_to_request(row))
            })?;
            let mut requests = Vec::new();
            for row in rows {
                requests.push(row??);
            }
            Ok(requests)
        })
        .await
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<()> {
        let e = entry.clone();
        self.blocking(move |conn| {
            let actor = to_cbor(&e.actor)?;
            let metadata = to_cbor(&e.metadata)?;
            conn.execute(
                "INSERT INTO activity_log (
                    activity_id, workspace_id, actor, category, action,
                    ledger_signature, amount, metadata, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    e.id.as_bytes().as_slice(),
                    e.workspace_id.as_bytes().as_slice(),
                    actor,
                    e.metadata.category(),
                    e.metadata.action(),
                    e.ledger_signature,
                    e.amount.map(|a| a as i64),
                    metadata,
                    e.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_activity(
        &self,
        workspace: &WorkspaceId,
        limit: u32,
    ) -> Result<Vec<ActivityEntry>> {
        let workspace = *workspace;
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM activity_log WHERE workspace_id = ?1
                 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![workspace.as_bytes().as_slice(), limit],
                |row| Ok(row_to_activity(row)),
            )?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row??);
            }
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stipend_core::{ActivityMetadata, Actor, Address};

    fn agent(workspace_id: WorkspaceId) -> Agent {
        Agent::new(
            workspace_id,
            "reporter",
            "custody/reporter",
            Address::from_bytes([1u8; 32]),
            1_000,
        )
    }

    #[tokio::test]
    async fn agent_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let mut a = agent(WorkspaceId::generate());
        a.connect_code_hash = Some(Blake3Hash::hash(b"code"));
        a.connect_code_expires_at = Some(9_000);

        store.insert_agent(&a).await.unwrap();
        let back = store.get_agent(&a.id).await.unwrap().unwrap();
        assert_eq!(a, back);

        let by_code = store
            .get_agent_by_connect_code(&Blake3Hash::hash(b"code"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_code.id, a.id);
    }

    #[tokio::test]
    async fn session_duplicate_hash_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let s = Session::new(
            AgentId::generate(),
            WorkspaceId::generate(),
            Blake3Hash::hash(b"tok"),
            SessionKind::Access,
            Protocol::V2,
            5_000,
            0,
        );
        store.insert_session(&s).await.unwrap();

        let mut dup = s.clone();
        dup.id = SessionId::generate();
        let err = store.insert_session(&dup).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTokenHash));
    }

    #[tokio::test]
    async fn refresh_session_keeps_lineage() {
        let store = SqliteStore::open_memory().unwrap();
        let family = FamilyId::generate();
        let s = Session::new(
            AgentId::generate(),
            WorkspaceId::generate(),
            Blake3Hash::hash(b"refresh"),
            SessionKind::Refresh,
            Protocol::V2,
            5_000,
            0,
        )
        .with_family(family, 4);
        store.insert_session(&s).await.unwrap();

        let back = store
            .get_session_by_hash(&Blake3Hash::hash(b"refresh"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.family, Some(family));
        assert_eq!(back.sequence, Some(4));
    }

    #[tokio::test]
    async fn nonce_claim_and_sweep() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(
            store.claim_nonce("n1", 1_000).await.unwrap(),
            NonceClaim::Claimed
        );
        assert_eq!(
            store.claim_nonce("n1", 1_000).await.unwrap(),
            NonceClaim::Replayed
        );
        assert_eq!(store.sweep_expired_nonces(2_000).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn limit_upsert_replaces() {
        let store = SqliteStore::open_memory().unwrap();
        let agent_id = AgentId::generate();
        store
            .upsert_limit(&SpendingLimit::new(
                agent_id,
                Address::from_bytes([2u8; 32]),
                100,
                "daily",
                0,
            ))
            .await
            .unwrap();

        let mut updated = store.get_limit(&agent_id).await.unwrap().unwrap();
        updated.spent_amount = 40;
        updated.updated_at = 10;
        store.upsert_limit(&updated).await.unwrap();

        let back = store.get_limit(&agent_id).await.unwrap().unwrap();
        assert_eq!(back.spent_amount, 40);
    }

    #[tokio::test]
    async fn request_roundtrip_with_snapshot() {
        let store = SqliteStore::open_memory().unwrap();
        let limit = SpendingLimit::new(
            AgentId::generate(),
            Address::from_bytes([3u8; 32]),
            1_000,
            "weekly",
            0,
        );
        let r = TransferRequest::new(
            WorkspaceId::generate(),
            limit.agent_id,
            Address::from_bytes([4u8; 32]),
            250,
            limit.token_mint,
            "supplies",
            "restock",
            Some(limit.snapshot()),
            100,
        );
        store.insert_request(&r).await.unwrap();
        let back = store.get_request(&r.id).await.unwrap().unwrap();
        assert_eq!(r, back);
    }

    #[tokio::test]
    async fn activity_appends_and_lists_newest_first() {
        let store = SqliteStore::open_memory().unwrap();
        let ws = WorkspaceId::generate();
        for (i, name) in ["a", "b"].iter().enumerate() {
            let entry = ActivityEntry::new(
                ws,
                Actor::System,
                ActivityMetadata::WorkspaceCreated {
                    name: name.to_string(),
                },
                i as i64,
            );
            store.append_activity(&entry).await.unwrap();
        }

        let entries = store.list_activity(&ws, 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].created_at, 1);
    }

    #[tokio::test]
    async fn file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stipend.db");
        let a = agent(WorkspaceId::generate());

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_agent(&a).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let back = store.get_agent(&a.id).await.unwrap().unwrap();
        assert_eq!(back.name, "reporter");
    }
}
