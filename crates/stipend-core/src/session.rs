//! Session credentials.
//!
//! A session row stores only the Blake3 hash of its raw token; the hash
//! is the unique lookup key. Connect codes are single-use and deleted on
//! exchange. V2 refresh tokens carry a family id and a monotonically
//! increasing sequence so rotation is detectable.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Blake3Hash;
use crate::ids::{AgentId, FamilyId, SessionId, WorkspaceId};

/// Connect codes live ten minutes.
pub const CONNECT_CODE_TTL_MS: i64 = 10 * 60 * 1_000;
/// V1 bearer sessions live a day.
pub const SESSION_TTL_MS: i64 = 24 * 60 * 60 * 1_000;
/// V2 access tokens live five minutes.
pub const ACCESS_TTL_MS: i64 = 5 * 60 * 1_000;
/// V2 refresh tokens live thirty days.
pub const REFRESH_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1_000;

/// What kind of credential a session row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionKind {
    ConnectCode,
    Session,
    Access,
    Refresh,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectCode => "connect_code",
            Self::Session => "session",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connect_code" => Some(Self::ConnectCode),
            "session" => Some(Self::Session),
            "access" => Some(Self::Access),
            "refresh" => Some(Self::Refresh),
            _ => None,
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// Plain bearer.
    V1,
    /// Proof-of-possession bound.
    V2,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v1" => Some(Self::V1),
            "v2" => Some(Self::V2),
            _ => None,
        }
    }
}

/// A session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub workspace_id: WorkspaceId,
    pub token_hash: Blake3Hash,
    pub kind: SessionKind,
    pub protocol: Protocol,
    pub expires_at: i64,
    pub last_used_at: Option<i64>,
    pub created_at: i64,

    /// Rotation family, refresh tokens only.
    pub family: Option<FamilyId>,
    /// Position in the rotation family, refresh tokens only.
    pub sequence: Option<u64>,
}

impl Session {
    pub fn new(
        agent_id: AgentId,
        workspace_id: WorkspaceId,
        token_hash: Blake3Hash,
        kind: SessionKind,
        protocol: Protocol,
        expires_at: i64,
        now: i64,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            agent_id,
            workspace_id,
            token_hash,
            kind,
            protocol,
            expires_at,
            last_used_at: None,
            created_at: now,
            family: None,
            sequence: None,
        }
    }

    /// Attach rotation lineage (refresh tokens).
    pub fn with_family(mut self, family: FamilyId, sequence: u64) -> Self {
        self.family = Some(family);
        self.sequence = Some(sequence);
        self
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Whether this kind of session authenticates protected calls.
    pub fn is_presentable(&self) -> bool {
        matches!(self.kind, SessionKind::Session | SessionKind::Access)
    }
}
