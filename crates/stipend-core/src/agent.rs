//! Agents: automated principals acting on behalf of a workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::CoreError;
use crate::ids::{AgentId, WorkspaceId};

/// Lifecycle status of an agent.
///
/// `Provisioning` until the connect code is exchanged, `Connected` until
/// the on-chain membership transaction confirms, then `Active`.
/// `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Provisioning,
    Connected,
    Active,
    Paused,
    Revoked,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Connected => "connected",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(Self::Provisioning),
            "connected" => Some(Self::Connected),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    /// Whether `self -> to` is a legal lifecycle transition.
    pub fn can_transition_to(&self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, to) {
            (Revoked, _) => false,
            (_, Revoked) => true,
            (Provisioning, Connected) => true,
            (Connected, Active) => true,
            (Active, Paused) | (Paused, Active) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub workspace_id: WorkspaceId,
    pub name: String,

    /// Opaque key identifier understood by the remote custody signer.
    /// The private key never enters this process.
    pub custody_key_id: String,

    /// The agent's current ledger address (its custody public key).
    pub public_key: Address,

    pub status: AgentStatus,

    /// Proof-of-possession public key, persisted on v2 connect.
    pub pop_public_key: Option<Ed25519PublicKey>,

    /// Hash of the outstanding one-time connect code, if any.
    pub connect_code_hash: Option<Blake3Hash>,
    pub connect_code_expires_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Agent {
    /// Create a freshly provisioned agent.
    pub fn new(
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        custody_key_id: impl Into<String>,
        public_key: Address,
        now: i64,
    ) -> Self {
        Self {
            id: AgentId::generate(),
            workspace_id,
            name: name.into(),
            custody_key_id: custody_key_id.into(),
            public_key,
            status: AgentStatus::Provisioning,
            pop_public_key: None,
            connect_code_hash: None,
            connect_code_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a lifecycle transition, rejecting illegal ones.
    pub fn transition(&mut self, to: AgentStatus, now: i64) -> Result<(), CoreError> {
        if !self.status.can_transition_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
