//! Workspaces: the custodial group owning a vault.
//!
//! Full workspace/member CRUD lives outside this system; this record is
//! the minimum the on-chain actions need (addresses, creator, an
//! optional program-allowlist override).

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::WorkspaceId;

/// A workspace record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    /// On-chain multisig settings account.
    pub settings_address: Address,
    /// Derived treasury address holding the workspace's funds.
    pub vault_address: Address,
    /// The human who created the workspace (settings authority).
    pub creator: Address,
    /// Per-workspace program allowlist override; `None` uses the
    /// default set.
    pub program_allowlist: Option<Vec<Address>>,
    pub created_at: i64,
}

impl Workspace {
    /// Derive the vault address for a settings account.
    pub fn vault_of(settings: &Address) -> Address {
        Address::derive(settings, "vault")
    }

    pub fn new(
        name: impl Into<String>,
        settings_address: Address,
        creator: Address,
        now: i64,
    ) -> Self {
        Self {
            id: WorkspaceId::generate(),
            name: name.into(),
            settings_address,
            vault_address: Self::vault_of(&settings_address),
            creator,
            program_allowlist: None,
            created_at: now,
        }
    }
}
