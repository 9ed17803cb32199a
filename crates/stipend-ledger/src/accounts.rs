//! On-chain account model for the multisig program.
//!
//! The settings account is the workspace's root: it holds the member
//! set, the approval threshold, and a monotonically increasing
//! transaction index. The vault and per-entity sub-accounts are
//! derived addresses under the settings account.

use serde::{Deserialize, Serialize};
use stipend_core::{Address, CoreError};

use crate::error::LedgerError;

/// One member of a workspace's multisig configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub address: Address,
    /// Agents are members with spending routed through budgets.
    pub is_agent: bool,
}

/// The multisig settings account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsAccount {
    pub members: Vec<Member>,
    /// Human approvals required to execute a proposal.
    pub threshold: u32,
    /// Index assigned to the next proposal.
    pub transaction_index: u64,
}

impl SettingsAccount {
    pub fn new(creator: Address, threshold: u32) -> Self {
        Self {
            members: vec![Member {
                address: creator,
                is_agent: false,
            }],
            threshold,
            transaction_index: 0,
        }
    }

    pub fn has_member(&self, address: &Address) -> bool {
        self.members.iter().any(|m| &m.address == address)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("settings account encodes");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        ciborium::from_reader(bytes).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

/// Derive the settings address from a caller-generated one-time seed.
pub fn settings_address(seed: &Address) -> Address {
    Address::derive(seed, "settings")
}

/// Derive the vault address of a settings account.
pub fn vault_address(settings: &Address) -> Address {
    Address::derive(settings, "vault")
}

/// Derive the budget sub-account for an agent.
pub fn budget_address(settings: &Address, agent: &Address) -> Address {
    Address::derive(settings, &format!("budget/{}", agent.to_hex()))
}

/// Derive a proposal sub-account by index.
pub fn proposal_address(settings: &Address, index: u64) -> Address {
    Address::derive(settings, &format!("proposal/{}", index))
}

/// Operations the multisig program executes. Serialized as CBOR into
/// instruction data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultisigOp {
    CreateSettings {
        creator: Address,
        threshold: u32,
    },
    AddMember {
        member: Address,
        is_agent: bool,
    },
    RemoveMember {
        member: Address,
    },
    CreateBudget {
        agent: Address,
        token_mint: Address,
        limit_amount: u64,
        period_type: String,
    },
    RemoveBudget {
        agent: Address,
    },
    /// Draw within budget, single signature round (sponsor + agent).
    DrawBudget {
        agent: Address,
        recipient: Address,
        amount: u64,
    },
    /// Execute a validated batch of caller-declared instructions with
    /// the vault as program-side authority.
    ExecuteBatch {
        instructions: Vec<stipend_core::Instruction>,
    },
    /// Over-budget spend: create a proposal awaiting human approvals.
    CreateProposal {
        index: u64,
        recipient: Address,
        amount: u64,
    },
    ApproveProposal {
        proposal: Address,
    },
    DenyProposal {
        proposal: Address,
    },
}

impl MultisigOp {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("multisig op encodes");
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip() {
        let creator = Address::from_bytes([1u8; 32]);
        let mut settings = SettingsAccount::new(creator, 2);
        settings.members.push(Member {
            address: Address::from_bytes([2u8; 32]),
            is_agent: true,
        });
        settings.transaction_index = 7;

        let back = SettingsAccount::from_bytes(&settings.to_bytes()).unwrap();
        assert_eq!(settings, back);
        assert!(back.has_member(&creator));
    }

    #[test]
    fn derivations_are_stable_and_distinct() {
        let seed = Address::from_bytes([3u8; 32]);
        let settings = settings_address(&seed);
        let agent = Address::from_bytes([4u8; 32]);

        assert_eq!(settings, settings_address(&seed));
        assert_ne!(settings, vault_address(&settings));
        assert_ne!(budget_address(&settings, &agent), vault_address(&settings));
        assert_ne!(
            proposal_address(&settings, 1),
            proposal_address(&settings, 2)
        );
    }

    #[test]
    fn op_roundtrip() {
        let op = MultisigOp::DrawBudget {
            agent: Address::from_bytes([5u8; 32]),
            recipient: Address::from_bytes([6u8; 32]),
            amount: 99,
        };
        assert_eq!(MultisigOp::from_bytes(&op.to_bytes()).unwrap(), op);
    }

    #[test]
    fn garbage_settings_bytes_fail_decode() {
        assert!(SettingsAccount::from_bytes(&[0xFF, 0x00]).is_err());
    }
}
