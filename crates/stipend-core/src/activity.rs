//! Activity log: append-only audit records.
//!
//! Metadata is a closed tagged union per action kind with an
//! `Unstructured` fallback, not an open map, so every known action's
//! shape is checked at compile time.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::{ActivityId, AgentId, WorkspaceId};

/// Who performed the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Agent(AgentId),
    Human(Address),
    System,
}

/// Structured metadata for each action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityMetadata {
    WorkspaceCreated { name: String },
    MemberAdded { member: Address },
    MemberRemoved { member: Address },
    BudgetAdded {
        token_mint: Address,
        limit_amount: u64,
        period_type: String,
    },
    BudgetRemoved { token_mint: Address },
    AgentActivated { agent_id: AgentId },
    AgentRevoked { agent_id: AgentId },
    TransferExecuted { recipient: Address, amount: u64 },
    BatchExecuted {
        instruction_count: u32,
        estimated_outflow: u64,
    },
    ProposalCreated { proposal: Address, amount: u64 },
    ProposalApproved { proposal: Address },
    ProposalDenied { proposal: Address },
    /// Fallback for payloads with no structured shape.
    Unstructured(String),
}

impl ActivityMetadata {
    /// Coarse grouping for display and queries.
    pub fn category(&self) -> &'static str {
        match self {
            Self::WorkspaceCreated { .. } => "workspace",
            Self::MemberAdded { .. } | Self::MemberRemoved { .. } => "member",
            Self::BudgetAdded { .. } | Self::BudgetRemoved { .. } => "budget",
            Self::AgentActivated { .. } | Self::AgentRevoked { .. } => "agent",
            Self::TransferExecuted { .. } | Self::BatchExecuted { .. } => "transfer",
            Self::ProposalCreated { .. }
            | Self::ProposalApproved { .. }
            | Self::ProposalDenied { .. } => "proposal",
            Self::Unstructured(_) => "other",
        }
    }

    /// The action name recorded on the entry.
    pub fn action(&self) -> &'static str {
        match self {
            Self::WorkspaceCreated { .. } => "workspace_created",
            Self::MemberAdded { .. } => "member_added",
            Self::MemberRemoved { .. } => "member_removed",
            Self::BudgetAdded { .. } => "budget_added",
            Self::BudgetRemoved { .. } => "budget_removed",
            Self::AgentActivated { .. } => "agent_activated",
            Self::AgentRevoked { .. } => "agent_revoked",
            Self::TransferExecuted { .. } => "transfer_executed",
            Self::BatchExecuted { .. } => "batch_executed",
            Self::ProposalCreated { .. } => "proposal_created",
            Self::ProposalApproved { .. } => "proposal_approved",
            Self::ProposalDenied { .. } => "proposal_denied",
            Self::Unstructured(_) => "unstructured",
        }
    }
}

/// One append-only audit record. Never mutated or deleted; the store
/// exposes no update operation for these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: ActivityId,
    pub workspace_id: WorkspaceId,
    pub actor: Actor,
    /// Confirmed ledger signature, for actions that touched the chain.
    pub ledger_signature: Option<String>,
    pub amount: Option<u64>,
    pub metadata: ActivityMetadata,
    pub created_at: i64,
}

impl ActivityEntry {
    pub fn new(
        workspace_id: WorkspaceId,
        actor: Actor,
        metadata: ActivityMetadata,
        now: i64,
    ) -> Self {
        Self {
            id: ActivityId::generate(),
            workspace_id,
            actor,
            ledger_signature: None,
            amount: None,
            metadata,
            created_at: now,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.ledger_signature = Some(signature.into());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_and_action_names() {
        let meta = ActivityMetadata::TransferExecuted {
            recipient: Address::from_bytes([1u8; 32]),
            amount: 42,
        };
        assert_eq!(meta.category(), "transfer");
        assert_eq!(meta.action(), "transfer_executed");

        let fallback = ActivityMetadata::Unstructured("legacy import".into());
        assert_eq!(fallback.category(), "other");
    }

    #[test]
    fn builder_attaches_signature_and_amount() {
        let entry = ActivityEntry::new(
            WorkspaceId::generate(),
            Actor::System,
            ActivityMetadata::WorkspaceCreated { name: "ops".into() },
            7,
        )
        .with_signature("ab12")
        .with_amount(9);

        assert_eq!(entry.ledger_signature.as_deref(), Some("ab12"));
        assert_eq!(entry.amount, Some(9));
    }

    #[test]
    fn metadata_serde_roundtrip() {
        let meta = ActivityMetadata::BudgetAdded {
            token_mint: Address::from_bytes([2u8; 32]),
            limit_amount: 1_000,
            period_type: "weekly".into(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&meta, &mut buf).unwrap();
        let back: ActivityMetadata = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(meta, back);
    }
}
