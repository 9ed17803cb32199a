//! Transfer/execute requests.
//!
//! A request row is created in `Pending` before any ledger work starts,
//! so callers can see it in flight. It leaves `Pending` only after the
//! ledger leg confirms (or fails), never speculatively.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::error::CoreError;
use crate::ids::{AgentId, RequestId, WorkspaceId};
use crate::limit::LimitSnapshot;

/// Maximum note length accepted on a request.
pub const MAX_NOTE_LEN: usize = 256;
/// Maximum justification length accepted on a request.
pub const MAX_JUSTIFICATION_LEN: usize = 1_024;

/// Request status state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Created, ledger leg not yet confirmed.
    Pending,
    /// Budget draw confirmed on-chain.
    Executed,
    /// Over budget; an approval proposal is on-chain awaiting humans.
    PendingApproval,
    /// Humans approved and the approval confirmed.
    Approved,
    /// Humans denied and the denial confirmed.
    Denied,
    /// The ledger leg failed; error captured on the row.
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executed => "executed",
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "executed" => Some(Self::Executed),
            "pending_approval" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Executed | Self::Approved | Self::Denied | Self::Failed
        )
    }

    fn can_advance_to(&self, to: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, to) {
            (Pending, Executed) | (Pending, PendingApproval) | (Pending, Failed) => true,
            (PendingApproval, Approved) | (PendingApproval, Denied) | (PendingApproval, Failed) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proposed spend by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: RequestId,
    pub workspace_id: WorkspaceId,
    pub agent_id: AgentId,
    pub recipient: Address,
    pub amount: u64,
    pub token_mint: Address,
    pub note: String,
    pub justification: String,
    pub status: RequestStatus,

    /// Spending-limit state frozen at creation, for audit.
    pub limit_snapshot: Option<LimitSnapshot>,

    /// On-chain proposal account, once the approval path creates one.
    pub proposal_ref: Option<Address>,

    /// Captured failure, terminal `Failed` only.
    pub error: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl TransferRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: WorkspaceId,
        agent_id: AgentId,
        recipient: Address,
        amount: u64,
        token_mint: Address,
        note: impl Into<String>,
        justification: impl Into<String>,
        limit_snapshot: Option<LimitSnapshot>,
        now: i64,
    ) -> Self {
        Self {
            id: RequestId::generate(),
            workspace_id,
            agent_id,
            recipient,
            amount,
            token_mint,
            note: note.into(),
            justification: justification.into(),
            status: RequestStatus::Pending,
            limit_snapshot,
            proposal_ref: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the status, rejecting transitions the state machine does
    /// not allow (a terminal row never moves again).
    pub fn advance(&mut self, to: RequestStatus, now: i64) -> Result<(), CoreError> {
        if !self.status.can_advance_to(to) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Move to `Failed`, capturing the error.
    pub fn fail(&mut self, error: impl Into<String>, now: i64) -> Result<(), CoreError> {
        self.advance(RequestStatus::Failed, now)?;
        self.error = Some(error.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransferRequest {
        TransferRequest::new(
            WorkspaceId::generate(),
            AgentId::generate(),
            Address::from_bytes([7u8; 32]),
            500,
            Address::from_bytes([8u8; 32]),
            "supplies",
            "weekly restock",
            None,
            100,
        )
    }

    #[test]
    fn pending_to_executed() {
        let mut r = request();
        r.advance(RequestStatus::Executed, 200).unwrap();
        assert!(r.status.is_terminal());
    }

    #[test]
    fn approval_path() {
        let mut r = request();
        r.advance(RequestStatus::PendingApproval, 200).unwrap();
        r.advance(RequestStatus::Approved, 300).unwrap();
        assert_eq!(r.status, RequestStatus::Approved);
    }

    #[test]
    fn failed_captures_error() {
        let mut r = request();
        r.fail("Failed to submit transaction: connection reset", 200)
            .unwrap();
        assert_eq!(r.status, RequestStatus::Failed);
        assert!(r.error.as_deref().unwrap().contains("connection reset"));
    }

    #[test]
    fn terminal_rows_never_move() {
        let mut r = request();
        r.advance(RequestStatus::Executed, 200).unwrap();
        assert!(r.advance(RequestStatus::Failed, 300).is_err());
        assert!(r.advance(RequestStatus::Pending, 300).is_err());
    }

    #[test]
    fn no_shortcut_from_pending_to_approved() {
        let mut r = request();
        assert!(r.advance(RequestStatus::Approved, 200).is_err());
    }
}
