//! Spending limits: per (agent, token) rolling budgets.
//!
//! The period type is kept as stored text and resolved at evaluation
//! time by the policy engine, so an unrecognized value fails closed
//! instead of being unrepresentable. `spent_amount` only increases, via
//! confirmed spends; the period reset is computed at evaluation, never
//! swept by a background job.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ids::AgentId;

/// A rolling budget for one (agent, token) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingLimit {
    pub agent_id: AgentId,
    pub token_mint: Address,
    pub limit_amount: u64,
    pub spent_amount: u64,
    /// "daily" | "weekly" | "monthly"; unrecognized text denies.
    pub period_type: String,
    pub period_start: i64,
    /// On-chain budget account, once the add-budget action confirms.
    pub onchain_key: Option<Address>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SpendingLimit {
    pub fn new(
        agent_id: AgentId,
        token_mint: Address,
        limit_amount: u64,
        period_type: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            agent_id,
            token_mint,
            limit_amount,
            spent_amount: 0,
            period_type: period_type.into(),
            period_start: now,
            onchain_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Freeze the limit state for a request's audit snapshot.
    pub fn snapshot(&self) -> LimitSnapshot {
        LimitSnapshot {
            limit_amount: self.limit_amount,
            spent_amount: self.spent_amount,
            period_type: self.period_type.clone(),
            period_start: self.period_start,
        }
    }
}

/// The limit state frozen at request creation, kept for audit even if
/// the live limit later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSnapshot {
    pub limit_amount: u64,
    pub spent_amount: u64,
    pub period_type: String,
    pub period_start: i64,
}
