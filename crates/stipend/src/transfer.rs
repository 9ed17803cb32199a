//! Agent-initiated spends: transfer execution, arbitrary-instruction
//! execution, and the human approval path for over-budget requests.
//!
//! The request row is created in `Pending` before Phase 1 builds
//! anything, so callers can see it in flight. On any ledger failure
//! the row moves to `Failed` with the captured error; it is never
//! silently abandoned. All other off-chain writes happen strictly
//! after confirmation.

use stipend_core::{
    ActivityEntry, ActivityMetadata, Actor, Address, Agent, AgentId, AgentStatus, RequestId,
    RequestStatus, SpendingLimit, Transaction, TransferRequest, Workspace,
    MAX_JUSTIFICATION_LEN, MAX_NOTE_LEN,
};
use stipend_ledger::{accounts, builders, sign_with_remote, BuiltTransaction};
use stipend_policy::{
    default_allowlist, estimate_vault_outflow, evaluate, validate_instructions,
    DeclaredInstruction, SpendDecision,
};

use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// Result of an agent-initiated spend.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub request: TransferRequest,
    /// The budget verdict, when a budget existed to evaluate.
    pub decision: Option<SpendDecision>,
    /// Confirmed ledger signature of whichever leg ran.
    pub signature: String,
}

/// Snapshot returned by the status call.
#[derive(Debug, Clone)]
pub struct AgentStatusView {
    pub agent_id: AgentId,
    pub workspace_id: stipend_core::WorkspaceId,
    pub status: AgentStatus,
    pub limit: Option<SpendingLimit>,
    /// Period-aware remaining/rollover view of the budget, if any.
    pub decision: Option<SpendDecision>,
}

fn validate_request_text(note: &str, justification: &str) -> Result<()> {
    if note.len() > MAX_NOTE_LEN {
        return Err(EngineError::ValidationFailed(format!(
            "note exceeds {} characters",
            MAX_NOTE_LEN
        )));
    }
    if justification.len() > MAX_JUSTIFICATION_LEN {
        return Err(EngineError::ValidationFailed(format!(
            "justification exceeds {} characters",
            MAX_JUSTIFICATION_LEN
        )));
    }
    Ok(())
}

impl Engine {
    // ─────────────────────────────────────────────────────────────────────────
    // Transfer execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Execute (or propose) a transfer on behalf of an agent.
    ///
    /// Within budget, the path is a single-signature-round budget draw;
    /// on confirmation the persisted spent amount is incremented (and
    /// the period rolled if it had elapsed). Over budget - or with no
    /// budget configured at all, which is a hard deny regardless of
    /// amount - the path instead creates an on-chain approval proposal
    /// and leaves the spent amount untouched.
    ///
    /// Budget evaluation and the on-chain leg are not serialized per
    /// agent: two concurrent requests can both observe remaining budget
    /// before either confirms. Callers that need strict sequencing must
    /// serialize externally.
    pub async fn execute_transfer(
        &self,
        agent_id: &AgentId,
        recipient: Address,
        amount: u64,
        note: &str,
        justification: &str,
        now: i64,
    ) -> Result<TransferOutcome> {
        validate_request_text(note, justification)?;
        if amount == 0 {
            return Err(EngineError::ValidationFailed("amount must be positive".into()));
        }

        let agent = self.load_agent(agent_id).await?;
        if agent.status != AgentStatus::Active {
            return Err(EngineError::ValidationFailed(format!(
                "agent in status {} cannot spend",
                agent.status
            )));
        }
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let limit = self.store().get_limit(&agent.id).await?;

        let mut request = TransferRequest::new(
            workspace.id,
            agent.id,
            recipient,
            amount,
            limit
                .as_ref()
                .map(|l| l.token_mint)
                .unwrap_or(Address::ZERO),
            note,
            justification,
            limit.as_ref().map(|l| l.snapshot()),
            now,
        );
        self.store().insert_request(&request).await?;

        let decision = limit.as_ref().map(|l| {
            evaluate(
                l.spent_amount,
                l.limit_amount,
                amount,
                l.period_start,
                &l.period_type,
                now,
            )
        });

        let leg = match (&limit, &decision) {
            (Some(limit), Some(d)) if d.allowed => {
                self.draw_leg(&mut request, &agent, &workspace, limit.clone(), *d, now)
                    .await
            }
            _ => self.proposal_leg(&mut request, &agent, &workspace, now).await,
        };

        match leg {
            Ok(signature) => Ok(TransferOutcome {
                request,
                decision,
                signature,
            }),
            Err(e) => self.fail_request(request, e, now).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Arbitrary-instruction execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and execute a caller-declared instruction batch through
    /// the workspace vault.
    ///
    /// The batch is validated (bounds, addresses, allowlist) before any
    /// network call. The advisory vault-outflow estimate drives the
    /// budget verdict; a batch with no vault outflow executes without a
    /// budget draw.
    pub async fn execute_instructions(
        &self,
        agent_id: &AgentId,
        declared: &[DeclaredInstruction],
        note: &str,
        justification: &str,
        now: i64,
    ) -> Result<TransferOutcome> {
        validate_request_text(note, justification)?;

        let agent = self.load_agent(agent_id).await?;
        if agent.status != AgentStatus::Active {
            return Err(EngineError::ValidationFailed(format!(
                "agent in status {} cannot spend",
                agent.status
            )));
        }
        let workspace = self.load_workspace(&agent.workspace_id).await?;

        let allowlist = workspace
            .program_allowlist
            .clone()
            .unwrap_or_else(default_allowlist);
        let inner = validate_instructions(declared, &workspace.vault_address, &allowlist)?;
        let estimate = estimate_vault_outflow(&inner, &workspace.vault_address);
        let limit = self.store().get_limit(&agent.id).await?;

        let mut request = TransferRequest::new(
            workspace.id,
            agent.id,
            Address::ZERO,
            estimate,
            limit
                .as_ref()
                .map(|l| l.token_mint)
                .unwrap_or(Address::ZERO),
            note,
            justification,
            limit.as_ref().map(|l| l.snapshot()),
            now,
        );
        self.store().insert_request(&request).await?;

        let decision = match (&limit, estimate) {
            (Some(l), e) if e > 0 => Some(evaluate(
                l.spent_amount,
                l.limit_amount,
                e,
                l.period_start,
                &l.period_type,
                now,
            )),
            _ => None,
        };

        let allowed = estimate == 0 || decision.map_or(false, |d| d.allowed);
        let leg = if allowed {
            self.batch_leg(&mut request, &agent, &workspace, inner, limit, decision, now)
                .await
        } else {
            self.proposal_leg(&mut request, &agent, &workspace, now).await
        };

        match leg {
            Ok(signature) => Ok(TransferOutcome {
                request,
                decision,
                signature,
            }),
            Err(e) => self.fail_request(request, e, now).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Proposal approval / denial (human path)
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn build_proposal_approval(
        &self,
        request_id: &RequestId,
        authority: Address,
    ) -> Result<BuiltTransaction> {
        let (request, workspace) = self.load_pending_approval(request_id).await?;
        let proposal = request
            .proposal_ref
            .ok_or_else(|| EngineError::NotFound(format!("proposal for request {}", request.id)))?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_approve_proposal(
            self.sponsor(),
            workspace.settings_address,
            authority,
            proposal,
            blockhash,
        )?)
    }

    /// Phase 2 of proposal approval. On a ledger failure the request
    /// stays `PendingApproval` - the on-chain proposal still exists and
    /// another member can retry.
    pub async fn commit_proposal_approval(
        &self,
        request_id: &RequestId,
        authority: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<TransferRequest> {
        let (mut request, workspace) = self.load_pending_approval(request_id).await?;
        let proposal = request
            .proposal_ref
            .ok_or_else(|| EngineError::NotFound(format!("proposal for request {}", request.id)))?;

        let signature = self.submit_and_confirm(&signed).await?;

        request.advance(RequestStatus::Approved, now)?;
        self.store().update_request(&request).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::ProposalApproved { proposal },
                now,
            )
            .with_signature(&signature)
            .with_amount(request.amount),
        )
        .await?;
        Ok(request)
    }

    pub async fn build_proposal_denial(
        &self,
        request_id: &RequestId,
        authority: Address,
    ) -> Result<BuiltTransaction> {
        let (request, workspace) = self.load_pending_approval(request_id).await?;
        let proposal = request
            .proposal_ref
            .ok_or_else(|| EngineError::NotFound(format!("proposal for request {}", request.id)))?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_deny_proposal(
            self.sponsor(),
            workspace.settings_address,
            authority,
            proposal,
            blockhash,
        )?)
    }

    pub async fn commit_proposal_denial(
        &self,
        request_id: &RequestId,
        authority: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<TransferRequest> {
        let (mut request, workspace) = self.load_pending_approval(request_id).await?;
        let proposal = request
            .proposal_ref
            .ok_or_else(|| EngineError::NotFound(format!("proposal for request {}", request.id)))?;

        let signature = self.submit_and_confirm(&signed).await?;

        request.advance(RequestStatus::Denied, now)?;
        self.store().update_request(&request).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::ProposalDenied { proposal },
                now,
            )
            .with_signature(&signature),
        )
        .await?;
        Ok(request)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    /// Status snapshot for an agent: lifecycle state plus a
    /// period-aware view of its budget.
    pub async fn agent_status(&self, agent_id: &AgentId, now: i64) -> Result<AgentStatusView> {
        let agent = self.load_agent(agent_id).await?;
        let limit = self.store().get_limit(&agent.id).await?;
        let decision = limit.as_ref().map(|l| {
            evaluate(
                l.spent_amount,
                l.limit_amount,
                0,
                l.period_start,
                &l.period_type,
                now,
            )
        });
        Ok(AgentStatusView {
            agent_id: agent.id,
            workspace_id: agent.workspace_id,
            status: agent.status,
            limit,
            decision,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Legs
    // ─────────────────────────────────────────────────────────────────────────

    async fn load_pending_approval(
        &self,
        request_id: &RequestId,
    ) -> Result<(TransferRequest, Workspace)> {
        let request = self
            .store()
            .get_request(request_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("request {}", request_id)))?;
        if request.status != RequestStatus::PendingApproval {
            return Err(EngineError::ValidationFailed(format!(
                "request in status {} has no open proposal",
                request.status
            )));
        }
        let workspace = self.load_workspace(&request.workspace_id).await?;
        Ok((request, workspace))
    }

    async fn fail_request(
        &self,
        mut request: TransferRequest,
        error: EngineError,
        now: i64,
    ) -> Result<TransferOutcome> {
        if request.fail(error.to_string(), now).is_ok() {
            if let Err(store_err) = self.store().update_request(&request).await {
                tracing::warn!(request = %request.id, %store_err, "failed to record request failure");
            }
        }
        Err(error)
    }

    /// In-budget leg: draw from the vault, then record the spend.
    async fn draw_leg(
        &self,
        request: &mut TransferRequest,
        agent: &Agent,
        workspace: &Workspace,
        mut limit: SpendingLimit,
        decision: SpendDecision,
        now: i64,
    ) -> Result<String> {
        let blockhash = self.blockhash().await?;
        let built = builders::build_draw_budget(
            self.sponsor(),
            workspace.settings_address,
            agent.public_key,
            request.recipient,
            request.amount,
            blockhash,
        )?;
        let mut tx = built.transaction;
        sign_with_remote(
            &mut tx,
            self.signer().as_ref(),
            &agent.custody_key_id,
            agent.public_key,
        )
        .await
        .map_err(|e| EngineError::LedgerSubmitFailed(e.to_string()))?;

        let signature = self.submit_and_confirm(&tx).await?;

        // Confirmed: persist the rollover (if the period elapsed) and
        // the incremented spent amount in one write.
        if decision.period_expired {
            limit.period_start = now;
            limit.spent_amount = request.amount;
        } else {
            limit.spent_amount += request.amount;
        }
        limit.updated_at = now;
        self.store().upsert_limit(&limit).await?;

        request.advance(RequestStatus::Executed, now)?;
        self.store().update_request(request).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Agent(agent.id),
                ActivityMetadata::TransferExecuted {
                    recipient: request.recipient,
                    amount: request.amount,
                },
                now,
            )
            .with_signature(&signature)
            .with_amount(request.amount),
        )
        .await?;

        tracing::info!(
            request = %request.id,
            amount = request.amount,
            %signature,
            "transfer executed within budget"
        );
        Ok(signature)
    }

    /// Validated-batch leg. Increments spent only when the batch drew
    /// from the vault and a budget exists.
    #[allow(clippy::too_many_arguments)]
    async fn batch_leg(
        &self,
        request: &mut TransferRequest,
        agent: &Agent,
        workspace: &Workspace,
        inner: Vec<stipend_core::Instruction>,
        limit: Option<SpendingLimit>,
        decision: Option<SpendDecision>,
        now: i64,
    ) -> Result<String> {
        let instruction_count = inner.len() as u32;
        let blockhash = self.blockhash().await?;
        let built = builders::build_execute_batch(
            self.sponsor(),
            workspace.settings_address,
            agent.public_key,
            inner,
            blockhash,
        )?;
        let mut tx = built.transaction;
        sign_with_remote(
            &mut tx,
            self.signer().as_ref(),
            &agent.custody_key_id,
            agent.public_key,
        )
        .await
        .map_err(|e| EngineError::LedgerSubmitFailed(e.to_string()))?;

        let signature = self.submit_and_confirm(&tx).await?;

        if request.amount > 0 {
            if let (Some(mut limit), Some(decision)) = (limit, decision) {
                if decision.period_expired {
                    limit.period_start = now;
                    limit.spent_amount = request.amount;
                } else {
                    limit.spent_amount += request.amount;
                }
                limit.updated_at = now;
                self.store().upsert_limit(&limit).await?;
            }
        }

        request.advance(RequestStatus::Executed, now)?;
        self.store().update_request(request).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Agent(agent.id),
                ActivityMetadata::BatchExecuted {
                    instruction_count,
                    estimated_outflow: request.amount,
                },
                now,
            )
            .with_signature(&signature)
            .with_amount(request.amount),
        )
        .await?;
        Ok(signature)
    }

    /// Over-budget (or no-budget) leg: create the on-chain approval
    /// proposal. The spent amount stays untouched.
    async fn proposal_leg(
        &self,
        request: &mut TransferRequest,
        agent: &Agent,
        workspace: &Workspace,
        now: i64,
    ) -> Result<String> {
        let blockhash = self.blockhash().await?;
        let settings = self.fetch_settings(&workspace.settings_address).await?;
        let index = settings.transaction_index;

        let built = builders::build_create_proposal(
            self.sponsor(),
            workspace.settings_address,
            agent.public_key,
            index,
            request.recipient,
            request.amount,
            blockhash,
        )?;
        let mut tx = built.transaction;
        sign_with_remote(
            &mut tx,
            self.signer().as_ref(),
            &agent.custody_key_id,
            agent.public_key,
        )
        .await
        .map_err(|e| EngineError::LedgerSubmitFailed(e.to_string()))?;

        let signature = self.submit_and_confirm(&tx).await?;

        let proposal = accounts::proposal_address(&workspace.settings_address, index);
        request.proposal_ref = Some(proposal);
        request.advance(RequestStatus::PendingApproval, now)?;
        self.store().update_request(request).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Agent(agent.id),
                ActivityMetadata::ProposalCreated {
                    proposal,
                    amount: request.amount,
                },
                now,
            )
            .with_signature(&signature)
            .with_amount(request.amount),
        )
        .await?;

        tracing::info!(
            request = %request.id,
            amount = request.amount,
            %signature,
            "approval proposal created"
        );
        Ok(signature)
    }
}
