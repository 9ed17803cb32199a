//! The Engine: atomic on-chain/off-chain commit orchestration.
//!
//! Every action that changes both ledger state and off-chain
//! bookkeeping is two-phase:
//!
//! - **Phase 1 (build, read-only)** - resolve on-chain state, compose
//!   the instruction set, attach the sponsor as fee payer, partially
//!   sign with the sponsor key, hand the transaction out for the
//!   remaining signature(s).
//! - **Phase 2 (submit & confirm, side-effecting)** - submit the fully
//!   signed transaction and await confirmation. A submit or confirm
//!   failure propagates with ZERO off-chain writes. Only after
//!   confirmation are entities persisted and the activity entry
//!   appended.
//!
//! No speculative or optimistic off-chain state is ever written for an
//! action that touches the ledger.

use std::sync::Arc;

use stipend_core::{
    ActivityEntry, ActivityMetadata, Actor, Address, Agent, AgentId, AgentStatus, Blockhash,
    Keypair, SpendingLimit, Transaction, Workspace, WorkspaceId,
};
use stipend_ledger::{
    accounts, builders, BuiltTransaction, LedgerRpc, RemoteSigner, SettingsAccount,
};
use stipend_policy::PeriodType;
use stipend_store::Store;

use crate::error::{EngineError, Result};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Verify the full signature set locally before submitting, so an
    /// incomplete transaction fails as validation rather than a ledger
    /// round trip.
    pub verify_before_submit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_before_submit: true,
        }
    }
}

/// The unified engine over the injected ports.
pub struct Engine {
    store: Arc<dyn Store>,
    rpc: Arc<dyn LedgerRpc>,
    signer: Arc<dyn RemoteSigner>,
    /// Fee sponsor. Pays fees and rent on every transaction and holds
    /// no other role anywhere.
    sponsor: Keypair,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn Store>,
        rpc: Arc<dyn LedgerRpc>,
        signer: Arc<dyn RemoteSigner>,
        sponsor: Keypair,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            rpc,
            signer,
            sponsor,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn sponsor_address(&self) -> Address {
        self.sponsor.public_key().into()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared plumbing
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) async fn blockhash(&self) -> Result<Blockhash> {
        self.rpc.latest_blockhash().await.map_err(EngineError::read)
    }

    pub(crate) async fn fetch_settings(&self, address: &Address) -> Result<SettingsAccount> {
        let data = self
            .rpc
            .get_account(address)
            .await
            .map_err(EngineError::read)?
            .ok_or_else(|| EngineError::NotFound(format!("settings account {}", address)))?;
        SettingsAccount::from_bytes(&data).map_err(EngineError::read)
    }

    pub(crate) async fn load_workspace(&self, id: &WorkspaceId) -> Result<Workspace> {
        self.store
            .get_workspace(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workspace {}", id)))
    }

    pub(crate) async fn load_agent(&self, id: &AgentId) -> Result<Agent> {
        self.store
            .get_agent(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("agent {}", id)))
    }

    pub(crate) fn sponsor(&self) -> &Keypair {
        &self.sponsor
    }

    pub(crate) fn signer(&self) -> &Arc<dyn RemoteSigner> {
        &self.signer
    }

    /// Phase 2 core: submit, then confirm. Either failure returns
    /// before any caller write runs.
    pub(crate) async fn submit_and_confirm(&self, transaction: &Transaction) -> Result<String> {
        if self.config.verify_before_submit {
            transaction
                .verify_signatures()
                .map_err(|e| EngineError::ValidationFailed(e.to_string()))?;
        }
        let signature = self
            .rpc
            .send_transaction(transaction)
            .await
            .map_err(|e| EngineError::LedgerSubmitFailed(e.to_string()))?;
        self.rpc
            .confirm_transaction(&signature)
            .await
            .map_err(|e| EngineError::LedgerConfirmFailed(e.to_string()))?;
        Ok(signature)
    }

    pub(crate) async fn log_activity(&self, entry: ActivityEntry) -> Result<()> {
        self.store.append_activity(&entry).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Workspace creation
    // ─────────────────────────────────────────────────────────────────────────

    /// Phase 1: compose the workspace-creation transaction. `seed` is
    /// the caller-generated one-time create key for the settings
    /// account.
    pub async fn build_workspace_creation(
        &self,
        creator: Address,
        threshold: u32,
        seed: &Address,
    ) -> Result<BuiltTransaction> {
        let blockhash = self.blockhash().await?;
        Ok(builders::build_create_workspace(
            &self.sponsor,
            creator,
            threshold,
            seed,
            blockhash,
        )?)
    }

    /// Phase 2: submit the creator-signed transaction; persist the
    /// workspace record only after confirmation.
    pub async fn commit_workspace_creation(
        &self,
        name: &str,
        creator: Address,
        seed: &Address,
        signed: Transaction,
        now: i64,
    ) -> Result<Workspace> {
        let signature = self.submit_and_confirm(&signed).await?;

        let settings = accounts::settings_address(seed);
        let workspace = Workspace::new(name, settings, creator, now);
        self.store.insert_workspace(&workspace).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(creator),
                ActivityMetadata::WorkspaceCreated {
                    name: name.to_string(),
                },
                now,
            )
            .with_signature(&signature),
        )
        .await?;

        tracing::info!(workspace = %workspace.id, %signature, "workspace created");
        Ok(workspace)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Member add / remove
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn build_member_addition(
        &self,
        workspace_id: &WorkspaceId,
        authority: Address,
        member: Address,
    ) -> Result<BuiltTransaction> {
        let workspace = self.load_workspace(workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_add_member(
            &self.sponsor,
            workspace.settings_address,
            authority,
            member,
            false,
            blockhash,
        )?)
    }

    pub async fn commit_member_addition(
        &self,
        workspace_id: &WorkspaceId,
        authority: Address,
        member: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<()> {
        let workspace = self.load_workspace(workspace_id).await?;
        let signature = self.submit_and_confirm(&signed).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::MemberAdded { member },
                now,
            )
            .with_signature(&signature),
        )
        .await
    }

    pub async fn build_member_removal(
        &self,
        workspace_id: &WorkspaceId,
        authority: Address,
        member: Address,
    ) -> Result<BuiltTransaction> {
        let workspace = self.load_workspace(workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_remove_member(
            &self.sponsor,
            workspace.settings_address,
            authority,
            member,
            blockhash,
        )?)
    }

    pub async fn commit_member_removal(
        &self,
        workspace_id: &WorkspaceId,
        authority: Address,
        member: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<()> {
        let workspace = self.load_workspace(workspace_id).await?;
        let signature = self.submit_and_confirm(&signed).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::MemberRemoved { member },
                now,
            )
            .with_signature(&signature),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Budget add / remove
    // ─────────────────────────────────────────────────────────────────────────

    /// Phase 1 for budget creation. The period type is validated here,
    /// before anything reaches the ledger.
    pub async fn build_budget_addition(
        &self,
        agent_id: &AgentId,
        authority: Address,
        token_mint: Address,
        limit_amount: u64,
        period_type: &str,
    ) -> Result<BuiltTransaction> {
        if PeriodType::parse(period_type).is_none() {
            return Err(EngineError::ValidationFailed(format!(
                "unknown period type: {}",
                period_type
            )));
        }
        let agent = self.load_agent(agent_id).await?;
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_create_budget(
            &self.sponsor,
            workspace.settings_address,
            authority,
            agent.public_key,
            token_mint,
            limit_amount,
            period_type,
            blockhash,
        )?)
    }

    /// Phase 2 for budget creation: on confirmation, upsert the limit
    /// record (replacing any previous budget for the agent) and log.
    #[allow(clippy::too_many_arguments)]
    pub async fn commit_budget_addition(
        &self,
        agent_id: &AgentId,
        authority: Address,
        token_mint: Address,
        limit_amount: u64,
        period_type: &str,
        signed: Transaction,
        now: i64,
    ) -> Result<SpendingLimit> {
        let agent = self.load_agent(agent_id).await?;
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let signature = self.submit_and_confirm(&signed).await?;

        let mut limit = SpendingLimit::new(agent.id, token_mint, limit_amount, period_type, now);
        limit.onchain_key = Some(accounts::budget_address(
            &workspace.settings_address,
            &agent.public_key,
        ));
        self.store.upsert_limit(&limit).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::BudgetAdded {
                    token_mint,
                    limit_amount,
                    period_type: period_type.to_string(),
                },
                now,
            )
            .with_signature(&signature)
            .with_amount(limit_amount),
        )
        .await?;
        Ok(limit)
    }

    pub async fn build_budget_removal(
        &self,
        agent_id: &AgentId,
        authority: Address,
    ) -> Result<BuiltTransaction> {
        let agent = self.load_agent(agent_id).await?;
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_remove_budget(
            &self.sponsor,
            workspace.settings_address,
            authority,
            agent.public_key,
            blockhash,
        )?)
    }

    pub async fn commit_budget_removal(
        &self,
        agent_id: &AgentId,
        authority: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<()> {
        let agent = self.load_agent(agent_id).await?;
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let limit = self
            .store
            .get_limit(&agent.id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("budget for agent {}", agent.id)))?;

        let signature = self.submit_and_confirm(&signed).await?;

        self.store.delete_limit(&agent.id).await?;
        self.log_activity(
            ActivityEntry::new(
                workspace.id,
                Actor::Human(authority),
                ActivityMetadata::BudgetRemoved {
                    token_mint: limit.token_mint,
                },
                now,
            )
            .with_signature(&signature),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent activation / revocation
    // ─────────────────────────────────────────────────────────────────────────

    /// Phase 1: the agent becomes an on-chain member. Requires a
    /// connected agent; the off-chain status flips to Active only after
    /// the membership transaction confirms.
    pub async fn build_agent_activation(
        &self,
        agent_id: &AgentId,
        authority: Address,
    ) -> Result<BuiltTransaction> {
        let agent = self.load_agent(agent_id).await?;
        if !agent.status.can_transition_to(AgentStatus::Active) {
            return Err(EngineError::ValidationFailed(format!(
                "agent in status {} cannot be activated",
                agent.status
            )));
        }
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_add_member(
            &self.sponsor,
            workspace.settings_address,
            authority,
            agent.public_key,
            true,
            blockhash,
        )?)
    }

    pub async fn commit_agent_activation(
        &self,
        agent_id: &AgentId,
        authority: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<Agent> {
        let mut agent = self.load_agent(agent_id).await?;
        let signature = self.submit_and_confirm(&signed).await?;

        agent.transition(AgentStatus::Active, now)?;
        self.store.update_agent(&agent).await?;
        self.log_activity(
            ActivityEntry::new(
                agent.workspace_id,
                Actor::Human(authority),
                ActivityMetadata::AgentActivated { agent_id: agent.id },
                now,
            )
            .with_signature(&signature),
        )
        .await?;

        tracing::info!(agent = %agent.id, "agent activated");
        Ok(agent)
    }

    pub async fn build_agent_revocation(
        &self,
        agent_id: &AgentId,
        authority: Address,
    ) -> Result<BuiltTransaction> {
        let agent = self.load_agent(agent_id).await?;
        if agent.status == AgentStatus::Revoked {
            return Err(EngineError::ValidationFailed(
                "agent is already revoked".into(),
            ));
        }
        let workspace = self.load_workspace(&agent.workspace_id).await?;
        let blockhash = self.blockhash().await?;
        Ok(builders::build_remove_member(
            &self.sponsor,
            workspace.settings_address,
            authority,
            agent.public_key,
            blockhash,
        )?)
    }

    /// Phase 2 for revocation. Terminal: flips the status, deletes
    /// every session the agent holds, logs.
    pub async fn commit_agent_revocation(
        &self,
        agent_id: &AgentId,
        authority: Address,
        signed: Transaction,
        now: i64,
    ) -> Result<Agent> {
        let mut agent = self.load_agent(agent_id).await?;
        let signature = self.submit_and_confirm(&signed).await?;

        agent.transition(AgentStatus::Revoked, now)?;
        self.store.update_agent(&agent).await?;
        let revoked = self.store.delete_sessions_for_agent(&agent.id).await?;
        self.log_activity(
            ActivityEntry::new(
                agent.workspace_id,
                Actor::Human(authority),
                ActivityMetadata::AgentRevoked { agent_id: agent.id },
                now,
            )
            .with_signature(&signature),
        )
        .await?;

        tracing::info!(agent = %agent.id, sessions = revoked, "agent revoked");
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use stipend_ledger::{LocalSigner, MemoryLedger};
    use stipend_store::{MemoryStore, Store};

    fn engine_with(store: Arc<MemoryStore>, ledger: Arc<MemoryLedger>) -> Engine {
        Engine::new(
            store,
            ledger,
            Arc::new(LocalSigner::new()),
            Keypair::from_seed(&[0xA0; 32]),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn workspace_creation_persists_only_after_confirm() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(store.clone(), ledger.clone());
        let creator_key = Keypair::from_seed(&[0x01; 32]);
        let creator: Address = creator_key.public_key().into();
        let seed = Address::from_bytes([0x02; 32]);

        let built = engine
            .build_workspace_creation(creator, 2, &seed)
            .await
            .unwrap();
        // Phase 1 wrote nothing.
        assert!(ledger.submitted().is_empty());

        let mut signed = built.transaction;
        signed.sign_with(&creator_key);
        let workspace = engine
            .commit_workspace_creation("ops", creator, &seed, signed, 1_000)
            .await
            .unwrap();

        assert_eq!(
            workspace.settings_address,
            stipend_ledger::settings_address(&seed)
        );
        let stored = store.get_workspace(&workspace.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "ops");
        let activity = store.list_activity(&workspace.id, 10).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].metadata.action(), "workspace_created");
    }

    #[tokio::test]
    async fn incomplete_signatures_fail_as_validation() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(store.clone(), ledger.clone());
        let creator = Address::from_bytes([0x01; 32]);
        let seed = Address::from_bytes([0x02; 32]);

        let built = engine
            .build_workspace_creation(creator, 2, &seed)
            .await
            .unwrap();
        // Missing the creator signature entirely.
        let err = engine
            .commit_workspace_creation("ops", creator, &seed, built.transaction, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
        // And nothing was submitted or written.
        assert!(ledger.submitted().is_empty());
        assert!(store
            .get_workspace(&WorkspaceId::generate())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_period_type_rejected_at_build() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), Arc::new(MemoryLedger::new()));
        let agent = Agent::new(
            WorkspaceId::generate(),
            "reporter",
            "custody/reporter",
            Address::from_bytes([0x03; 32]),
            0,
        );
        store.insert_agent(&agent).await.unwrap();

        let err = engine
            .build_budget_addition(
                &agent.id,
                Address::from_bytes([0x04; 32]),
                Address::from_bytes([0x05; 32]),
                100,
                "quarterly",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn agent_activation_requires_connected_status() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(store.clone(), ledger.clone());

        let creator = Address::from_bytes([0x01; 32]);
        let seed = Address::from_bytes([0x02; 32]);
        let settings = stipend_ledger::settings_address(&seed);
        let workspace = Workspace::new("ops", settings, creator, 0);
        store.insert_workspace(&workspace).await.unwrap();

        let agent = Agent::new(
            workspace.id,
            "reporter",
            "custody/reporter",
            Address::from_bytes([0x03; 32]),
            0,
        );
        store.insert_agent(&agent).await.unwrap();

        // Still provisioning: cannot activate.
        let err = engine
            .build_agent_activation(&agent.id, Address::from_bytes([0x04; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn revocation_deletes_all_sessions() {
        use stipend_core::{Blake3Hash, Protocol, Session, SessionKind};

        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let engine = engine_with(store.clone(), ledger.clone());

        let creator = Address::from_bytes([0x01; 32]);
        let seed = Address::from_bytes([0x02; 32]);
        let workspace = Workspace::new("ops", stipend_ledger::settings_address(&seed), creator, 0);
        store.insert_workspace(&workspace).await.unwrap();

        let mut agent = Agent::new(
            workspace.id,
            "reporter",
            "custody/reporter",
            Address::from_bytes([0x03; 32]),
            0,
        );
        agent.transition(AgentStatus::Connected, 0).unwrap();
        agent.transition(AgentStatus::Active, 0).unwrap();
        store.insert_agent(&agent).await.unwrap();
        store
            .insert_session(&Session::new(
                agent.id,
                workspace.id,
                Blake3Hash::hash(b"tok"),
                SessionKind::Session,
                Protocol::V1,
                10_000,
                0,
            ))
            .await
            .unwrap();

        let authority_key = Keypair::from_seed(&[0x31; 32]);
        let authority: Address = authority_key.public_key().into();
        let built = engine
            .build_agent_revocation(&agent.id, authority)
            .await
            .unwrap();
        let mut signed = built.transaction;
        signed.sign_with(&authority_key);

        let revoked = engine
            .commit_agent_revocation(&agent.id, authority, signed, 1_000)
            .await
            .unwrap();
        assert_eq!(revoked.status, AgentStatus::Revoked);
        assert!(store
            .get_session_by_hash(&Blake3Hash::hash(b"tok"))
            .await
            .unwrap()
            .is_none());
    }
}
