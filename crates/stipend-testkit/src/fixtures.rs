//! Test fixtures: a seeded engine over scriptable fakes.
//!
//! [`FakeLedger`] fails on command at the submit or confirm step;
//! [`CountingStore`] wraps any store and counts mutation calls, which
//! is how the zero-writes-on-failure property is asserted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stipend_core::{
    ActivityEntry, Agent, AgentId, AgentStatus, Blake3Hash, Blockhash, Keypair, RequestId,
    Session, SessionId, SpendingLimit, Transaction, TransferRequest, Workspace, WorkspaceId,
};
use stipend_ledger::{
    settings_address, LedgerError, LedgerRpc, LocalSigner, SettingsAccount,
};
use stipend_store::{MemoryStore, NonceClaim, Store};
use stipend::{Engine, EngineConfig};

type Address = stipend_core::Address;
type StoreResult<T> = stipend_store::Result<T>;
type LedgerResult<T> = stipend_ledger::Result<T>;

// ─────────────────────────────────────────────────────────────────────────────
// FakeLedger
// ─────────────────────────────────────────────────────────────────────────────

/// Where the fake ledger should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    None,
    /// `send_transaction` rejects; nothing reaches the chain.
    FailSubmit,
    /// Submission lands but confirmation errors - the ambiguous case.
    FailConfirm,
}

/// A ledger that accepts signed transactions and fails on command.
pub struct FakeLedger {
    mode: Mutex<FailureMode>,
    accounts: Mutex<std::collections::HashMap<Address, Vec<u8>>>,
    submitted: Mutex<Vec<Transaction>>,
    confirmed: Mutex<Vec<String>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(FailureMode::None),
            accounts: Mutex::new(std::collections::HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            confirmed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_mode(&self, mode: FailureMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_account(&self, address: Address, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.lock().unwrap().len()
    }
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn latest_blockhash(&self) -> LedgerResult<Blockhash> {
        Ok(Blockhash::from_bytes([0xFA; 32]))
    }

    async fn get_account(&self, address: &Address) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<String> {
        if *self.mode.lock().unwrap() == FailureMode::FailSubmit {
            return Err(LedgerError::Rejected("scripted submit failure".into()));
        }
        transaction
            .verify_signatures()
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let signature = transaction
            .signatures
            .first()
            .map(|entry| entry.signature.to_hex())
            .unwrap_or_default();
        self.submitted.lock().unwrap().push(transaction.clone());
        Ok(signature)
    }

    async fn confirm_transaction(&self, signature: &str) -> LedgerResult<()> {
        if *self.mode.lock().unwrap() == FailureMode::FailConfirm {
            return Err(LedgerError::ConfirmTimeout(
                "scripted confirmation failure".into(),
            ));
        }
        self.confirmed.lock().unwrap().push(signature.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CountingStore
// ─────────────────────────────────────────────────────────────────────────────

/// Store wrapper that counts mutation calls. Reads pass through
/// uncounted.
pub struct CountingStore<S: Store> {
    inner: S,
    mutations: AtomicU64,
}

impl<S: Store> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            mutations: AtomicU64::new(0),
        }
    }

    /// Mutation calls observed since the last reset.
    pub fn mutations(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.mutations.store(0, Ordering::SeqCst);
    }

    fn count(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: Store> Store for CountingStore<S> {
    async fn insert_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.count();
        self.inner.insert_workspace(workspace).await
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> StoreResult<Option<Workspace>> {
        self.inner.get_workspace(id).await
    }

    async fn update_workspace(&self, workspace: &Workspace) -> StoreResult<()> {
        self.count();
        self.inner.update_workspace(workspace).await
    }

    async fn insert_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.count();
        self.inner.insert_agent(agent).await
    }

    async fn get_agent(&self, id: &AgentId) -> StoreResult<Option<Agent>> {
        self.inner.get_agent(id).await
    }

    async fn get_agent_by_connect_code(&self, hash: &Blake3Hash) -> StoreResult<Option<Agent>> {
        self.inner.get_agent_by_connect_code(hash).await
    }

    async fn update_agent(&self, agent: &Agent) -> StoreResult<()> {
        self.count();
        self.inner.update_agent(agent).await
    }

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        self.count();
        self.inner.insert_session(session).await
    }

    async fn get_session_by_hash(&self, hash: &Blake3Hash) -> StoreResult<Option<Session>> {
        self.inner.get_session_by_hash(hash).await
    }

    async fn delete_session(&self, id: &SessionId) -> StoreResult<()> {
        self.count();
        self.inner.delete_session(id).await
    }

    async fn delete_sessions_for_agent(&self, agent: &AgentId) -> StoreResult<u64> {
        self.count();
        self.inner.delete_sessions_for_agent(agent).await
    }

    async fn touch_session(&self, id: &SessionId, at: i64) -> StoreResult<()> {
        self.count();
        self.inner.touch_session(id, at).await
    }

    async fn sweep_expired_sessions(&self, now: i64) -> StoreResult<u64> {
        self.count();
        self.inner.sweep_expired_sessions(now).await
    }

    async fn claim_nonce(&self, jti: &str, expires_at: i64) -> StoreResult<NonceClaim> {
        self.count();
        self.inner.claim_nonce(jti, expires_at).await
    }

    async fn sweep_expired_nonces(&self, now: i64) -> StoreResult<u64> {
        self.count();
        self.inner.sweep_expired_nonces(now).await
    }

    async fn upsert_limit(&self, limit: &SpendingLimit) -> StoreResult<()> {
        self.count();
        self.inner.upsert_limit(limit).await
    }

    async fn get_limit(&self, agent: &AgentId) -> StoreResult<Option<SpendingLimit>> {
        self.inner.get_limit(agent).await
    }

    async fn delete_limit(&self, agent: &AgentId) -> StoreResult<()> {
        self.count();
        self.inner.delete_limit(agent).await
    }

    async fn insert_request(&self, request: &TransferRequest) -> StoreResult<()> {
        self.count();
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: &RequestId) -> StoreResult<Option<TransferRequest>> {
        self.inner.get_request(id).await
    }

    async fn update_request(&self, request: &TransferRequest) -> StoreResult<()> {
        self.count();
        self.inner.update_request(request).await
    }

    async fn list_requests_for_agent(
        &self,
        agent: &AgentId,
    ) -> StoreResult<Vec<TransferRequest>> {
        self.inner.list_requests_for_agent(agent).await
    }

    async fn append_activity(&self, entry: &ActivityEntry) -> StoreResult<()> {
        self.count();
        self.inner.append_activity(entry).await
    }

    async fn list_activity(
        &self,
        workspace: &WorkspaceId,
        limit: u32,
    ) -> StoreResult<Vec<ActivityEntry>> {
        self.inner.list_activity(workspace, limit).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TestFixture
// ─────────────────────────────────────────────────────────────────────────────

/// A fully seeded engine: workspace, active agent with custody key,
/// scriptable ledger, counting store.
pub struct TestFixture {
    pub engine: Engine,
    pub store: Arc<CountingStore<MemoryStore>>,
    pub ledger: Arc<FakeLedger>,
    pub sponsor: Keypair,
    pub creator_key: Keypair,
    pub agent_key: Keypair,
    pub workspace: Workspace,
    pub agent: Agent,
}

impl TestFixture {
    pub async fn new() -> Self {
        let store = Arc::new(CountingStore::new(MemoryStore::new()));
        let ledger = Arc::new(FakeLedger::new());
        let sponsor = Keypair::from_seed(&[0xA0; 32]);
        let creator_key = Keypair::from_seed(&[0xC0; 32]);
        let agent_key = Keypair::from_seed(&[0xD0; 32]);
        let signer = Arc::new(LocalSigner::new().with_key("custody/agent", agent_key.clone()));

        let seed = Address::from_bytes([0x05; 32]);
        let settings = settings_address(&seed);
        let creator: Address = creator_key.public_key().into();
        let workspace = Workspace::new("ops", settings, creator, 0);
        store.insert_workspace(&workspace).await.unwrap();
        ledger.set_account(settings, SettingsAccount::new(creator, 2).to_bytes());

        let mut agent = Agent::new(
            workspace.id,
            "reporter",
            "custody/agent",
            agent_key.public_key().into(),
            0,
        );
        agent.transition(AgentStatus::Connected, 0).unwrap();
        agent.transition(AgentStatus::Active, 0).unwrap();
        store.insert_agent(&agent).await.unwrap();

        let engine = Engine::new(
            store.clone(),
            ledger.clone(),
            signer,
            sponsor.clone(),
            EngineConfig::default(),
        );

        store.reset();
        Self {
            engine,
            store,
            ledger,
            sponsor,
            creator_key,
            agent_key,
            workspace,
            agent,
        }
    }

    /// Seed a daily budget for the fixture agent.
    pub async fn with_budget(&self, limit_amount: u64, spent: u64, period_start: i64) {
        let mut limit = SpendingLimit::new(
            self.agent.id,
            Address::from_bytes([0x0A; 32]),
            limit_amount,
            "daily",
            period_start,
        );
        limit.spent_amount = spent;
        self.store.upsert_limit(&limit).await.unwrap();
        self.store.reset();
    }
}
