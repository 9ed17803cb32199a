//! # stipend
//!
//! Agents acting for a custodial group wallet, under a rolling budget,
//! with human approval for everything outside it.
//!
//! This crate is the unified engine: authentication goes through
//! `stipend-auth`, decisions through `stipend-policy`, composition
//! through `stipend-ledger`, and every state-changing action through
//! the two-phase commit in [`Engine`] - build, sign, submit, confirm,
//! and only then persist. Off-chain bookkeeping never runs ahead of
//! the ledger.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stipend::{Engine, EngineConfig};
//! use stipend::core::Keypair;
//! use stipend::ledger::{MemoryLedger, LocalSigner};
//! use stipend::store::SqliteStore;
//!
//! async fn example() {
//!     let store = Arc::new(SqliteStore::open("stipend.db").unwrap());
//!     let rpc = Arc::new(MemoryLedger::new());
//!     let signer = Arc::new(LocalSigner::new());
//!     let sponsor = Keypair::generate();
//!
//!     let engine = Engine::new(store, rpc, signer, sponsor, EngineConfig::default());
//!
//!     // Phase 1: compose and sponsor-sign a workspace creation for
//!     // the creator to counter-sign.
//!     // let built = engine.build_workspace_creation(creator, 2, &seed).await.unwrap();
//!     let _ = engine;
//! }
//! ```

pub mod engine;
pub mod error;
pub mod transfer;

// Re-export component crates
pub use stipend_auth as auth;
pub use stipend_core as core;
pub use stipend_ledger as ledger;
pub use stipend_policy as policy;
pub use stipend_store as store;

// Re-export main types for convenience
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use transfer::{AgentStatusView, TransferOutcome};

// Re-export commonly used core types
pub use stipend_core::{
    Address, Agent, AgentId, AgentStatus, Keypair, RequestStatus, Session, SessionKind,
    SpendingLimit, TransferRequest, Workspace, WorkspaceId,
};
