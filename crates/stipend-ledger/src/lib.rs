//! # stipend-ledger
//!
//! The ledger-facing half of stipend:
//!
//! - [`LedgerRpc`] - the four fallible calls the core needs from the
//!   ledger (blockhash, account fetch, submit, confirm)
//! - [`RemoteSigner`] - delegated custody signing; agent private keys
//!   never enter the process
//! - [`accounts`] - the on-chain multisig account model and derived
//!   addresses
//! - [`builders`] - one deterministic transaction builder per action
//!   kind, sponsor-fee-paid, sponsor never an authority

pub mod accounts;
pub mod builders;
pub mod error;
pub mod rpc;
pub mod signer;

pub use accounts::{
    budget_address, proposal_address, settings_address, vault_address, Member, MultisigOp,
    SettingsAccount,
};
pub use builders::{
    build_add_member, build_approve_proposal, build_create_budget, build_create_proposal,
    build_create_workspace, build_deny_proposal, build_draw_budget, build_execute_batch,
    build_remove_budget, build_remove_member, BuiltTransaction,
};
pub use error::{BuilderError, LedgerError, Result};
pub use rpc::{memory::MemoryLedger, LedgerRpc};
pub use signer::{local::LocalSigner, sign_with_remote, RemoteSigner};
