//! # stipend-core
//!
//! Pure primitives for stipend: crypto, identifiers, ledger-native
//! types, and the persisted record shapes.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the system's data structures.
//!
//! ## Key Types
//!
//! - [`Keypair`] / [`Ed25519PublicKey`] / [`Blake3Hash`] - crypto primitives
//! - [`Address`] / [`Instruction`] / [`Transaction`] - ledger-native types
//! - [`Agent`] / [`Session`] / [`SpendingLimit`] / [`TransferRequest`] /
//!   [`ActivityEntry`] / [`Workspace`] - persisted records

pub mod activity;
pub mod address;
pub mod agent;
pub mod amount;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod instruction;
pub mod limit;
pub mod request;
pub mod session;
pub mod transaction;
pub mod workspace;

pub use activity::{ActivityEntry, ActivityMetadata, Actor};
pub use address::Address;
pub use agent::{Agent, AgentStatus};
pub use amount::{from_smallest, to_smallest, TOKEN_DECIMALS};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, Result};
pub use ids::{ActivityId, AgentId, FamilyId, RequestId, SessionId, WorkspaceId};
pub use instruction::{
    native_transfer, parse_native_transfer, programs, AccountMeta, Instruction,
    NATIVE_TRANSFER_TAG,
};
pub use limit::{LimitSnapshot, SpendingLimit};
pub use request::{
    RequestStatus, TransferRequest, MAX_JUSTIFICATION_LEN, MAX_NOTE_LEN,
};
pub use session::{
    Protocol, Session, SessionKind, ACCESS_TTL_MS, CONNECT_CODE_TTL_MS, REFRESH_TTL_MS,
    SESSION_TTL_MS,
};
pub use transaction::{Blockhash, SignatureEntry, Transaction};
pub use workspace::Workspace;
