//! # stipend-store
//!
//! Storage abstraction for stipend's off-chain bookkeeping.
//!
//! The [`Store`] trait is the injected port the auth protocol and the
//! engine write through; nothing in the core logic touches a
//! process-global table. Two backends:
//!
//! - [`SqliteStore`] - primary, rusqlite with bundled SQLite
//! - [`MemoryStore`] - for tests
//!
//! The schema enforces the system's two uniqueness invariants: one live
//! session per token hash, one consumption per replay-nonce id.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{NonceClaim, Store};
