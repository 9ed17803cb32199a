//! # stipend-policy
//!
//! Pure decision logic for stipend:
//!
//! - [`evaluate`] - the spending-limit policy engine. Period-aware,
//!   lazily-reset, side-effect free.
//! - [`validate_instructions`] - parses and validates untrusted
//!   instruction payloads before anything reaches the ledger.
//!
//! Neither half performs I/O; persistence of rollovers and spent
//! increments is the orchestrator's job, and only after confirmation.

pub mod error;
pub mod instructions;
pub mod spend;

pub use error::{PolicyError, Result};
pub use instructions::{
    default_allowlist, estimate_vault_outflow, validate_instructions, DeclaredAccount,
    DeclaredInstruction, MAX_INSTRUCTIONS, VAULT_PLACEHOLDER,
};
pub use spend::{evaluate, PeriodType, SpendDecision};
