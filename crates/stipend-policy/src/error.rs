//! Error types for policy decisions and instruction validation.

use thiserror::Error;

/// Instruction-validation failures. All are raised before any network
/// or storage call is made.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Batch size outside the accepted 1..=5 bound.
    #[error("instruction batch must contain between 1 and {max} instructions, got {got}")]
    BatchSize { got: usize, max: usize },

    /// An instruction is missing its target program.
    #[error("instruction {index}: missing target program")]
    MissingProgram { index: usize },

    /// An account or program address failed to parse.
    #[error("instruction {index}: malformed address: {detail}")]
    MalformedAddress { index: usize, detail: String },

    /// The opaque data bytes failed to decode.
    #[error("instruction {index}: malformed data encoding: {detail}")]
    MalformedData { index: usize, detail: String },

    /// The target program is not on the allowlist. Rejects the whole
    /// batch.
    #[error("instruction {index}: program {program} is not allowlisted")]
    ProgramNotAllowed { index: usize, program: String },
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
