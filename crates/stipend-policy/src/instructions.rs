//! Validation of untrusted instruction payloads.
//!
//! Callers declare instructions as strings (addresses in hex, data in
//! hex); validation parses them into ledger-native [`Instruction`]s,
//! substitutes the vault placeholder, and enforces the program
//! allowlist. Everything here runs before any network or storage call.

use serde::{Deserialize, Serialize};
use stipend_core::{parse_native_transfer, programs, AccountMeta, Address, Instruction};

use crate::error::{PolicyError, Result};

/// Placeholder a caller may use for the workspace's vault address
/// without knowing the derived address.
pub const VAULT_PLACEHOLDER: &str = "$vault";

/// Largest accepted batch.
pub const MAX_INSTRUCTIONS: usize = 5;

/// One caller-declared account reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredAccount {
    /// Hex address or [`VAULT_PLACEHOLDER`].
    pub address: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// One caller-declared instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredInstruction {
    /// Hex address of the target program.
    pub program: String,
    pub accounts: Vec<DeclaredAccount>,
    /// Hex-encoded opaque data.
    pub data: String,
}

/// Programs allowed when a workspace has no override configured.
pub fn default_allowlist() -> Vec<Address> {
    vec![programs::system(), programs::token()]
}

/// Validate a declared batch against the vault and allowlist.
///
/// Order matters: bounds, then per-instruction parsing (placeholder
/// substitution happens before address parsing), then the allowlist
/// pass over the parsed batch. A single non-allowlisted program rejects
/// the entire batch.
pub fn validate_instructions(
    declared: &[DeclaredInstruction],
    vault: &Address,
    allowlist: &[Address],
) -> Result<Vec<Instruction>> {
    if declared.is_empty() || declared.len() > MAX_INSTRUCTIONS {
        return Err(PolicyError::BatchSize {
            got: declared.len(),
            max: MAX_INSTRUCTIONS,
        });
    }

    let mut parsed = Vec::with_capacity(declared.len());
    for (index, decl) in declared.iter().enumerate() {
        if decl.program.is_empty() {
            return Err(PolicyError::MissingProgram { index });
        }
        let program = Address::from_hex(&decl.program).map_err(|e| {
            PolicyError::MalformedAddress {
                index,
                detail: e.to_string(),
            }
        })?;

        let mut accounts = Vec::with_capacity(decl.accounts.len());
        for account in &decl.accounts {
            let address = if account.address == VAULT_PLACEHOLDER {
                *vault
            } else {
                Address::from_hex(&account.address).map_err(|e| {
                    PolicyError::MalformedAddress {
                        index,
                        detail: e.to_string(),
                    }
                })?
            };
            accounts.push(AccountMeta {
                address,
                is_signer: account.is_signer,
                is_writable: account.is_writable,
            });
        }

        let data = hex::decode(&decl.data).map_err(|e| PolicyError::MalformedData {
            index,
            detail: e.to_string(),
        })?;

        parsed.push(Instruction {
            program,
            accounts,
            data: data.into(),
        });
    }

    for (index, ix) in parsed.iter().enumerate() {
        if !allowlist.contains(&ix.program) {
            return Err(PolicyError::ProgramNotAllowed {
                index,
                program: ix.program.to_hex(),
            });
        }
    }

    Ok(parsed)
}

/// Advisory budget-impact estimate: the sum of native-transfer amounts
/// drawn from the vault across the batch.
///
/// Never the source of truth for what executes - display only.
pub fn estimate_vault_outflow(instructions: &[Instruction], vault: &Address) -> u64 {
    instructions
        .iter()
        .filter_map(parse_native_transfer)
        .filter(|(from, _, _)| from == vault)
        .map(|(_, _, amount)| amount)
        .sum()
}
