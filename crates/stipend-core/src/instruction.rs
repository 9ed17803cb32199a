//! Ledger-native instructions.
//!
//! An instruction names a target program, an ordered list of account
//! references, and opaque data bytes. Program ids are derived addresses
//! in the `program/` label space.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::Address;

/// One account reference inside an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn signer(address: Address) -> Self {
        Self {
            address,
            is_signer: true,
            is_writable: true,
        }
    }

    pub fn writable(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: false,
        }
    }
}

/// A single ledger instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The program that executes this instruction.
    pub program: Address,
    /// Ordered account references the program receives.
    pub accounts: Vec<AccountMeta>,
    /// Opaque program input.
    pub data: Bytes,
}

/// Well-known program addresses.
pub mod programs {
    use super::Address;

    /// The native program: holds balances, executes transfers.
    pub fn system() -> Address {
        Address::derive(&Address::ZERO, "program/system")
    }

    /// The multisig program: workspace settings, members, budgets,
    /// proposals.
    pub fn multisig() -> Address {
        Address::derive(&Address::ZERO, "program/multisig")
    }

    /// The token program (non-native mints).
    pub fn token() -> Address {
        Address::derive(&Address::ZERO, "program/token")
    }
}

/// Instruction tag for a native transfer, first 4 data bytes, LE.
pub const NATIVE_TRANSFER_TAG: u32 = 2;

/// Compose a native transfer: `from` pays `amount` smallest units to
/// `to`. Data layout is fixed: u32 tag, u64 amount, both little-endian.
pub fn native_transfer(from: Address, to: Address, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&NATIVE_TRANSFER_TAG.to_le_bytes());
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program: programs::system(),
        accounts: vec![AccountMeta::signer(from), AccountMeta::writable(to)],
        data: data.into(),
    }
}

/// Parse an instruction as a native transfer, if it is shaped like one.
///
/// Returns `(from, to, amount)`. Advisory use only: this recognizes the
/// fixed transfer layout, it does not execute anything.
pub fn parse_native_transfer(ix: &Instruction) -> Option<(Address, Address, u64)> {
    if ix.program != programs::system() {
        return None;
    }
    if ix.data.len() != 12 || ix.accounts.len() < 2 {
        return None;
    }
    let tag = u32::from_le_bytes(ix.data[0..4].try_into().ok()?);
    if tag != NATIVE_TRANSFER_TAG {
        return None;
    }
    let amount = u64::from_le_bytes(ix.data[4..12].try_into().ok()?);
    Some((ix.accounts[0].address, ix.accounts[1].address, amount))
}
