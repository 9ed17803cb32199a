//! Ledger addresses.
//!
//! An [`Address`] is a 32-byte account key on the ledger. Derived
//! addresses (the workspace vault, program ids) are Blake3 hashes with a
//! domain-separation label, so they are deterministic and collision-free
//! across address spaces.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Blake3Hash, Ed25519PublicKey};
use crate::error::CoreError;

/// A 32-byte ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidAddress("expected 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// Derive a sub-address from a base address and a label.
    ///
    /// `derive(settings, "vault")` yields the vault address of a
    /// workspace; the same (base, label) pair always yields the same
    /// address.
    pub fn derive(base: &Address, label: &str) -> Self {
        let mut data = Vec::with_capacity(32 + label.len() + 1);
        data.extend_from_slice(&base.0);
        data.push(0x2f); // '/'
        data.extend_from_slice(label.as_bytes());
        Self(Blake3Hash::hash(&data).0)
    }

    /// The zero address (sentinel).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Ed25519PublicKey> for Address {
    fn from(pk: Ed25519PublicKey) -> Self {
        Self(pk.0)
    }
}

impl From<Address> for Ed25519PublicKey {
    fn from(addr: Address) -> Self {
        Ed25519PublicKey(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let addr = Address::from_bytes([0xab; 32]);
        assert_eq!(Address::from_hex(&addr.to_hex()).unwrap(), addr);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Address::from_hex("xyz").is_err());
        assert!(Address::from_hex("aabbcc").is_err());
    }

    #[test]
    fn derive_is_deterministic_and_label_separated() {
        let settings = Address::from_bytes([1u8; 32]);
        let vault1 = Address::derive(&settings, "vault");
        let vault2 = Address::derive(&settings, "vault");
        assert_eq!(vault1, vault2);
        assert_ne!(vault1, Address::derive(&settings, "settings"));
        assert_ne!(vault1, Address::derive(&Address::from_bytes([2u8; 32]), "vault"));
    }
}
