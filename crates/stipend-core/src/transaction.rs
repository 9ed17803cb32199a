//! Transactions: an instruction list plus fee payer, blockhash, and
//! signatures.
//!
//! A transaction is signed over its canonical CBOR message bytes. The
//! fee payer (always the sponsor) is the first required signer; every
//! account marked `is_signer` in any instruction is also required.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::crypto::{Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::instruction::Instruction;

/// A recent blockhash, anchoring a transaction to the ledger's
/// acceptance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blockhash(pub [u8; 32]);

impl Blockhash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub const ZERO: Self = Self([0u8; 32]);
}

/// One collected signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer: Address,
    pub signature: Ed25519Signature,
}

/// An assembled transaction, possibly partially signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub fee_payer: Address,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<Instruction>,
    pub signatures: Vec<SignatureEntry>,
}

/// The signed portion of a transaction.
#[derive(Serialize)]
struct Message<'a> {
    fee_payer: &'a Address,
    recent_blockhash: &'a Blockhash,
    instructions: &'a [Instruction],
}

impl Transaction {
    /// Assemble an unsigned transaction.
    pub fn new(
        fee_payer: Address,
        recent_blockhash: Blockhash,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            fee_payer,
            recent_blockhash,
            instructions,
            signatures: Vec::new(),
        }
    }

    /// The bytes every signer signs: canonical CBOR of the message.
    pub fn message_bytes(&self) -> Vec<u8> {
        let message = Message {
            fee_payer: &self.fee_payer,
            recent_blockhash: &self.recent_blockhash,
            instructions: &self.instructions,
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&message, &mut buf).expect("CBOR message encoding cannot fail");
        buf
    }

    /// All addresses that must sign: fee payer first, then every
    /// `is_signer` account reference, deduplicated in order.
    pub fn required_signers(&self) -> Vec<Address> {
        let mut signers = vec![self.fee_payer];
        for ix in &self.instructions {
            for meta in &ix.accounts {
                if meta.is_signer && !signers.contains(&meta.address) {
                    signers.push(meta.address);
                }
            }
        }
        signers
    }

    /// Sign with an in-process keypair, replacing any previous signature
    /// from the same address.
    pub fn sign_with(&mut self, keypair: &Keypair) {
        let signature = keypair.sign(&self.message_bytes());
        self.add_signature(keypair.public_key().into(), signature);
    }

    /// Attach a signature produced elsewhere (human wallet, remote
    /// custody signer).
    pub fn add_signature(&mut self, signer: Address, signature: Ed25519Signature) {
        if let Some(entry) = self.signatures.iter_mut().find(|e| e.signer == signer) {
            entry.signature = signature;
        } else {
            self.signatures.push(SignatureEntry { signer, signature });
        }
    }

    /// Required signers that have not signed yet.
    pub fn missing_signers(&self) -> Vec<Address> {
        self.required_signers()
            .into_iter()
            .filter(|s| !self.signatures.iter().any(|e| &e.signer == s))
            .collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.missing_signers().is_empty()
    }

    /// Check that every required signer has signed and every signature
    /// verifies over the message bytes.
    pub fn verify_signatures(&self) -> Result<(), CoreError> {
        if let Some(missing) = self.missing_signers().first() {
            return Err(CoreError::MissingSignature(missing.to_hex()));
        }
        let message = self.message_bytes();
        for entry in &self.signatures {
            crate::crypto::Ed25519PublicKey::from(entry.signer).verify(&message, &entry.signature)?;
        }
        Ok(())
    }

    /// Serialize for transport (CBOR).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from transport bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::native_transfer;

    fn sample_tx(sponsor: &Keypair, from: Address) -> Transaction {
        let to = Address::from_bytes([9u8; 32]);
        Transaction::new(
            sponsor.public_key().into(),
            Blockhash::from_bytes([4u8; 32]),
            vec![native_transfer(from, to, 100)],
        )
    }

    #[test]
    fn required_signers_fee_payer_first() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let tx = sample_tx(&sponsor, agent.public_key().into());

        let signers = tx.required_signers();
        assert_eq!(signers[0], sponsor.public_key().into());
        assert!(signers.contains(&agent.public_key().into()));
        assert_eq!(signers.len(), 2);
    }

    #[test]
    fn partial_then_full_signing() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let mut tx = sample_tx(&sponsor, agent.public_key().into());

        tx.sign_with(&sponsor);
        assert!(!tx.is_fully_signed());
        assert_eq!(tx.missing_signers(), vec![agent.public_key().into()]);

        tx.sign_with(&agent);
        assert!(tx.is_fully_signed());
        tx.verify_signatures().unwrap();
    }

    #[test]
    fn tampered_message_fails_verification() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let mut tx = sample_tx(&sponsor, agent.public_key().into());
        tx.sign_with(&sponsor);
        tx.sign_with(&agent);

        tx.recent_blockhash = Blockhash::from_bytes([5u8; 32]);
        assert!(tx.verify_signatures().is_err());
    }

    #[test]
    fn transport_roundtrip() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let mut tx = sample_tx(&sponsor, agent.public_key().into());
        tx.sign_with(&sponsor);

        let bytes = tx.to_bytes().unwrap();
        let back = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(tx, back);
        assert_eq!(tx.message_bytes(), back.message_bytes());
    }

    #[test]
    fn resigning_replaces_not_duplicates() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let mut tx = sample_tx(&sponsor, agent.public_key().into());
        tx.sign_with(&sponsor);
        tx.sign_with(&sponsor);
        assert_eq!(tx.signatures.len(), 1);
    }
}
