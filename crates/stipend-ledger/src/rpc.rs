//! Ledger RPC port.
//!
//! The four calls the core needs from the ledger, all fallible. A
//! simple in-memory implementation lives in [`memory`] for tests and
//! examples; production implementations sit behind the same trait.

use async_trait::async_trait;
use stipend_core::{Address, Blockhash, Transaction};

use crate::error::{LedgerError, Result};

/// Ledger RPC operations.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch a recent blockhash to anchor a new transaction.
    async fn latest_blockhash(&self) -> Result<Blockhash>;

    /// Fetch raw account data, `None` if the account does not exist.
    async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>>;

    /// Submit a fully-signed transaction. Returns the transaction
    /// signature id used for confirmation.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<String>;

    /// Await confirmation of a previously submitted transaction.
    /// A timeout is an error, indistinguishable in effect from an
    /// explicit failure.
    async fn confirm_transaction(&self, signature: &str) -> Result<()>;
}

/// In-memory ledger for tests.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A ledger that accepts any fully-signed transaction and confirms
    /// it immediately. Account data is a plain map the test seeds and
    /// inspects.
    pub struct MemoryLedger {
        state: Mutex<MemoryLedgerState>,
    }

    #[derive(Default)]
    struct MemoryLedgerState {
        accounts: HashMap<Address, Vec<u8>>,
        submitted: Vec<Transaction>,
        confirmed: Vec<String>,
    }

    impl MemoryLedger {
        pub fn new() -> Self {
            Self {
                state: Mutex::new(MemoryLedgerState::default()),
            }
        }

        /// Seed account data.
        pub fn set_account(&self, address: Address, data: Vec<u8>) {
            self.state.lock().unwrap().accounts.insert(address, data);
        }

        /// Transactions accepted so far.
        pub fn submitted(&self) -> Vec<Transaction> {
            self.state.lock().unwrap().submitted.clone()
        }

        /// Signatures confirmed so far.
        pub fn confirmed(&self) -> Vec<String> {
            self.state.lock().unwrap().confirmed.clone()
        }
    }

    impl Default for MemoryLedger {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl LedgerRpc for MemoryLedger {
        async fn latest_blockhash(&self) -> Result<Blockhash> {
            Ok(Blockhash::from_bytes([0xBB; 32]))
        }

        async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>> {
            Ok(self.state.lock().unwrap().accounts.get(address).cloned())
        }

        async fn send_transaction(&self, transaction: &Transaction) -> Result<String> {
            transaction
                .verify_signatures()
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
            let mut state = self.state.lock().unwrap();
            let signature = transaction
                .signatures
                .first()
                .map(|entry| entry.signature.to_hex())
                .unwrap_or_default();
            state.submitted.push(transaction.clone());
            Ok(signature)
        }

        async fn confirm_transaction(&self, signature: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.confirmed.push(signature.to_string());
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use stipend_core::{native_transfer, Keypair};

        #[tokio::test]
        async fn unsigned_transaction_is_rejected() {
            let ledger = MemoryLedger::new();
            let sponsor = Keypair::from_seed(&[1u8; 32]);
            let tx = Transaction::new(
                sponsor.public_key().into(),
                Blockhash::ZERO,
                vec![native_transfer(
                    Address::from_bytes([2u8; 32]),
                    Address::from_bytes([3u8; 32]),
                    10,
                )],
            );
            assert!(ledger.send_transaction(&tx).await.is_err());
        }

        #[tokio::test]
        async fn signed_transaction_submits_and_confirms() {
            let ledger = MemoryLedger::new();
            let sponsor = Keypair::from_seed(&[1u8; 32]);
            let payer = Keypair::from_seed(&[2u8; 32]);
            let mut tx = Transaction::new(
                sponsor.public_key().into(),
                Blockhash::ZERO,
                vec![native_transfer(
                    payer.public_key().into(),
                    Address::from_bytes([3u8; 32]),
                    10,
                )],
            );
            tx.sign_with(&sponsor);
            tx.sign_with(&payer);

            let sig = ledger.send_transaction(&tx).await.unwrap();
            ledger.confirm_transaction(&sig).await.unwrap();
            assert_eq!(ledger.submitted().len(), 1);
            assert_eq!(ledger.confirmed(), vec![sig]);
        }
    }
}
