//! Remote custody signer port.
//!
//! Agent custody keys never enter this process: signing is delegated
//! to an external service addressed by an opaque key id.

use async_trait::async_trait;
use stipend_core::{Address, Ed25519Signature, Transaction};

use crate::error::Result;

/// The remote custody signer: message digest in, raw signature out.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Sign `message` with the key identified by `key_id`.
    async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Ed25519Signature>;
}

/// Sign a transaction's message via the remote signer and attach the
/// signature for `signer_address`.
pub async fn sign_with_remote(
    transaction: &mut Transaction,
    signer: &dyn RemoteSigner,
    key_id: &str,
    signer_address: Address,
) -> Result<()> {
    let signature = signer.sign(key_id, &transaction.message_bytes()).await?;
    transaction.add_signature(signer_address, signature);
    Ok(())
}

/// An in-process signer backed by a key map. Test double for the
/// remote service.
pub mod local {
    use super::*;
    use std::collections::HashMap;
    use stipend_core::Keypair;

    use crate::error::LedgerError;

    /// Holds keypairs by key id.
    pub struct LocalSigner {
        keys: HashMap<String, Keypair>,
    }

    impl LocalSigner {
        pub fn new() -> Self {
            Self {
                keys: HashMap::new(),
            }
        }

        pub fn with_key(mut self, key_id: impl Into<String>, keypair: Keypair) -> Self {
            self.keys.insert(key_id.into(), keypair);
            self
        }

        pub fn public_key_of(&self, key_id: &str) -> Option<Address> {
            self.keys.get(key_id).map(|kp| kp.public_key().into())
        }
    }

    impl Default for LocalSigner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RemoteSigner for LocalSigner {
        async fn sign(&self, key_id: &str, message: &[u8]) -> Result<Ed25519Signature> {
            let keypair = self
                .keys
                .get(key_id)
                .ok_or_else(|| LedgerError::Signer(format!("unknown key id: {}", key_id)))?;
            Ok(keypair.sign(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::local::LocalSigner;
    use super::*;
    use stipend_core::{native_transfer, Blockhash, Keypair};

    #[tokio::test]
    async fn remote_signature_completes_transaction() {
        let sponsor = Keypair::from_seed(&[1u8; 32]);
        let agent = Keypair::from_seed(&[2u8; 32]);
        let agent_address: Address = agent.public_key().into();
        let signer = LocalSigner::new().with_key("custody/agent", agent.clone());

        let mut tx = Transaction::new(
            sponsor.public_key().into(),
            Blockhash::ZERO,
            vec![native_transfer(
                agent_address,
                Address::from_bytes([3u8; 32]),
                5,
            )],
        );
        tx.sign_with(&sponsor);

        sign_with_remote(&mut tx, &signer, "custody/agent", agent_address)
            .await
            .unwrap();
        tx.verify_signatures().unwrap();
    }

    #[tokio::test]
    async fn unknown_key_id_fails() {
        let signer = LocalSigner::new();
        let err = signer.sign("custody/nope", b"msg").await.unwrap_err();
        assert!(err.to_string().contains("unknown key id"));
    }
}
