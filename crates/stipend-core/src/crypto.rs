//! Cryptographic primitives: Blake3 hashing and Ed25519 signatures.
//!
//! Raw credentials are never persisted; only their [`Blake3Hash`] is. The
//! same hash type binds a proof-of-possession proof to the access token it
//! accompanies.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Hash arbitrary bytes.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

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
        let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::DecodingError("expected 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    /// Verify a signature over a message.
    ///
    /// Rejects byte strings that are not a valid curve point as
    /// [`CoreError::InvalidPublicKey`] rather than a signature failure,
    /// so callers can distinguish a bad key from a bad proof.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 64-byte Ed25519 signature.
///
/// Serde is implemented by hand: serde's derive does not cover 64-byte
/// arrays, and the wire form is a CBOR byte string either way.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SigVisitor;

        impl<'de> serde::de::Visitor<'de> for SigVisitor {
            type Value = Ed25519Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("64 signature bytes")
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                let arr: [u8; 64] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Ed25519Signature(arr))
            }

            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<Self::Value, A::Error> {
                let mut arr = [0u8; 64];
                for (i, slot) in arr.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
                }
                Ok(Ed25519Signature(arr))
            }
        }

        deserializer.deserialize_bytes(SigVisitor)
    }
}

/// An Ed25519 keypair.
///
/// In-process keys exist only for the fee sponsor and for tests; agent
/// custody keys live behind the remote signer port and never enter the
/// process.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let keypair = Keypair::generate();
        let message = b"transfer 5 units to treasury";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        assert!(keypair
            .public_key()
            .verify(b"transfer 6 units to treasury", &signature)
            .is_err());
    }

    #[test]
    fn keypair_deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[7u8; 32]);
        let kp2 = Keypair::from_seed(&[7u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn token_hash_is_stable() {
        let h1 = Blake3Hash::hash(b"raw-token");
        let h2 = Blake3Hash::hash(b"raw-token");
        assert_eq!(h1, h2);
        assert_ne!(h1, Blake3Hash::hash(b"other-token"));
    }

    #[test]
    fn blake3_hex_roundtrip() {
        let h = Blake3Hash::hash(b"abc");
        assert_eq!(Blake3Hash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(Blake3Hash::from_hex("zz").is_err());
        assert!(Blake3Hash::from_hex("aabb").is_err());
    }

    #[test]
    fn signature_serde_roundtrip() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let sig = keypair.sign(b"msg");

        let mut buf = Vec::new();
        ciborium::into_writer(&sig, &mut buf).unwrap();
        let back: Ed25519Signature = ciborium::from_reader(&buf[..]).unwrap();
        assert_eq!(sig, back);
    }

    #[test]
    fn wrong_key_rejects() {
        let signer = Keypair::from_seed(&[2u8; 32]);
        let other = Keypair::from_seed(&[3u8; 32]);
        let sig = signer.sign(b"m");
        assert!(other.public_key().verify(b"m", &sig).is_err());
    }
}
