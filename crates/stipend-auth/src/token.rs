//! Raw token generation and hashing.
//!
//! Raw tokens are 32 random bytes, hex-encoded. Only the Blake3 hash
//! of the raw string is ever stored; the hash is the session lookup
//! key.

use stipend_core::Blake3Hash;

/// Generate a fresh raw credential string.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Hash a presented raw token for lookup/storage.
pub fn token_hash(raw: &str) -> Blake3Hash {
    Blake3Hash::hash(raw.as_bytes())
}

/// Credentials returned to an agent by connect or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialBundle {
    /// Plain bearer session (no proof-of-possession key supplied).
    V1 { token: String, expires_at: i64 },
    /// Proof-of-possession pair.
    V2 {
        access_token: String,
        access_expires_at: i64,
        refresh_token: String,
        refresh_expires_at: i64,
    },
}

impl CredentialBundle {
    /// The credential an agent presents on protected calls.
    pub fn presented_token(&self) -> &str {
        match self {
            Self::V1 { token, .. } => token,
            Self::V2 { access_token, .. } => access_token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(hex::decode(&a).is_ok());
    }

    #[test]
    fn hash_is_deterministic() {
        let raw = generate_token();
        assert_eq!(token_hash(&raw), token_hash(&raw));
    }
}
