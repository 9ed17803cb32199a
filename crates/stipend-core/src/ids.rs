//! Entity identifiers.
//!
//! Persisted entities carry 16-byte random ids rendered as hex. Each id
//! space is its own newtype so they cannot be mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

fn parse_id16(s: &str) -> Result<[u8; 16], CoreError> {
    let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidId("expected 16 bytes".into()))
}

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(rand::random())
            }

            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                Ok(Self(parse_id16(s)?))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }
    };
}

entity_id! {
    /// Identifies an agent (automated principal).
    AgentId
}

entity_id! {
    /// Identifies a workspace (the custodial group owning a vault).
    WorkspaceId
}

entity_id! {
    /// Identifies a session credential record.
    SessionId
}

entity_id! {
    /// Identifies a transfer/execute request.
    RequestId
}

entity_id! {
    /// Chain identifier shared by every refresh rotation of one grant.
    FamilyId
}

entity_id! {
    /// Identifies an activity-log entry.
    ActivityId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = AgentId::generate();
        assert_eq!(AgentId::from_hex(&id.to_hex()).unwrap(), id);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(SessionId::from_hex("abcd").is_err());
        assert!(SessionId::from_hex("not-hex").is_err());
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
