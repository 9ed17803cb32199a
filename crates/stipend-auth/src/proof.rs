//! Proof-of-possession proofs.
//!
//! A proof is a short-lived signed assertion binding one HTTP call
//! (method + URL + access token) to the holder of a private key. Wire
//! form is three dot-separated base64url segments:
//! `header . claims . signature`, signed over `header.claims`.
//!
//! Verification returns a typed [`ProofError`] for every failure mode;
//! it never panics and never produces an unstructured error. Replay
//! protection (the `jti` claim) is the caller's job and happens
//! strictly after signature verification succeeds.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stipend_core::{Blake3Hash, CoreError, Ed25519PublicKey, Ed25519Signature, Keypair};

/// Expected `typ` header value.
pub const PROOF_TYPE: &str = "stipend-pop+v1";
/// The one accepted signature algorithm.
pub const PROOF_ALG: &str = "EdDSA";
/// Accepted clock skew on the issued-at claim, either direction.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Proof verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("proof is not three dot-separated segments")]
    Structure,

    #[error("proof segment is not valid base64url")]
    Encoding,

    #[error("proof header is not valid JSON")]
    HeaderJson,

    #[error("proof claims are not valid JSON")]
    ClaimsJson,

    #[error("unexpected proof type: {0}")]
    WrongType(String),

    #[error("unexpected proof algorithm: {0}")]
    WrongAlgorithm(String),

    #[error("proof method mismatch: expected {expected}, got {got}")]
    MethodMismatch { expected: String, got: String },

    #[error("proof URL mismatch: expected {expected}, got {got}")]
    UrlMismatch { expected: String, got: String },

    #[error("proof issued-at outside the acceptance window")]
    StaleIssuedAt,

    #[error("proof is not bound to the presented access token")]
    TokenBindingMismatch,

    #[error("proof public key must be exactly 32 bytes")]
    BadKeyLength,

    #[error("proof public key is not a valid key encoding")]
    InvalidKey,

    #[error("proof public key does not match the registered key")]
    KeyMismatch,

    #[error("proof signature verification failed")]
    BadSignature,
}

/// The proof header segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofHeader {
    pub typ: String,
    pub alg: String,
    /// Raw 32-byte public key, hex.
    pub pk: String,
}

/// The proof claims segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofClaims {
    /// Unique id, consumed at most once by the replay-nonce store.
    pub jti: String,
    /// Claimed HTTP method.
    pub htm: String,
    /// Claimed target URL.
    pub htu: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Blake3 hex of the access token presented alongside the proof.
    pub ath: String,
}

/// What the verifier checks a proof against.
#[derive(Debug, Clone)]
pub struct ProofExpectations<'a> {
    /// Actual request method.
    pub method: &'a str,
    /// Actual request URL.
    pub url: &'a str,
    /// The access token presented in the same request.
    pub access_token: &'a str,
    /// Registered proof-of-possession key for the agent, if any.
    pub registered_key: Option<Ed25519PublicKey>,
    /// Verifier clock, Unix seconds.
    pub now_secs: i64,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    pub jti: String,
    pub public_key: Ed25519PublicKey,
    pub issued_at: i64,
}

/// Produce a signed proof string. Client-side half; the server only
/// uses it in tests.
pub fn sign_proof(
    keypair: &Keypair,
    method: &str,
    url: &str,
    access_token: &str,
    jti: &str,
    iat_secs: i64,
) -> String {
    let header = ProofHeader {
        typ: PROOF_TYPE.to_string(),
        alg: PROOF_ALG.to_string(),
        pk: keypair.public_key().to_hex(),
    };
    let claims = ProofClaims {
        jti: jti.to_string(),
        htm: method.to_string(),
        htu: url.to_string(),
        iat: iat_secs,
        ath: Blake3Hash::hash(access_token.as_bytes()).to_hex(),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header is JSON"));
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims are JSON"));
    let message = format!("{}.{}", header_b64, claims_b64);
    let signature = keypair.sign(message.as_bytes());
    format!("{}.{}", message, URL_SAFE_NO_PAD.encode(signature.as_bytes()))
}

/// Verify a proof against the actual request.
///
/// Checks run in a fixed order: structure, declared type/algorithm,
/// method, URL, issued-at window, access-token binding, key shape,
/// signature. The first failure wins.
pub fn verify_proof(
    proof: &str,
    expectations: &ProofExpectations<'_>,
) -> Result<VerifiedProof, ProofError> {
    let mut segments = proof.split('.');
    let (header_b64, claims_b64, signature_b64) =
        match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(h), Some(c), Some(s), None) if !h.is_empty() && !c.is_empty() && !s.is_empty() => {
                (h, c, s)
            }
            _ => return Err(ProofError::Structure),
        };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| ProofError::Encoding)?;
    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .map_err(|_| ProofError::Encoding)?;
    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| ProofError::Encoding)?;

    let header: ProofHeader =
        serde_json::from_slice(&header_bytes).map_err(|_| ProofError::HeaderJson)?;
    let claims: ProofClaims =
        serde_json::from_slice(&claims_bytes).map_err(|_| ProofError::ClaimsJson)?;

    if header.typ != PROOF_TYPE {
        return Err(ProofError::WrongType(header.typ));
    }
    if header.alg != PROOF_ALG {
        return Err(ProofError::WrongAlgorithm(header.alg));
    }

    if claims.htm != expectations.method {
        return Err(ProofError::MethodMismatch {
            expected: expectations.method.to_string(),
            got: claims.htm,
        });
    }
    if claims.htu != expectations.url {
        return Err(ProofError::UrlMismatch {
            expected: expectations.url.to_string(),
            got: claims.htu,
        });
    }

    if (expectations.now_secs - claims.iat).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(ProofError::StaleIssuedAt);
    }

    let expected_ath = Blake3Hash::hash(expectations.access_token.as_bytes()).to_hex();
    if claims.ath != expected_ath {
        return Err(ProofError::TokenBindingMismatch);
    }

    let key_bytes = hex::decode(&header.pk).map_err(|_| ProofError::BadKeyLength)?;
    let key_bytes: [u8; 32] = key_bytes.try_into().map_err(|_| ProofError::BadKeyLength)?;
    let public_key = Ed25519PublicKey::from_bytes(key_bytes);

    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| ProofError::BadSignature)?;
    let message = format!("{}.{}", header_b64, claims_b64);
    public_key
        .verify(message.as_bytes(), &Ed25519Signature::from_bytes(signature_bytes))
        .map_err(|e| match e {
            CoreError::InvalidPublicKey => ProofError::InvalidKey,
            _ => ProofError::BadSignature,
        })?;

    // Key binding to the agent's registered key comes last: at this
    // point the presenter has proven possession of *some* key, and we
    // reject if it is not the registered one.
    if let Some(registered) = expectations.registered_key {
        if registered != public_key {
            return Err(ProofError::KeyMismatch);
        }
    }

    Ok(VerifiedProof {
        jti: claims.jti,
        public_key,
        issued_at: claims.iat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn keypair() -> Keypair {
        Keypair::from_seed(&[0x11; 32])
    }

    fn expectations<'a>(key: &'a Option<Ed25519PublicKey>) -> ProofExpectations<'a> {
        ProofExpectations {
            method: "POST",
            url: "https://api.example.test/agent/transfer",
            access_token: "access-token",
            registered_key: *key,
            now_secs: NOW,
        }
    }

    fn valid_proof() -> String {
        sign_proof(
            &keypair(),
            "POST",
            "https://api.example.test/agent/transfer",
            "access-token",
            "jti-1",
            NOW,
        )
    }

    #[test]
    fn valid_proof_verifies() {
        let verified = verify_proof(&valid_proof(), &expectations(&None)).unwrap();
        assert_eq!(verified.jti, "jti-1");
        assert_eq!(verified.public_key, keypair().public_key());
    }

    #[test]
    fn registered_key_must_match() {
        let registered = Some(Keypair::from_seed(&[0x22; 32]).public_key());
        let err = verify_proof(&valid_proof(), &expectations(&registered)).unwrap_err();
        assert_eq!(err, ProofError::KeyMismatch);
    }

    #[test]
    fn malformed_structure_rejected() {
        assert_eq!(
            verify_proof("only.two", &expectations(&None)).unwrap_err(),
            ProofError::Structure
        );
        assert_eq!(
            verify_proof("", &expectations(&None)).unwrap_err(),
            ProofError::Structure
        );
        assert_eq!(
            verify_proof("a.b.c.d", &expectations(&None)).unwrap_err(),
            ProofError::Structure
        );
    }

    #[test]
    fn wrong_method_rejected() {
        let proof = sign_proof(
            &keypair(),
            "GET",
            "https://api.example.test/agent/transfer",
            "access-token",
            "jti-1",
            NOW,
        );
        assert!(matches!(
            verify_proof(&proof, &expectations(&None)).unwrap_err(),
            ProofError::MethodMismatch { .. }
        ));
    }

    #[test]
    fn wrong_url_rejected() {
        let proof = sign_proof(
            &keypair(),
            "POST",
            "https://api.example.test/agent/status",
            "access-token",
            "jti-1",
            NOW,
        );
        assert!(matches!(
            verify_proof(&proof, &expectations(&None)).unwrap_err(),
            ProofError::UrlMismatch { .. }
        ));
    }

    #[test]
    fn issued_at_window_is_thirty_seconds() {
        for (iat, ok) in [
            (NOW - 30, true),
            (NOW + 30, true),
            (NOW - 31, false),
            (NOW + 31, false),
        ] {
            let proof = sign_proof(
                &keypair(),
                "POST",
                "https://api.example.test/agent/transfer",
                "access-token",
                "jti-1",
                iat,
            );
            let result = verify_proof(&proof, &expectations(&None));
            if ok {
                assert!(result.is_ok(), "iat {} should verify", iat);
            } else {
                assert_eq!(result.unwrap_err(), ProofError::StaleIssuedAt);
            }
        }
    }

    #[test]
    fn wrong_access_token_rejected() {
        let proof = sign_proof(
            &keypair(),
            "POST",
            "https://api.example.test/agent/transfer",
            "stolen-other-token",
            "jti-1",
            NOW,
        );
        assert_eq!(
            verify_proof(&proof, &expectations(&None)).unwrap_err(),
            ProofError::TokenBindingMismatch
        );
    }

    #[test]
    fn tampered_signature_rejected() {
        let proof = valid_proof();
        let mut parts: Vec<&str> = proof.split('.').collect();
        let tampered_sig = URL_SAFE_NO_PAD.encode([0u8; 64]);
        parts[2] = &tampered_sig;
        let tampered = parts.join(".");
        assert_eq!(
            verify_proof(&tampered, &expectations(&None)).unwrap_err(),
            ProofError::BadSignature
        );
    }

    #[test]
    fn tampered_claims_rejected() {
        let proof = valid_proof();
        let parts: Vec<&str> = proof.split('.').collect();
        let mut claims: ProofClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims.htu = "https://api.example.test/agent/transfer".into();
        claims.jti = "jti-2".into();
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );
        assert_eq!(
            verify_proof(&forged, &expectations(&None)).unwrap_err(),
            ProofError::BadSignature
        );
    }

    #[test]
    fn wrong_declared_type_or_alg_rejected() {
        let proof = valid_proof();
        let parts: Vec<&str> = proof.split('.').collect();
        let mut header: ProofHeader =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        header.typ = "jwt".into();
        let forged = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            parts[1],
            parts[2]
        );
        assert!(matches!(
            verify_proof(&forged, &expectations(&None)).unwrap_err(),
            ProofError::WrongType(_)
        ));
    }

    #[test]
    fn short_key_rejected() {
        let proof = valid_proof();
        let parts: Vec<&str> = proof.split('.').collect();
        let mut header: ProofHeader =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        header.pk = "aabb".into();
        let forged = format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            parts[1],
            parts[2]
        );
        assert_eq!(
            verify_proof(&forged, &expectations(&None)).unwrap_err(),
            ProofError::BadKeyLength
        );
    }
}
