//! End-to-end credential lifecycle over the SQLite store: connect,
//! authenticate with proof-of-possession, rotate, replay.

use std::sync::Arc;

use stipend_auth::{
    authenticate, exchange_connect_code, issue_connect_code, refresh_session, sign_proof,
    token_hash, AuthError, CredentialBundle, RequestContext,
};
use stipend_core::{Address, Agent, Keypair, Protocol, WorkspaceId};
use stipend_store::{SqliteStore, Store};

const URL: &str = "https://api.example.test/agent/transfer";

async fn seeded(store: &SqliteStore) -> Agent {
    let agent = Agent::new(
        WorkspaceId::generate(),
        "reporter",
        "custody/reporter",
        Address::from_bytes([1u8; 32]),
        0,
    );
    store.insert_agent(&agent).await.unwrap();
    agent
}

fn parts(bundle: &CredentialBundle) -> (String, String) {
    match bundle {
        CredentialBundle::V2 {
            access_token,
            refresh_token,
            ..
        } => (access_token.clone(), refresh_token.clone()),
        CredentialBundle::V1 { .. } => panic!("expected v2 credentials"),
    }
}

#[tokio::test]
async fn full_v2_lifecycle_over_sqlite() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let agent = seeded(&store).await;
    let pop = Keypair::from_seed(&[0x42; 32]);

    // Connect with a proof-of-possession key.
    let code = issue_connect_code(store.as_ref(), &agent.id, 0).await.unwrap();
    let outcome = exchange_connect_code(store.as_ref(), &code, Some(pop.public_key()), 0)
        .await
        .unwrap();
    let (access, refresh) = parts(&outcome.credentials);

    // Authenticate a protected call with a fresh proof.
    let proof = sign_proof(&pop, "POST", URL, &access, "jti-1", 1);
    let ctx = authenticate(
        store.as_ref(),
        &access,
        &RequestContext {
            method: "POST",
            url: URL,
            proof: Some(&proof),
        },
        1_000,
    )
    .await
    .unwrap();
    assert_eq!(ctx.agent_id, agent.id);
    assert_eq!(ctx.protocol, Protocol::V2);

    // Replaying the same jti with a new valid signature fails.
    let replay = sign_proof(&pop, "POST", URL, &access, "jti-1", 2);
    let err = authenticate(
        store.as_ref(),
        &access,
        &RequestContext {
            method: "POST",
            url: URL,
            proof: Some(&replay),
        },
        2_000,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AuthError::ReplayDetected));

    // Rotate. The old pair dies wholesale, the new one works.
    let rotated = refresh_session(store.as_ref(), &refresh, 3_000).await.unwrap();
    assert_eq!(rotated.sequence, 1);
    let (new_access, new_refresh) = parts(&rotated.credentials);

    for dead in [&access, &refresh] {
        assert!(store
            .get_session_by_hash(&token_hash(dead))
            .await
            .unwrap()
            .is_none());
    }

    let proof = sign_proof(&pop, "POST", URL, &new_access, "jti-2", 4);
    authenticate(
        store.as_ref(),
        &new_access,
        &RequestContext {
            method: "POST",
            url: URL,
            proof: Some(&proof),
        },
        4_000,
    )
    .await
    .unwrap();

    // A second use of the already-rotated refresh token is an ordinary
    // invalid-token error, as a losing concurrent refresh would see.
    let err = refresh_session(store.as_ref(), &refresh, 5_000).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidRefreshToken));

    // The new refresh token carries the incremented sequence.
    let row = store
        .get_session_by_hash(&token_hash(&new_refresh))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.sequence, Some(1));
}

#[tokio::test]
async fn connect_code_single_use_over_sqlite() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let agent = seeded(&store).await;

    let code = issue_connect_code(store.as_ref(), &agent.id, 0).await.unwrap();
    exchange_connect_code(store.as_ref(), &code, None, 100)
        .await
        .unwrap();

    let err = exchange_connect_code(store.as_ref(), &code, None, 200)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidConnectCode));
}

#[tokio::test]
async fn expired_sessions_are_swept() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    let agent = seeded(&store).await;

    let code = issue_connect_code(store.as_ref(), &agent.id, 0).await.unwrap();
    let outcome = exchange_connect_code(store.as_ref(), &code, None, 0)
        .await
        .unwrap();
    let token = outcome.credentials.presented_token().to_string();

    // Past every TTL: the sweep removes the bearer session.
    let far_future = 40 * 24 * 60 * 60 * 1_000;
    let swept = store.sweep_expired_sessions(far_future).await.unwrap();
    assert!(swept >= 1);
    assert!(store
        .get_session_by_hash(&token_hash(&token))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn nonce_sweep_keeps_live_entries() {
    let store = Arc::new(SqliteStore::open_memory().unwrap());
    store.claim_nonce("live", 100_000).await.unwrap();
    store.claim_nonce("dead", 1_000).await.unwrap();

    assert_eq!(store.sweep_expired_nonces(50_000).await.unwrap(), 1);
    assert_eq!(
        store.claim_nonce("live", 100_000).await.unwrap(),
        stipend_store::NonceClaim::Replayed
    );
}
