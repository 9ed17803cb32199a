//! Development server: the agent endpoints over a SQLite store with
//! in-memory ledger collaborators. Production deployments supply real
//! `LedgerRpc`/`RemoteSigner` implementations and construct the router
//! from a library crate instead.

use std::sync::Arc;

use stipend::core::Keypair;
use stipend::ledger::{LocalSigner, MemoryLedger};
use stipend::store::SqliteStore;
use stipend::{Engine, EngineConfig};
use stipend_http::{build_router, AppState, HttpConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stipend=info,stipend_http=info".into()),
        )
        .init();

    let db_path = std::env::var("STIPEND_DB").unwrap_or_else(|_| "stipend.db".to_string());
    let listen = std::env::var("STIPEND_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let store = Arc::new(SqliteStore::open(&db_path)?);
    let rpc = Arc::new(MemoryLedger::new());
    let signer = Arc::new(LocalSigner::new());
    let sponsor = Keypair::generate();

    let engine = Arc::new(Engine::new(
        store,
        rpc,
        signer,
        sponsor,
        EngineConfig::default(),
    ));
    let state = AppState::new(engine, HttpConfig::default());

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, db = %db_path, "stipend http edge listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
