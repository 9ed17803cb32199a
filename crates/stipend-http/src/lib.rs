//! Thin HTTP edge for the agent-facing endpoints.
//!
//! Four POST routes over the engine: connect, refresh, transfer,
//! status. The edge owns transport concerns only - header parsing,
//! rate limiting, and one explicit error→status mapping table.
//! Non-2xx responses carry `{"error": "..."}`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use stipend::auth::{
    authenticate, exchange_connect_code, refresh_session, AuthContext, AuthError,
    CredentialBundle, RateLimiter, RequestContext,
};
use stipend::policy::DeclaredInstruction;
use stipend::{Engine, EngineError};
use stipend_core::{Address, Ed25519PublicKey};

/// Edge configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// External base URL, used to reconstruct the target URL a
    /// proof-of-possession proof must claim.
    pub base_url: String,
    /// Connect-endpoint rate limit window.
    pub rate_window_ms: i64,
    /// Attempts allowed per caller per window.
    pub rate_max_attempts: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            rate_window_ms: 60_000,
            rate_max_attempts: 10,
        }
    }
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub limiter: Arc<RateLimiter>,
    pub config: Arc<HttpConfig>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: HttpConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_window_ms,
            config.rate_max_attempts,
        ));
        Self {
            engine,
            limiter,
            config: Arc::new(config),
        }
    }
}

/// Build the agent-facing router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/agent/connect", post(connect))
        .route("/agent/refresh", post(refresh))
        .route("/agent/transfer", post(transfer))
        .route("/agent/status", post(status))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Transport-level error: a status code plus the error string. The
/// single mapping table from the engine's taxonomy lives in the
/// `From<EngineError>` impl.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::AuthRejected(AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::AuthRejected(_) => StatusCode::UNAUTHORIZED,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::LedgerSubmitFailed(_)
            | EngineError::LedgerConfirmFailed(_)
            | EngineError::LedgerReadFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::Store(_) | EngineError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::PolicyDenied(_)
            | EngineError::ValidationFailed(_)
            | EngineError::Builder(_) => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::from(EngineError::AuthRejected(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / response bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConnectBody {
    connect_code: String,
    /// Hex, 32 bytes. Supplying it upgrades the exchange to a v2
    /// proof-of-possession pair.
    auth_public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TransferBody {
    recipient: Option<String>,
    amount: Option<u64>,
    #[serde(default)]
    note: String,
    #[serde(default)]
    justification: String,
    /// Caller-declared instruction batch; mutually exclusive with
    /// recipient/amount.
    instructions: Option<Vec<DeclaredInstruction>>,
}

#[derive(Debug, Serialize)]
struct CredentialsResponse {
    agent_id: String,
    workspace_id: String,
    protocol: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_expires_at: Option<i64>,
}

impl CredentialsResponse {
    fn new(agent_id: String, workspace_id: String, credentials: CredentialBundle) -> Self {
        match credentials {
            CredentialBundle::V1 { token, expires_at } => Self {
                agent_id,
                workspace_id,
                protocol: "v1",
                token: Some(token),
                expires_at: Some(expires_at),
                access_token: None,
                access_expires_at: None,
                refresh_token: None,
                refresh_expires_at: None,
            },
            CredentialBundle::V2 {
                access_token,
                access_expires_at,
                refresh_token,
                refresh_expires_at,
            } => Self {
                agent_id,
                workspace_id,
                protocol: "v2",
                token: None,
                expires_at: None,
                access_token: Some(access_token),
                access_expires_at: Some(access_expires_at),
                refresh_token: Some(refresh_token),
                refresh_expires_at: Some(refresh_expires_at),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConnectBody>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let now = now_millis();
    if !state.limiter.check(&caller_key(&headers, &body.connect_code), now) {
        return Err(AuthError::RateLimited.into());
    }

    let pop_key = body
        .auth_public_key
        .as_deref()
        .map(Ed25519PublicKey::from_hex)
        .transpose()
        .map_err(|_| ApiError::bad_request("auth_public_key must be 32 bytes of hex"))?;

    let outcome = exchange_connect_code(
        state.engine.store().as_ref(),
        &body.connect_code,
        pop_key,
        now,
    )
    .await?;

    Ok(Json(CredentialsResponse::new(
        outcome.agent_id.to_hex(),
        outcome.workspace_id.to_hex(),
        outcome.credentials,
    )))
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshBody>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let outcome = refresh_session(
        state.engine.store().as_ref(),
        &body.refresh_token,
        now_millis(),
    )
    .await?;

    Ok(Json(CredentialsResponse::new(
        outcome.agent_id.to_hex(),
        outcome.workspace_id.to_hex(),
        outcome.credentials,
    )))
}

async fn transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TransferBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = authorize(&state, &headers, "/agent/transfer").await?;
    let now = now_millis();

    let outcome = match body.instructions {
        Some(instructions) => {
            state
                .engine
                .execute_instructions(
                    &ctx.agent_id,
                    &instructions,
                    &body.note,
                    &body.justification,
                    now,
                )
                .await?
        }
        None => {
            let recipient = body
                .recipient
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("recipient is required"))?;
            let recipient = Address::from_hex(recipient)
                .map_err(|e| ApiError::bad_request(format!("recipient: {}", e)))?;
            let amount = body
                .amount
                .ok_or_else(|| ApiError::bad_request("amount is required"))?;
            state
                .engine
                .execute_transfer(
                    &ctx.agent_id,
                    recipient,
                    amount,
                    &body.note,
                    &body.justification,
                    now,
                )
                .await?
        }
    };

    Ok(Json(serde_json::json!({
        "request_id": outcome.request.id.to_hex(),
        "status": outcome.request.status.as_str(),
        "signature": outcome.signature,
        "proposal": outcome.request.proposal_ref.map(|a| a.to_hex()),
    })))
}

async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let ctx = authorize(&state, &headers, "/agent/status").await?;

    let view = state
        .engine
        .agent_status(&ctx.agent_id, now_millis())
        .await?;

    Ok(Json(serde_json::json!({
        "agent_id": view.agent_id.to_hex(),
        "workspace_id": view.workspace_id.to_hex(),
        "status": view.status.as_str(),
        "budget": view.limit.as_ref().map(|l| serde_json::json!({
            "token_mint": l.token_mint.to_hex(),
            "limit_amount": l.limit_amount,
            "spent_amount": l.spent_amount,
            "period_type": l.period_type,
        })),
        "remaining": view.decision.map(|d| d.remaining),
        "period_expired": view.decision.map(|d| d.period_expired),
    })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve the caller's protected-call credential: `Authorization:
/// Bearer <token>` or `Authorization: DPoP <token>` plus a `DPoP`
/// proof header for v2.
async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
) -> Result<AuthContext, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;
    let token = authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("DPoP "))
        .ok_or_else(|| ApiError::unauthorized("unsupported authorization scheme"))?;

    let url = format!("{}{}", state.config.base_url, path);
    let proof = headers.get("dpop").and_then(|v| v.to_str().ok());

    authenticate(
        state.engine.store().as_ref(),
        token,
        &RequestContext {
            method: "POST",
            url: &url,
            proof,
        },
        now_millis(),
    )
    .await
    .map_err(ApiError::from)
}

/// Rate-limit key: the forwarded client address when a proxy provides
/// one, else the presented code itself.
fn caller_key(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use stipend::core::{Agent, AgentStatus, Keypair, SpendingLimit, Workspace};
    use stipend::ledger::{settings_address, LocalSigner, MemoryLedger, SettingsAccount};
    use stipend::store::{MemoryStore, Store};
    use stipend::EngineConfig;
    use stipend_auth::issue_connect_code;

    struct Harness {
        state: AppState,
        store: Arc<MemoryStore>,
        agent: Agent,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let agent_key = Keypair::from_seed(&[0x21; 32]);
        let signer = Arc::new(LocalSigner::new().with_key("custody/reporter", agent_key.clone()));

        let creator = Address::from_bytes([0x01; 32]);
        let seed = Address::from_bytes([0x02; 32]);
        let settings = settings_address(&seed);
        let workspace = Workspace::new("ops", settings, creator, 0);
        store.insert_workspace(&workspace).await.unwrap();
        ledger.set_account(settings, SettingsAccount::new(creator, 2).to_bytes());

        let mut agent = Agent::new(
            workspace.id,
            "reporter",
            "custody/reporter",
            agent_key.public_key().into(),
            0,
        );
        agent.transition(AgentStatus::Connected, 0).unwrap();
        agent.transition(AgentStatus::Active, 0).unwrap();
        store.insert_agent(&agent).await.unwrap();

        let mut limit = SpendingLimit::new(
            agent.id,
            Address::from_bytes([0x0A; 32]),
            1_000,
            "daily",
            now_millis(),
        );
        limit.spent_amount = 0;
        store.upsert_limit(&limit).await.unwrap();

        let engine = Arc::new(Engine::new(
            store.clone(),
            ledger,
            signer,
            Keypair::from_seed(&[0xA0; 32]),
            EngineConfig::default(),
        ));
        let state = AppState::new(engine, HttpConfig::default());
        Harness {
            state,
            store,
            agent,
        }
    }

    fn post_json(path: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn connect_returns_v1_credentials() {
        let h = harness().await;
        let code = issue_connect_code(h.store.as_ref(), &h.agent.id, now_millis())
            .await
            .unwrap();
        let app = build_router(h.state.clone());

        let response = app
            .oneshot(post_json(
                "/agent/connect",
                serde_json::json!({ "connect_code": code }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["protocol"], "v1");
        assert!(json["token"].is_string());
    }

    #[tokio::test]
    async fn bad_connect_code_is_401_with_error_body() {
        let h = harness().await;
        let app = build_router(h.state.clone());

        let response = app
            .oneshot(post_json(
                "/agent/connect",
                serde_json::json!({ "connect_code": "bogus" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("connect code"));
    }

    #[tokio::test]
    async fn connect_rate_limit_is_429() {
        let h = harness().await;
        let app = build_router(h.state.clone());

        for _ in 0..h.state.config.rate_max_attempts {
            let _ = app
                .clone()
                .oneshot({
                    let mut req = post_json(
                        "/agent/connect",
                        serde_json::json!({ "connect_code": "bogus" }),
                    );
                    req.headers_mut()
                        .insert("x-forwarded-for", "10.0.0.7".parse().unwrap());
                    req
                })
                .await
                .unwrap();
        }

        let mut req = post_json(
            "/agent/connect",
            serde_json::json!({ "connect_code": "bogus" }),
        );
        req.headers_mut()
            .insert("x-forwarded-for", "10.0.0.7".parse().unwrap());
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn status_without_credentials_is_401() {
        let h = harness().await;
        let app = build_router(h.state.clone());

        let response = app
            .oneshot(post_json("/agent/status", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn transfer_flow_end_to_end_with_v1_bearer() {
        let h = harness().await;
        let code = issue_connect_code(h.store.as_ref(), &h.agent.id, now_millis())
            .await
            .unwrap();
        let app = build_router(h.state.clone());

        let response = app
            .clone()
            .oneshot(post_json(
                "/agent/connect",
                serde_json::json!({ "connect_code": code }),
            ))
            .await
            .unwrap();
        let token = body_json(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        let mut req = post_json(
            "/agent/transfer",
            serde_json::json!({
                "recipient": Address::from_bytes([0x0B; 32]).to_hex(),
                "amount": 250,
                "note": "supplies",
                "justification": "restock",
            }),
        );
        req.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "executed");
    }
}
