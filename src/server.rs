//!
//! ragway HTTP server
//! ------------------
//! Axum-based HTTP API for the widget chat endpoint and the dashboard.
//!
//! Responsibilities:
//! - Widget chat endpoint guarded by the admission gate (token, origin,
//!   rate, quota — in that order).
//! - Dashboard login/ingest/history endpoints guarded by the session
//!   authenticator only (no origin/rate/quota rules).
//! - Permissive CORS so the widget works when embedded on tenant sites.
//! - Explicitly constructed, dependency-injected state: store, cache and
//!   model clients are built once in `run_with_settings` and passed in.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::cache;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::gateway::{AdmissionGate, AdmissionRequest, UsageAccountant};
use crate::identity::SessionAuthenticator;
use crate::knowledge::KnowledgeBase;
use crate::rag::{build_system_prompt, chunk_text, ChatModel, OpenAiClient};
use crate::store::{Conversation, ConversationStore, HttpStore, Tenant};

const CHUNK_SIZE: usize = 1000;
const CHUNK_OVERLAP: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub sessions: Arc<SessionAuthenticator>,
    pub knowledge: Arc<KnowledgeBase>,
    pub conversations: Arc<dyn ConversationStore>,
    pub chat_model: Arc<dyn ChatModel>,
    pub accountant: UsageAccountant,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "status": "error",
            "code": self.code_str(),
            "message": self.message(),
        }));
        (status, body).into_response()
    }
}

/// Build the router over an already-assembled state. Split out from
/// `run_with_settings` so tests can drive handlers with in-memory doubles.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ragway ok" }))
        .route("/api/auth/login", post(login))
        .route("/api/chat", post(chat))
        .route("/api/learn", post(learn))
        .route("/api/scrape", post(scrape))
        .route("/api/history", get(history))
        .layer(middleware::from_fn(permissive_cors))
        .with_state(state)
}

/// Start the server from environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    run_with_settings(settings).await
}

pub async fn run_with_settings(settings: Settings) -> anyhow::Result<()> {
    let store = Arc::new(HttpStore::new(&settings.store_url, &settings.store_key)?);
    let fast_cache = cache::connect_optional(settings.cache_url.as_deref()).await;
    if fast_cache.is_none() {
        info!("no fast cache configured; running without snapshot cache or rate limiting");
    }
    let openai = Arc::new(OpenAiClient::new(&settings.openai_api_key)?);

    let state = AppState {
        gate: Arc::new(AdmissionGate::new(store.clone(), fast_cache.clone())),
        sessions: Arc::new(SessionAuthenticator::new(store.clone(), &settings.session_secret)),
        knowledge: Arc::new(KnowledgeBase::new(store.clone(), openai.clone())),
        conversations: store.clone(),
        chat_model: openai,
        accountant: UsageAccountant::new(store, fast_cache),
    };

    let app = build_router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// The widget is embedded on arbitrary tenant sites, so CORS is wide open;
/// real origin policy is enforced per-tenant by the admission gate.
async fn permissive_cors(req: axum::extract::Request, next: Next) -> Response {
    let preflight = req.method() == Method::OPTIONS;
    let mut response = if preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    response
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

fn bearer_token(headers: &HeaderMap) -> AppResult<String> {
    let raw = header_value(headers, "authorization").ok_or_else(|| {
        AppError::unauthenticated("missing_credentials", "missing Authorization header")
    })?;
    raw.strip_prefix("Bearer ")
        .map(|t| t.to_string())
        .ok_or_else(|| AppError::unauthenticated("missing_credentials", "expected bearer token"))
}

async fn dashboard_tenant(state: &AppState, headers: &HeaderMap) -> AppResult<Tenant> {
    let token = bearer_token(headers)?;
    state.sessions.authenticate(&token).await
}

// --- auth ---

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<serde_json::Value>> {
    let (access_token, tenant) = state.sessions.login(&form.username, &form.password).await?;
    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "bearer",
        "client": { "id": tenant.id, "name": tenant.name, "email": tenant.email },
    })))
}

// --- widget chat ---

#[derive(Debug, Deserialize)]
struct ChatPayload {
    question: String,
}

async fn chat(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<ChatPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let req = AdmissionRequest {
        widget_token: header_value(&headers, "x-widget-token"),
        origin: header_value(&headers, "origin").or_else(|| header_value(&headers, "referer")),
        client_ip: peer.ip().to_string(),
    };
    let tenant = state.gate.admit(&req).await?;

    let sources = state.knowledge.search(&tenant.id, &payload.question).await?;
    let prompt = build_system_prompt(&tenant.name, &sources);
    let answer = state
        .chat_model
        .complete(&prompt, &payload.question)
        .await
        .map_err(|e| {
            error!(tenant = %tenant.id, "generation failed: {e}");
            AppError::upstream("generation_failed", "generation service unavailable")
        })?;

    // Both post-serve writes are fire-and-forget; the response never waits.
    state.accountant.record_usage(&tenant.id);
    {
        let conversations = state.conversations.clone();
        let record = Conversation::exchange(&tenant.id, &payload.question, &answer);
        tokio::spawn(async move {
            if let Err(e) = conversations.append(record).await {
                error!("conversation save failed: {e}");
            }
        });
    }

    Ok(Json(json!({ "response": answer, "sources": sources })))
}

// --- dashboard ---

#[derive(Debug, Deserialize)]
struct LearnPayload {
    text: String,
}

async fn learn(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LearnPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let tenant = dashboard_tenant(&state, &headers).await?;
    if payload.text.trim().is_empty() {
        return Err(AppError::user("empty_text", "nothing to learn"));
    }
    state.knowledge.learn(&tenant.id, &payload.text, "manual").await?;
    Ok(Json(json!({ "message": "learned" })))
}

#[derive(Debug, Deserialize)]
struct ScrapePayload {
    url: String,
}

async fn scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ScrapePayload>,
) -> AppResult<Json<serde_json::Value>> {
    let tenant = dashboard_tenant(&state, &headers).await?;
    let raw_text = crate::scrape::scrape_website(&payload.url).await?;

    let chunks = chunk_text(&raw_text, CHUNK_SIZE, CHUNK_OVERLAP);
    let total = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        let source = format!("{} (part {}/{})", payload.url, i + 1, total);
        state.knowledge.learn(&tenant.id, chunk, &source).await?;
    }
    Ok(Json(json!({ "message": format!("{total} chunks added for {}", tenant.name) })))
}

async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let tenant = dashboard_tenant(&state, &headers).await?;
    let conversations = state
        .conversations
        .list_for_tenant(&tenant.id)
        .await
        .map_err(|e| AppError::upstream("store_unavailable", e.to_string()))?;
    Ok(Json(serde_json::to_value(conversations).map_err(|e| {
        AppError::internal("serialize_failed", e.to_string())
    })?))
}
