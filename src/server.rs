//! HTTP API server.
//!
//! Exposes feed ingestion, discovery, article listing/search, and chat
//! sessions as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/add_rss` | Parse and store a feed with its entries |
//! | `POST` | `/discover_rss` | Discover feed candidates for a site URL |
//! | `GET`  | `/rss_feeds` | List registered feeds, newest first |
//! | `GET`  | `/articles` | List articles, newest first |
//! | `GET`  | `/search_articles` | Ranked full-text article search |
//! | `POST` | `/chat_sessions` | Create a chat session |
//! | `GET`  | `/chat_sessions` | List sessions by recent activity |
//! | `POST` | `/chat_sessions/{id}/chat` | Run one conversational turn |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid UUID format" } }
//! ```
//!
//! Validation errors carry their specific reason; storage, network, and
//! generation failures are logged in full server-side and returned as
//! sanitized messages.
//!
//! # Rate limiting
//!
//! Token buckets keyed by client address, per route class: chat turns,
//! write endpoints (ingest/discover/session create), and read endpoints.
//! Exceeding a bucket returns 429.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::blob::S3BlobStore;
use crate::chat::ChatOrchestrator;
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::discover;
use crate::error::Error;
use crate::feed;
use crate::generate::HttpGenerator;
use crate::migrate;
use crate::models::ArticleHit;
use crate::ratelimit::RateLimiter;
use crate::session::SessionStore;
use crate::store;

/// Shared application state passed to all route handlers via Axum's
/// `State` extractor. Every handle is injected at startup; handlers hold
/// no ambient globals.
#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    sessions: Arc<SessionStore>,
    orchestrator: Arc<ChatOrchestrator>,
    http: reqwest::Client,
    limits: Arc<RouteLimits>,
}

/// One token bucket per route class.
pub struct RouteLimits {
    chat: RateLimiter,
    write: RateLimiter,
    read: RateLimiter,
}

/// Starts the HTTP server: connects the stores, runs migrations, wires
/// the orchestrator, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let blobs = Arc::new(S3BlobStore::new(config.blob.clone())?);
    let sessions = Arc::new(SessionStore::new(
        pool.clone(),
        blobs,
        config.blob.prefix.clone(),
    ));
    let assembler = ContextAssembler::new(pool.clone(), config.retrieval.clone());
    let generator = Arc::new(HttpGenerator::new(config.generation.clone()));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        sessions.clone(),
        assembler,
        generator,
    ));

    let limits = Arc::new(RouteLimits {
        chat: RateLimiter::per_minute(config.limits.chat_per_minute),
        write: RateLimiter::per_minute(config.limits.write_per_minute),
        read: RateLimiter::per_minute(config.limits.read_per_minute),
    });

    let state = AppState {
        pool,
        sessions,
        orchestrator,
        http: feed::http_client(),
        limits,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/add_rss", post(handle_add_rss))
        .route("/discover_rss", post(handle_discover_rss))
        .route("/rss_feeds", get(handle_list_feeds))
        .route("/articles", get(handle_list_articles))
        .route("/search_articles", get(handle_search_articles))
        .route("/chat_sessions", post(handle_create_session).get(handle_list_sessions))
        .route("/chat_sessions/{id}/chat", post(handle_session_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = config.server.bind.clone();
    tracing::info!(%bind_addr, "rss-chat server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            // Validation reasons are safe to echo.
            Error::Validation(reason) => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request".to_string(),
                message: reason,
            },
            Error::Parse => AppError {
                status: StatusCode::BAD_REQUEST,
                code: "bad_request".to_string(),
                message: "failed to parse feed".to_string(),
            },
            Error::NotFound(what) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found".to_string(),
                message: format!("{} not found", what),
            },
            Error::Network(detail) => {
                tracing::error!(%detail, "upstream network failure");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "upstream_error".to_string(),
                    message: "failed to fetch upstream resource".to_string(),
                }
            }
            Error::Storage(detail) => {
                tracing::error!(%detail, "storage failure");
                AppError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    code: "storage_unavailable".to_string(),
                    message: "storage unavailable".to_string(),
                }
            }
            Error::Generation(detail) => {
                tracing::error!(%detail, "generation failure");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "generation_failed".to_string(),
                    message: "AI service unavailable".to_string(),
                }
            }
        }
    }
}

fn too_many_requests() -> AppError {
    AppError {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "rate_limited".to_string(),
        message: "too many requests".to_string(),
    }
}

fn check_limit(limiter: &RateLimiter, addr: &SocketAddr) -> Result<(), AppError> {
    if limiter.try_acquire(&addr.ip().to_string()) {
        Ok(())
    } else {
        Err(too_many_requests())
    }
}

// ============ Validation helpers ============

fn validate_uuid(raw: &str) -> Result<String, Error> {
    Uuid::parse_str(raw)
        .map(|u| u.to_string())
        .map_err(|_| Error::validation("invalid UUID format"))
}

fn validate_uuids(raw: &[String]) -> Result<Vec<String>, Error> {
    raw.iter().map(|s| validate_uuid(s)).collect()
}

// ============ POST /add_rss ============

#[derive(Deserialize)]
struct RssRequest {
    url: String,
}

#[derive(Serialize)]
struct AddRssResponse {
    feed_id: String,
    feed_title: String,
    entries_count: usize,
}

async fn handle_add_rss(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RssRequest>,
) -> Result<Json<AddRssResponse>, AppError> {
    check_limit(&state.limits.write, &addr)?;

    if req.url.trim().is_empty() {
        return Err(Error::validation("url must not be empty").into());
    }
    let url = discover::normalize_url(req.url.trim());

    let parsed = feed::parse_feed(&state.http, &url).await?;
    let feed_id = store::upsert_feed(&state.pool, &url, &parsed.title, &parsed.description).await?;
    let inserted = store::insert_articles(&state.pool, &feed_id, &parsed.entries).await?;

    tracing::info!(%feed_id, %url, entries = parsed.entries.len(), inserted, "feed ingested");

    Ok(Json(AddRssResponse {
        feed_id,
        feed_title: parsed.title,
        entries_count: parsed.entries.len(),
    }))
}

// ============ POST /discover_rss ============

#[derive(Serialize)]
struct DiscoverResponse {
    feeds: Vec<crate::models::DiscoveredFeed>,
    source_url: String,
}

async fn handle_discover_rss(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<RssRequest>,
) -> Result<Json<DiscoverResponse>, AppError> {
    check_limit(&state.limits.write, &addr)?;

    if req.url.trim().is_empty() {
        return Err(Error::validation("url must not be empty").into());
    }
    let url = discover::normalize_url(req.url.trim());

    // Best-effort: failures inside discovery are logged and swallowed.
    let feeds = discover::discover_feeds(&state.http, &url).await;

    Ok(Json(DiscoverResponse {
        feeds,
        source_url: url,
    }))
}

// ============ GET /rss_feeds ============

#[derive(Serialize)]
struct FeedView {
    id: String,
    title: String,
    url: String,
    description: String,
    last_updated: String,
    created_at: String,
}

#[derive(Serialize)]
struct FeedsResponse {
    feeds: Vec<FeedView>,
}

async fn handle_list_feeds(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<FeedsResponse>, AppError> {
    check_limit(&state.limits.read, &addr)?;

    let feeds = store::list_feeds(&state.pool).await?;
    Ok(Json(FeedsResponse {
        feeds: feeds
            .into_iter()
            .map(|f| FeedView {
                id: f.id,
                title: f.title,
                url: f.url,
                description: f.description,
                last_updated: format_ts(f.last_updated),
                created_at: format_ts(f.created_at),
            })
            .collect(),
    }))
}

// ============ GET /articles, GET /search_articles ============

#[derive(Deserialize)]
struct ListArticlesQuery {
    #[serde(default = "default_list_limit")]
    limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

#[derive(Deserialize)]
struct SearchArticlesQuery {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: i64,
}

fn default_search_limit() -> i64 {
    10
}

#[derive(Serialize)]
struct ArticleView {
    id: String,
    title: String,
    summary: String,
    url: String,
    published_date: Option<String>,
    author: String,
    feed_title: String,
    feed_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    relevance: Option<f64>,
}

#[derive(Serialize)]
struct ArticlesResponse {
    articles: Vec<ArticleView>,
}

fn article_view(hit: &ArticleHit, with_score: bool) -> ArticleView {
    let summary = if with_score && hit.summary.chars().count() > 200 {
        let truncated: String = hit.summary.chars().take(200).collect();
        format!("{}...", truncated)
    } else {
        hit.summary.clone()
    };

    ArticleView {
        id: hit.id.clone(),
        title: hit.title.clone(),
        summary,
        url: hit.url.clone(),
        published_date: hit
            .published_date
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.to_rfc3339()),
        author: hit.author.clone(),
        feed_title: hit.feed_title.clone(),
        feed_id: hit.feed_id.clone(),
        relevance: with_score.then_some(hit.score),
    }
}

async fn handle_list_articles(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<ListArticlesQuery>,
) -> Result<Json<ArticlesResponse>, AppError> {
    check_limit(&state.limits.read, &addr)?;

    let hits = store::list_articles(&state.pool, query.limit.clamp(1, 200)).await?;
    Ok(Json(ArticlesResponse {
        articles: hits.iter().map(|h| article_view(h, false)).collect(),
    }))
}

async fn handle_search_articles(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<SearchArticlesQuery>,
) -> Result<Json<ArticlesResponse>, AppError> {
    check_limit(&state.limits.read, &addr)?;

    if query.q.trim().is_empty() {
        return Ok(Json(ArticlesResponse { articles: Vec::new() }));
    }

    let hits = store::search_articles(&state.pool, &query.q, query.limit.clamp(1, 100)).await?;
    Ok(Json(ArticlesResponse {
        articles: hits.iter().map(|h| article_view(h, true)).collect(),
    }))
}

// ============ POST /chat_sessions, GET /chat_sessions ============

#[derive(Deserialize)]
struct CreateSessionRequest {
    title: Option<String>,
    #[serde(default)]
    rss_feed_ids: Vec<String>,
    #[serde(default)]
    article_ids: Vec<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: String,
}

async fn handle_create_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    check_limit(&state.limits.write, &addr)?;

    let rss_feed_ids = validate_uuids(&req.rss_feed_ids)?;
    let article_ids = validate_uuids(&req.article_ids)?;

    let session_id = state
        .sessions
        .create_session(req.title, rss_feed_ids, article_ids)
        .await?;

    Ok(Json(CreateSessionResponse { session_id }))
}

#[derive(Serialize)]
struct SessionView {
    id: String,
    title: String,
    created_at: String,
    updated_at: String,
    rss_feed_ids: Vec<String>,
    article_ids: Vec<String>,
}

#[derive(Serialize)]
struct SessionsResponse {
    sessions: Vec<SessionView>,
}

async fn handle_list_sessions(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<SessionsResponse>, AppError> {
    check_limit(&state.limits.read, &addr)?;

    let sessions = state.sessions.list_sessions(20).await?;
    Ok(Json(SessionsResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionView {
                id: s.id,
                title: s.title,
                created_at: format_ts(s.created_at),
                updated_at: format_ts(s.updated_at),
                rss_feed_ids: s.rss_feed_ids,
                article_ids: s.article_ids,
            })
            .collect(),
    }))
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

// ============ POST /chat_sessions/{id}/chat ============

#[derive(Deserialize)]
struct ChatTurnRequest {
    message: String,
}

#[derive(Serialize)]
struct ChatTurnResponse {
    response: String,
}

async fn handle_session_chat(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatTurnRequest>,
) -> Result<Json<ChatTurnResponse>, AppError> {
    check_limit(&state.limits.chat, &addr)?;

    let session_id = validate_uuid(&session_id)?;
    if req.message.trim().is_empty() {
        return Err(Error::validation("message must not be empty").into());
    }

    let response = state
        .orchestrator
        .append_turn(&session_id, req.message.trim())
        .await?;

    Ok(Json(ChatTurnResponse { response }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
