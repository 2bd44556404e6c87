//! Read-only JSON HTTP API over the FAQ knowledge base.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/faqs` | All stored FAQ records |
//! | `POST` | `/search` | Similarity search: `{ "query": "...", "top_k": 3 }` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `search_failed` (502), `internal` (500).
//!
//! The FAQ store is re-read on every `/faqs` request, so records appended by
//! a separately running `faqh run` show up without a restart.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::models::FaqRecord;
use crate::search::search_faqs;
use crate::store::FaqStore;
use crate::vector::{self, SearchHit, VectorGateway};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    store_path: PathBuf,
    gateway: Arc<dyn VectorGateway>,
    default_top_k: usize,
}

/// Starts the HTTP API on `[server].bind`, using the configured vector
/// gateway. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let gateway: Arc<dyn VectorGateway> = Arc::from(vector::create_gateway(config)?);
    run_server_with_gateway(
        &config.server.bind,
        config.data.faq_store_path(),
        gateway,
        config.vector.top_k,
    )
    .await
}

/// Starts the HTTP API with an explicit gateway.
///
/// Used by [`run_server`] and by tests that substitute an in-process index.
pub async fn run_server_with_gateway(
    bind_addr: &str,
    store_path: PathBuf,
    gateway: Arc<dyn VectorGateway>,
    default_top_k: usize,
) -> anyhow::Result<()> {
    let state = AppState {
        store_path,
        gateway,
        default_top_k,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/faqs", get(handle_list_faqs))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state);

    info!(bind = %bind_addr, "HTTP API listening");
    println!("FAQ API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// The vector gateway (or its embedder) failed upstream.
fn search_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "search_failed".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
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

// ============ GET /faqs ============

#[derive(Serialize)]
struct FaqListResponse {
    faqs: Vec<FaqRecord>,
}

async fn handle_list_faqs(
    State(state): State<AppState>,
) -> Result<Json<FaqListResponse>, AppError> {
    let store = FaqStore::open(state.store_path.clone()).map_err(|e| {
        warn!(error = %e, "failed to read FAQ store");
        internal(e.to_string())
    })?;
    Ok(Json(FaqListResponse {
        faqs: store.records().to_vec(),
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    if top_k == 0 {
        return Err(bad_request("top_k must be > 0"));
    }

    let results = search_faqs(state.gateway.as_ref(), &req.query, top_k)
        .await
        .map_err(|e| {
            warn!(error = %format!("{e:#}"), "search failed");
            search_failed(format!("{e:#}"))
        })?;

    Ok(Json(SearchResponse { results }))
}
