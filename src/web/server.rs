//! HTTP server for the institution catalog
//!
//! # Routes
//!
//! - `GET /api/instituciones` - All records (served from the cache when fresh)
//! - `POST /api/instituciones` - Create a record and invalidate the cache
//! - `GET /api/cache/stats` - Cache statistics
//! - `GET /metrics` - Prometheus exposition
//! - `GET /health` - Liveness
//!
//! Failures of either catalog route are reported with the same 500 body
//! regardless of cause; the cause is only logged.
//!
//! # Example
//!
//! ```no_run
//! use institution_catalog::catalog::{Catalog, CatalogConfig};
//! use institution_catalog::storage::{SqliteStore, StoreConfig};
//! use institution_catalog::web::CatalogServer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> institution_catalog::Result<()> {
//!     let store = SqliteStore::open(StoreConfig::new("institutions.db"))?;
//!     let catalog = Catalog::new(Arc::new(store), CatalogConfig::default());
//!
//!     CatalogServer::new(catalog).run("127.0.0.1:3000").await
//! }
//! ```

use crate::catalog::Catalog;
use crate::error::ServiceError;
use crate::{metrics, CatalogError, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use institutions::NewInstitution;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Body of every failed `GET /api/instituciones`
pub const LIST_FAILED_MESSAGE: &str = "Error al obtener las instituciones";

/// Body of every failed `POST /api/instituciones`
pub const CREATE_FAILED_MESSAGE: &str = "Error al crear la institución";

const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Shared server state
struct AppState {
    catalog: Catalog,
}

/// HTTP server in front of a [`Catalog`]
pub struct CatalogServer {
    state: Arc<AppState>,
    max_body_bytes: usize,
    cors: bool,
}

impl CatalogServer {
    /// Server with permissive CORS and a 100 KiB body limit
    pub fn new(catalog: Catalog) -> Self {
        Self {
            state: Arc::new(AppState { catalog }),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: true,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health))
            .route(
                "/api/instituciones",
                get(list_institutions).post(create_institution),
            )
            .route("/api/cache/stats", get(cache_stats))
            .route("/metrics", get(prometheus_metrics))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .layer(TraceLayer::new_for_http());

        let router = if self.cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        };

        router.with_state(self.state.clone())
    }

    /// Bind `addr` and serve until Ctrl-C
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CatalogError::Server(format!("Failed to bind {}: {}", addr, e)))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let config = self.state.catalog.config();

        tracing::info!(
            addr = %local_addr,
            ttl_ms = config.ttl.as_millis() as u64,
            store_timeout_ms = config.store_timeout.as_millis() as u64,
            max_body_bytes = self.max_body_bytes,
            cors = self.cors,
            "Catalog server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Catalog server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Uniform 500 response; the cause is logged, never sent
fn failure(message: &str, err: &ServiceError) -> Response {
    tracing::error!(kind = err.kind(), error = %err, "{}", message);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_institutions(State(state): State<Arc<AppState>>) -> Response {
    match state.catalog.list().await {
        Ok(snapshot) => Json(snapshot.as_slice()).into_response(),
        Err(err) => failure(LIST_FAILED_MESSAGE, &err),
    }
}

async fn create_institution(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match json_body(&headers, &body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let draft = match NewInstitution::from_json(body) {
        Ok(draft) => draft,
        Err(e) => return failure(CREATE_FAILED_MESSAGE, &ServiceError::from(e)),
    };

    match state.catalog.create(draft).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => failure(CREATE_FAILED_MESSAGE, &err),
    }
}

/// Decode a request body the way a JSON body parser does.
///
/// Requests that do not declare a JSON content type, and empty JSON bodies,
/// decode as an empty object. A declared JSON body that fails to parse is a
/// 400.
fn json_body(headers: &HeaderMap, body: &[u8]) -> std::result::Result<Value, Response> {
    if !has_json_content_type(headers) || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }

    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(error = %e, "Rejecting malformed JSON body");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                message: format!("Invalid JSON body: {}", e),
            }),
        )
            .into_response()
    })
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.catalog.stats())
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    metrics::set_cached_records(state.catalog.stats().cached_records);

    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
