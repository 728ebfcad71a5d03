//! Proxy HTTP API.
//!
//! Every request that does not hit a service route is resolved against the
//! upstream origin and answered through the fetch handler, so the caching
//! policy applies to the whole origin. Service routes:
//! - GET /health
//! - GET /cache/stats

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::http::{RequestKey, StoredResponse};
use crate::lifecycle::controller::{LifecycleController, ServeError, ServeStatsSnapshot};
use crate::lifecycle::state::GenerationPhase;

/// Header a client sends to identify itself across requests.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Application state shared across handlers.
pub struct AppState {
    pub controller: Arc<LifecycleController>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cache/stats", get(cache_stats))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Response Types ────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub generation: String,
    pub phase: GenerationPhase,
    pub clients: usize,
}

/// Cache statistics response.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub serve: ServeStatsSnapshot,
    pub generations: Vec<GenerationEntries>,
}

#[derive(Debug, Serialize)]
pub struct GenerationEntries {
    pub name: String,
    pub entries: usize,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn proxy(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.config.resolve(path);
    let key = RequestKey::new(method.as_str(), url);

    let client = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok());

    match state.controller.handle_fetch(client, &key).await {
        Ok(stored) => stored_to_response(&stored),
        Err(e) => {
            warn!(key = %key, error = %e, "Proxied request failed");
            let status = match e {
                // No cache entry and no network: the request fails rather
                // than producing a fabricated body.
                ServeError::Network(_) => StatusCode::BAD_GATEWAY,
                ServeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            status.into_response()
        }
    }
}

/// Convert a stored snapshot into an outgoing response.
fn stored_to_response(stored: &StoredResponse) -> Response {
    let mut builder = Response::builder().status(stored.status);
    for (name, value) in &stored.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(stored.body.clone()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Headers that describe the original connection, not the payload; they are
/// recomputed for our own connection instead of being replayed.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        generation: state.controller.generation().to_string(),
        phase: state.controller.phase().await,
        clients: state.controller.clients().len().await,
    })
}

async fn cache_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CacheStatsResponse>, StatusCode> {
    let generations = state
        .controller
        .generation_entry_counts()
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to enumerate generations for stats");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .into_iter()
        .map(|(name, entries)| GenerationEntries { name, entries })
        .collect();

    Ok(Json(CacheStatsResponse {
        serve: state.controller.stats(),
        generations,
    }))
}
