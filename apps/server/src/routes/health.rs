//! Health check HTTP route handlers
//!
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Kubernetes-style liveness probe
//! - `GET /health/ready` - Readiness probe with session counts

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};

use crate::services::SessionRegistry;

/// Create health check router
pub fn health_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .with_state(registry)
}

/// Simple health check - always returns OK if the server is running
async fn simple_health() -> &'static str {
    "OK"
}

/// Liveness probe for Kubernetes
///
/// Returns 200 if the server process is running and can handle requests.
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe
///
/// State is in-process only, so the server is ready as soon as it serves
/// requests. The body reports how many sessions and peers are live.
async fn readiness_probe(State(registry): State<SessionRegistry>) -> impl IntoResponse {
    let sessions = registry.sessions();
    let peers: usize = sessions.iter().map(|session| session.peer_count()).sum();
    Json(serde_json::json!({
        "status": "ready",
        "sessions": sessions.len(),
        "peers": peers,
    }))
}
