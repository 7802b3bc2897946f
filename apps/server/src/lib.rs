//! Watch-party session synchronization server
//!
//! Keeps every participant of a session on the same video, at the same
//! playhead, with a shared playlist and chat. Peers join over HTTP, then
//! exchange MessagePack packets over one or more WebSockets.

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod routes;
pub mod services;
pub mod validation;
pub mod websocket;

use axum::{routing::get, Router};

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use services::{SessionRegistry, WatchSession};

use routes::{health_router, session_router};

/// Build the application router without transport layers
pub fn router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/", get(root))
        // Nested health routes: /health, /health/live, /health/ready
        .nest("/health", health_router(registry.clone()))
        // Session routes: /api/session, /api/session/:session_id/connect
        .nest("/api", session_router(registry))
}

async fn root() -> &'static str {
    "Watch party sync server"
}
