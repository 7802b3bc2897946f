//! Session HTTP route handlers
//!
//! - `PUT /api/session` - Create a session
//! - `GET /api/session/:session_id/connect` - Join or resume over WebSocket

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::models::PlaylistItem;
use crate::services::{SessionInfo, SessionRegistry};
use crate::websocket::connect_handler;

/// Body of `PUT /api/session`; an empty body means all defaults
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Preferred id; replaced by a random one when taken
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub playlist: Vec<PlaylistItem>,
}

impl CreateSessionRequest {
    fn from_body(body: &[u8]) -> ApiResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
    }
}

/// Create session router
pub fn session_router(registry: SessionRegistry) -> Router {
    Router::new()
        .route("/session", put(create_session))
        .route("/session/:session_id/connect", get(connect_handler))
        .with_state(registry)
}

async fn create_session(
    State(registry): State<SessionRegistry>,
    body: Bytes,
) -> ApiResult<Json<SessionInfo>> {
    let request = CreateSessionRequest::from_body(&body)?;
    let session = registry.create_session(request.id, request.playlist)?;
    Ok(Json(session.info(Utc::now())))
}
