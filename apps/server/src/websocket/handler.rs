//! Connect endpoint: resolves identity, then upgrades to a WebSocket
//!
//! Identity is settled before the upgrade. An unknown session is a 404, a
//! resumption token that matches nobody is a 403, and a new peer without a
//! nickname or colour is a 400. None of these create any socket state.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::connection::{ConnectionId, SocketHandle};
use super::sync::{FrameOutcome, SyncHandler};
use crate::error::{ApiError, ApiResult};
use crate::models::Peer;
use crate::services::{SessionRegistry, WatchSession};

/// Query parameters for the connect endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Display name for a new peer
    #[serde(default)]
    pub nickname: Option<String>,

    /// Display colour for a new peer
    #[serde(default)]
    pub color: Option<String>,

    /// Resumption token of an existing peer
    #[serde(default)]
    pub resume: Option<String>,
}

/// Who the socket will belong to
#[derive(Debug)]
enum Identity {
    Resumed(ConnectionId),
    New { nickname: String, color: String },
}

fn required(value: Option<String>, field: &'static str) -> ApiResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ApiError::MissingField(field)),
    }
}

fn resolve_identity(session: &WatchSession, params: ConnectParams) -> ApiResult<Identity> {
    if let Some(token) = params.resume {
        return session
            .resolve_resumption(&token)
            .map(Identity::Resumed)
            .ok_or_else(|| ApiError::Forbidden("unknown resumption token".to_string()));
    }
    Ok(Identity::New {
        nickname: required(params.nickname, "nickname")?,
        color: required(params.color, "color")?,
    })
}

/// `GET /api/session/:id/connect`
pub async fn connect_handler(
    State(registry): State<SessionRegistry>,
    Path(session_id): Path<String>,
    Query(params): Query<ConnectParams>,
    ws: Option<WebSocketUpgrade>,
) -> ApiResult<Response> {
    let session = registry
        .get(&session_id)
        .ok_or_else(|| ApiError::not_found("session", &session_id))?;

    let identity = resolve_identity(&session, params)?;
    let ws = ws.ok_or(ApiError::UpgradeRequired)?;

    let connection_id = match identity {
        Identity::Resumed(connection_id) => {
            tracing::info!(
                session_id = %session.id(),
                connection_id = %connection_id,
                "Peer resuming"
            );
            connection_id
        }
        Identity::New { nickname, color } => {
            session.add_peer(Peer::new(nickname, color, Utc::now()))
        }
    };

    let send_timeout = registry.settings().send_timeout();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session, connection_id, send_timeout)))
}

/// Drive one established socket until it closes or leaves
pub async fn handle_socket(
    socket: WebSocket,
    session: Arc<WatchSession>,
    connection_id: ConnectionId,
    send_timeout: Duration,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let handle = SocketHandle::new(tx);
    let socket_id = handle.id();

    let sockets = match session.attach_socket(&connection_id, handle, Utc::now()) {
        Ok(sockets) => sockets,
        Err(e) => {
            // Evicted between the HTTP request and the upgrade.
            tracing::warn!(
                session_id = %session.id(),
                connection_id = %connection_id,
                error = %e,
                "Socket attach failed"
            );
            return;
        }
    };

    let handler = SyncHandler::new(Arc::clone(&session), connection_id.clone(), socket_id);
    if let Err(e) = handler.greet(Utc::now()) {
        tracing::warn!(
            connection_id = %connection_id,
            socket_id = %socket_id,
            error = %e,
            "Failed to greet socket"
        );
        handler.disconnect();
        return;
    }

    tracing::info!(
        session_id = %session.id(),
        connection_id = %connection_id,
        socket_id = %socket_id,
        sockets,
        "Socket attached"
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: drains the handle until every sender is gone or a send stalls.
    let writer_connection_id = connection_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let send = ws_sender.send(Message::Binary(frame.to_vec()));
            match tokio::time::timeout(send_timeout, send).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(
                        connection_id = %writer_connection_id,
                        socket_id = %socket_id,
                        error = %e,
                        "WebSocket send failed"
                    );
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        connection_id = %writer_connection_id,
                        socket_id = %socket_id,
                        timeout_ms = send_timeout.as_millis() as u64,
                        "WebSocket send timed out"
                    );
                    break;
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    // Reader: frames from one socket are handled in order.
    let reader_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Binary(frame)) => match handler.handle_frame(&frame, Utc::now()) {
                    Ok(FrameOutcome::Continue) => {}
                    Ok(FrameOutcome::Leave) => break,
                    Err(e) if e.is_fatal() => {
                        tracing::debug!(
                            connection_id = %reader_connection_id,
                            error = %e,
                            "Closing socket"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            connection_id = %reader_connection_id,
                            error = %e,
                            "Dropping invalid frame"
                        );
                    }
                },
                Ok(Message::Text(_)) => {
                    handler.touch(Utc::now());
                    tracing::warn!(
                        connection_id = %reader_connection_id,
                        "Dropping text frame; the protocol is binary"
                    );
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    handler.touch(Utc::now());
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %reader_connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        connection_id = %reader_connection_id,
                        error = %e,
                        "WebSocket error"
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            // Dropping the handle lets the writer flush and close.
            session.detach_socket(&connection_id, socket_id);
            if tokio::time::timeout(send_timeout, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    session.detach_socket(&connection_id, socket_id);

    tracing::info!(
        session_id = %session.id(),
        connection_id = %connection_id,
        socket_id = %socket_id,
        "Socket closed"
    );
}
