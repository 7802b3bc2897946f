//! Shared helpers for the server integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tower::ServiceExt;

use watchparty_server::services::SessionRegistry;
use watchparty_server::websocket::{
    codec, ConnectionId, ServerPacket, SocketHandle, SocketId, SyncHandler,
};
use watchparty_server::WatchSession;
use watchparty_shared_config::SyncConfig;

pub fn registry() -> SessionRegistry {
    SessionRegistry::new(SyncConfig::default())
}

pub fn app(registry: &SessionRegistry) -> Router {
    watchparty_server::router(registry.clone())
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// A socket stood in for by the receiving end of its handle's channel
pub struct TestSocket {
    pub handler: SyncHandler,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl TestSocket {
    /// Attach a new socket to `connection_id` and greet it, as the
    /// connect endpoint does after an upgrade
    pub fn attach(session: &Arc<WatchSession>, connection_id: &ConnectionId, now: DateTime<Utc>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(tx);
        let socket_id = handle.id();
        session.attach_socket(connection_id, handle, now).unwrap();
        let handler = SyncHandler::new(Arc::clone(session), connection_id.clone(), socket_id);
        handler.greet(now).unwrap();
        Self { handler, rx }
    }

    pub fn socket_id(&self) -> SocketId {
        self.handler.socket_id()
    }

    /// Drain every frame queued so far
    pub fn packets(&mut self) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            packets.push(codec::decode(&frame).unwrap());
        }
        packets
    }

    /// Simulate the socket closing
    pub fn close(self) {
        self.handler.disconnect();
    }
}
