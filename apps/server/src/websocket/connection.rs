//! Connection identity and socket handles
//!
//! A peer is one logical participant; each of its open WebSockets is
//! represented here by a [`SocketHandle`] feeding that socket's writer task.
//! This module also mints the opaque identifiers handed out on join.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Random bytes behind a connection id
pub const CONNECTION_ID_BYTES: usize = 8;

/// Random bytes behind a resumption token
pub const RESUMPTION_TOKEN_BYTES: usize = 16;

/// Random bytes behind a generated session id
pub const SESSION_ID_BYTES: usize = 16;

/// Draw `byte_len` bytes from the OS CSPRNG, URL-safe base64 without padding
pub fn random_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Stable identifier of a peer, kept across resumes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(random_token(CONNECTION_ID_BYTES))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer secret that lets a new socket reattach to an existing peer
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumptionToken(String);

impl ResumptionToken {
    pub fn generate() -> Self {
        Self(random_token(RESUMPTION_TOKEN_BYTES))
    }

    /// Constant-time comparison against a presented token
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected
            .iter()
            .zip(presented)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ResumptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResumptionToken(<redacted>)")
    }
}

/// Process-unique socket identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

/// Handle for sending encoded frames to one WebSocket
#[derive(Debug)]
pub struct SocketHandle {
    id: SocketId,

    /// Channel drained by the socket's writer task
    sender: mpsc::UnboundedSender<Bytes>,
}

impl SocketHandle {
    pub fn new(sender: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id: SocketId::next(),
            sender,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Queue a frame; never waits on the network
    pub fn send(&self, frame: Bytes) -> Result<(), SendError> {
        self.sender
            .send(frame)
            .map_err(|_| SendError::ConnectionClosed(self.id))
    }

    /// Check if the writer task is still draining this handle
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Error type for send operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("peer not found")]
    PeerNotFound,

    #[error("socket not found")]
    SocketNotFound,

    #[error("connection closed: {0}")]
    ConnectionClosed(SocketId),
}
