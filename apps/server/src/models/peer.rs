//! Peers: one human participant and the sockets currently attached to it

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::websocket::connection::{ConnectionId, ResumptionToken, SocketHandle, SocketId};

/// Public view of a peer, as shared with other participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub connection_id: ConnectionId,
    pub nickname: String,
    pub display_color: String,
}

/// Why a peer left the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropReason {
    Disconnect,
    Timeout,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Disconnect => "disconnect",
            DropReason::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a peer sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLiveness {
    /// At least one socket attached
    Active,
    /// No sockets, keepalive still within the timeout window
    Orphaned,
    /// No sockets and the keepalive is stale; due for eviction
    Evicted,
}

/// Server-side record of a participant
#[derive(Debug)]
pub struct Peer {
    connection_id: ConnectionId,
    nickname: String,
    display_color: String,
    resumption_token: ResumptionToken,
    sockets: BTreeMap<SocketId, SocketHandle>,
    last_keepalive: DateTime<Utc>,
}

impl Peer {
    /// A brand-new peer with freshly generated identity
    pub fn new(
        nickname: impl Into<String>,
        display_color: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id: ConnectionId::generate(),
            nickname: nickname.into(),
            display_color: display_color.into(),
            resumption_token: ResumptionToken::generate(),
            sockets: BTreeMap::new(),
            last_keepalive: now,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn display_color(&self) -> &str {
        &self.display_color
    }

    pub fn resumption_token(&self) -> &ResumptionToken {
        &self.resumption_token
    }

    pub fn last_keepalive(&self) -> DateTime<Utc> {
        self.last_keepalive
    }

    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            connection_id: self.connection_id.clone(),
            nickname: self.nickname.clone(),
            display_color: self.display_color.clone(),
        }
    }

    /// Record inbound traffic
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_keepalive {
            self.last_keepalive = now;
        }
    }

    /// Attach a socket and return the new socket count
    pub fn attach_socket(&mut self, handle: SocketHandle) -> usize {
        self.sockets.insert(handle.id(), handle);
        self.sockets.len()
    }

    pub fn detach_socket(&mut self, socket_id: SocketId) -> bool {
        self.sockets.remove(&socket_id).is_some()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn has_socket(&self, socket_id: SocketId) -> bool {
        self.sockets.contains_key(&socket_id)
    }

    /// Hand `frame` to every socket; sockets that refuse it are detached
    ///
    /// Returns the number of sockets that accepted the frame.
    pub fn send_all(&mut self, frame: &Bytes) -> usize {
        let mut delivered = 0;
        self.sockets.retain(|socket_id, handle| match handle.send(frame.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.connection_id,
                    socket_id = %socket_id,
                    error = %e,
                    "Detaching socket after failed send"
                );
                false
            }
        });
        delivered
    }

    /// Hand `frame` to a single socket, detaching it on failure
    pub fn send_to(&mut self, socket_id: SocketId, frame: Bytes) -> bool {
        let Some(handle) = self.sockets.get(&socket_id) else {
            return false;
        };
        if handle.send(frame).is_ok() {
            return true;
        }
        self.sockets.remove(&socket_id);
        false
    }

    /// Drop handles whose writer task has already finished
    pub fn prune_closed_sockets(&mut self) -> usize {
        let before = self.sockets.len();
        self.sockets.retain(|_, handle| handle.is_alive());
        before - self.sockets.len()
    }

    pub fn liveness(&self, now: DateTime<Utc>, timeout: Duration) -> PeerLiveness {
        if !self.sockets.is_empty() {
            PeerLiveness::Active
        } else if now - self.last_keepalive > timeout {
            PeerLiveness::Evicted
        } else {
            PeerLiveness::Orphaned
        }
    }
}
