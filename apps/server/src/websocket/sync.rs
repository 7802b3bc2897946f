//! Per-socket packet dispatch
//!
//! A [`SyncHandler`] is bound to one socket of one peer. It refreshes the
//! peer's keepalive on every inbound frame, decodes and validates the frame,
//! then routes the packet to the owning session.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::codec::{self, ProtocolError};
use super::connection::{ConnectionId, SendError, SocketId};
use super::messages::ClientPacket;
use crate::services::WatchSession;

/// What the socket loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// The socket left the session and should be closed
    Leave,
}

/// Handles packets for a single socket
pub struct SyncHandler {
    session: Arc<WatchSession>,
    connection_id: ConnectionId,
    socket_id: SocketId,
}

impl SyncHandler {
    pub fn new(session: Arc<WatchSession>, connection_id: ConnectionId, socket_id: SocketId) -> Self {
        Self {
            session,
            connection_id,
            socket_id,
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    pub fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    /// Send the handshake and chat history to this socket
    pub fn greet(&self, now: DateTime<Utc>) -> Result<(), SyncError> {
        Ok(self.session.greet(&self.connection_id, self.socket_id, now)?)
    }

    /// Handle one binary frame
    ///
    /// A frame that fails decoding or validation is rejected whole and
    /// nothing is applied; the caller keeps the socket open.
    pub fn handle_frame(&self, frame: &[u8], now: DateTime<Utc>) -> Result<FrameOutcome, SyncError> {
        if !self.session.touch(&self.connection_id, now) {
            return Err(SyncError::PeerGone);
        }
        let packet = codec::decode_client_packet(frame)?;
        tracing::trace!(
            connection_id = %self.connection_id,
            packet = packet.kind(),
            "Received packet"
        );
        self.handle_packet(packet, now)
    }

    pub fn handle_packet(
        &self,
        packet: ClientPacket,
        now: DateTime<Utc>,
    ) -> Result<FrameOutcome, SyncError> {
        let from = Some(self.connection_id.clone());
        match packet {
            ClientPacket::LeaveSession => {
                let outcome = self.session.leave(&self.connection_id, self.socket_id);
                tracing::debug!(
                    session_id = %self.session.id(),
                    connection_id = %self.connection_id,
                    socket_id = %self.socket_id,
                    outcome = ?outcome,
                    "Leave requested"
                );
                return Ok(FrameOutcome::Leave);
            }
            ClientPacket::RequestPeerList => {
                self.session
                    .send_peer_list(&self.connection_id, self.socket_id)?;
            }
            ClientPacket::RequestPlayheadSync => {
                self.session
                    .send_playhead_sync(&self.connection_id, self.socket_id, now)?;
            }
            ClientPacket::ChangePlayhead { playhead, paused } => {
                self.session.change_playhead(playhead, paused, from, now);
            }
            ClientPacket::ReportPlayhead { playhead, paused } => {
                self.session
                    .report_playhead(playhead, paused, self.connection_id.clone());
            }
            ClientPacket::ChatMessage { text, facets } => {
                self.session.post_chat(text, facets, &self.connection_id);
            }
            ClientPacket::AppendToPlaylist { item } => {
                self.session.append_to_playlist(item, &self.connection_id);
            }
            ClientPacket::RemoveFromPlaylist {
                url,
                playlist_index,
            } => {
                self.session
                    .remove_from_playlist(playlist_index, &url, from);
            }
            ClientPacket::ChangePlaylistIndex { playlist_index } => {
                self.session.change_playlist_index(playlist_index, from);
            }
            ClientPacket::EditPlaylistItem {
                playlist_index,
                item,
            } => {
                self.session.edit_playlist_item(playlist_index, item, from);
            }
        }
        Ok(FrameOutcome::Continue)
    }

    /// Refresh the keepalive for frames that carry no packet
    pub fn touch(&self, now: DateTime<Utc>) -> bool {
        self.session.touch(&self.connection_id, now)
    }

    /// Detach this socket; the peer itself stays until it leaves or times out
    pub fn disconnect(&self) -> bool {
        self.session.detach_socket(&self.connection_id, self.socket_id)
    }

    /// Whether the peer is still registered in the session
    pub fn peer_present(&self) -> bool {
        self.session.socket_count(&self.connection_id).is_some()
    }
}

/// Errors that can occur while handling a socket's frames
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("peer is no longer part of the session")]
    PeerGone,

    #[error("send failed: {0}")]
    Send(#[from] SendError),
}

impl SyncError {
    /// Protocol errors drop the frame; everything else ends the socket
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Peer, Playhead, PlaylistItem};
    use crate::websocket::connection::SocketHandle;
    use crate::websocket::messages::ServerPacket;
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn setup() -> (SyncHandler, mpsc::UnboundedReceiver<Bytes>) {
        let session = Arc::new(WatchSession::new("s", vec![PlaylistItem::new("a.mp4")], 50));
        let connection_id = session.add_peer(Peer::new("alice", "#f00", Utc::now()));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SocketHandle::new(tx);
        let socket_id = handle.id();
        session
            .attach_socket(&connection_id, handle, Utc::now())
            .unwrap();
        (SyncHandler::new(session, connection_id, socket_id), rx)
    }

    fn next_packet(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> ServerPacket {
        codec::decode(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn test_greet_order() {
        let (handler, mut rx) = setup();
        handler.greet(Utc::now()).unwrap();
        assert_matches!(next_packet(&mut rx), ServerPacket::Handshake(_));
        assert_matches!(next_packet(&mut rx), ServerPacket::ChatHistory { .. });
    }

    #[test]
    fn test_change_playhead_frame() {
        let (handler, mut rx) = setup();
        let frame = codec::encode(&ClientPacket::ChangePlayhead {
            playhead: Playhead::new(5000.0).unwrap(),
            paused: false,
        })
        .unwrap();

        let outcome = handler.handle_frame(&frame, Utc::now()).unwrap();
        assert_eq!(outcome, FrameOutcome::Continue);
        assert_matches!(
            next_packet(&mut rx),
            ServerPacket::ChangePlayhead { from: Some(from), paused: false, .. } if &from == handler.connection_id()
        );
    }

    #[test]
    fn test_invalid_frame_changes_nothing() {
        let (handler, mut rx) = setup();
        let frame = codec::encode(&ClientPacket::AppendToPlaylist {
            item: PlaylistItem::new(""),
        })
        .unwrap();

        let err = handler.handle_frame(&frame, Utc::now()).unwrap_err();
        assert_matches!(err, SyncError::Protocol(ProtocolError::Invalid(_)));
        assert!(!err.is_fatal());
        assert!(rx.try_recv().is_err());

        let err = handler.handle_frame(b"not msgpack", Utc::now()).unwrap_err();
        assert_matches!(err, SyncError::Protocol(_));
    }

    #[test]
    fn test_leave_on_only_socket_drops_peer() {
        let (handler, _rx) = setup();
        let frame = codec::encode(&ClientPacket::LeaveSession).unwrap();
        assert_eq!(
            handler.handle_frame(&frame, Utc::now()).unwrap(),
            FrameOutcome::Leave
        );
        assert!(!handler.peer_present());

        let err = handler.handle_frame(&frame, Utc::now()).unwrap_err();
        assert_matches!(err, SyncError::PeerGone);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_chat_frame_wire_shape() {
        let (handler, mut rx) = setup();
        let frame = codec::encode(&ClientPacket::ChatMessage {
            text: "hi".into(),
            facets: vec![],
        })
        .unwrap();
        handler.handle_frame(&frame, Utc::now()).unwrap();

        let raw: serde_json::Value = rmp_serde::from_slice(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({
                "type": "ChatMessage",
                "text": "hi",
                "facets": [],
                "from": handler.connection_id().as_str(),
            })
        );

        handler.greet(Utc::now()).unwrap();
        rx.try_recv().unwrap();
        let history: serde_json::Value = rmp_serde::from_slice(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(history["messages"][0]["text"], "joined");
        assert_eq!(history["messages"][0]["from"]["nickname"], "alice");
        assert_eq!(history["messages"][1]["text"], "hi");
    }

    #[test]
    fn test_playhead_sync_has_no_origin() {
        let (handler, mut rx) = setup();
        handler
            .handle_packet(ClientPacket::RequestPlayheadSync, Utc::now())
            .unwrap();
        assert_matches!(
            next_packet(&mut rx),
            ServerPacket::ChangePlayhead { from: None, paused: true, .. }
        );
    }

    #[test]
    fn test_disconnect_keeps_peer() {
        let (handler, _rx) = setup();
        assert!(handler.disconnect());
        assert!(handler.peer_present());
        assert!(!handler.disconnect());
    }
}
