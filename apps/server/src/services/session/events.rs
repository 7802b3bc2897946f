//! Facts published on a session's event bus and the default listener set

use crate::events::{Event, EventBus};
use crate::models::{ChatEntry, ChatFacet, DropReason, PeerSummary, Playhead};
use crate::websocket::connection::ConnectionId;
use crate::websocket::messages::ServerPacket;

use super::SessionState;

/// Records chat history before anything is sent
pub const HISTORY_PRIORITY: i32 = -10;

/// Encodes and fans out the wire packet
pub const BROADCAST_PRIORITY: i32 = 0;

pub const LOGGING_PRIORITY: i32 = 10;

#[derive(Debug, Clone)]
pub struct PeerJoined {
    pub peer: PeerSummary,
}

#[derive(Debug, Clone)]
pub struct PeerLeft {
    pub peer: PeerSummary,
    pub reason: DropReason,
}

#[derive(Debug, Clone)]
pub struct PlayheadChanged {
    pub playhead: Playhead,
    pub paused: bool,
    pub from: Option<ConnectionId>,
}

#[derive(Debug, Clone)]
pub struct PlayheadReported {
    pub playhead: Playhead,
    pub paused: bool,
    pub from: ConnectionId,
}

/// The playlist or its active index changed; listeners read the new state
#[derive(Debug, Clone)]
pub struct PlaylistChanged {
    pub from: Option<ConnectionId>,
}

#[derive(Debug, Clone)]
pub struct ChatPosted {
    /// Full sender summary for history; the wire packet carries only its id
    pub sender: PeerSummary,
    pub text: String,
    pub facets: Vec<ChatFacet>,
}

impl Event for PeerJoined {}
impl Event for PeerLeft {}
impl Event for PlayheadChanged {}
impl Event for PlayheadReported {}
impl Event for PlaylistChanged {}
impl Event for ChatPosted {}

/// Wire chat history, broadcast and logging onto a fresh session bus
pub fn install_default_listeners(bus: &EventBus<SessionState>, session_id: &str) {
    // History
    bus.subscribe::<PeerJoined, _>(HISTORY_PRIORITY, |state, event| {
        state.chat.push(ChatEntry::joined(event.peer.clone()));
    });
    bus.subscribe::<PeerLeft, _>(HISTORY_PRIORITY, |state, event| {
        state.chat.push(ChatEntry::left(event.peer.clone()));
    });
    bus.subscribe::<ChatPosted, _>(HISTORY_PRIORITY, |state, event| {
        state.chat.push(ChatEntry::message(
            event.sender.clone(),
            event.text.clone(),
            event.facets.clone(),
        ));
    });

    // Broadcast
    bus.subscribe::<PeerJoined, _>(BROADCAST_PRIORITY, |state, event| {
        let packet = ServerPacket::PeerAdded(event.peer.clone());
        state.broadcast_except(&packet, &event.peer.connection_id);
    });
    bus.subscribe::<PeerLeft, _>(BROADCAST_PRIORITY, |state, event| {
        state.broadcast(&ServerPacket::PeerDropped {
            connection_id: event.peer.connection_id.clone(),
            reason: event.reason,
        });
    });
    bus.subscribe::<PlayheadChanged, _>(BROADCAST_PRIORITY, |state, event| {
        state.broadcast(&ServerPacket::ChangePlayhead {
            playhead: event.playhead,
            paused: event.paused,
            from: event.from.clone(),
        });
    });
    bus.subscribe::<PlayheadReported, _>(BROADCAST_PRIORITY, |state, event| {
        state.broadcast(&ServerPacket::ReportPlayhead {
            playhead: event.playhead,
            paused: event.paused,
            from: event.from.clone(),
        });
    });
    bus.subscribe::<PlaylistChanged, _>(BROADCAST_PRIORITY, |state, event| {
        let packet = ServerPacket::PlaylistUpdate {
            playlist: state.playlist.items().to_vec(),
            playlist_index: state.playlist.wire_index(),
            from: event.from.clone(),
        };
        state.broadcast(&packet);
    });
    bus.subscribe::<ChatPosted, _>(BROADCAST_PRIORITY, |state, event| {
        state.broadcast(&ServerPacket::ChatMessage {
            text: event.text.clone(),
            facets: event.facets.clone(),
            from: event.sender.connection_id.clone(),
        });
    });

    // Logging
    let id = session_id.to_string();
    bus.subscribe::<PeerJoined, _>(LOGGING_PRIORITY, move |state, event| {
        tracing::info!(
            session_id = %id,
            connection_id = %event.peer.connection_id,
            nickname = %event.peer.nickname,
            peers = state.peers.len(),
            "Peer joined"
        );
    });
    let id = session_id.to_string();
    bus.subscribe::<PeerLeft, _>(LOGGING_PRIORITY, move |state, event| {
        tracing::info!(
            session_id = %id,
            connection_id = %event.peer.connection_id,
            reason = %event.reason,
            peers = state.peers.len(),
            "Peer left"
        );
    });
    let id = session_id.to_string();
    bus.subscribe::<PlaylistChanged, _>(LOGGING_PRIORITY, move |state, event| {
        tracing::debug!(
            session_id = %id,
            from = ?event.from,
            items = state.playlist.len(),
            index = state.playlist.wire_index(),
            "Playlist changed"
        );
    });
}
