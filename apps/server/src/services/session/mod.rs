//! A single watch-party session
//!
//! [`WatchSession`] owns the playlist, the playback clock, chat history and
//! the peers with their sockets, all behind one lock. Every mutation runs
//! under that lock and ends by publishing an event on the session bus; the
//! default listeners record history and fan the matching packet out to every
//! socket of every peer.

pub mod events;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::events::EventBus;
use crate::models::{
    ChatEntry, ChatFacet, ChatLog, DropReason, Peer, PeerLiveness, PeerSummary, PlaybackClock,
    Playhead, Playlist, PlaylistItem,
};
use crate::websocket::codec;
use crate::websocket::connection::{ConnectionId, SendError, SocketHandle, SocketId};
use crate::websocket::messages::{Handshake, ServerPacket};

use self::events::{
    ChatPosted, PeerJoined, PeerLeft, PlayheadChanged, PlayheadReported, PlaylistChanged,
};

/// Mutable state of a session, handed to event listeners during dispatch
#[derive(Debug)]
pub struct SessionState {
    playlist: Playlist,
    clock: PlaybackClock,
    chat: ChatLog,
    /// Join order
    peers: Vec<Peer>,
}

impl SessionState {
    fn new(playlist: Playlist, chat_history_limit: usize) -> Self {
        Self {
            playlist,
            clock: PlaybackClock::new(),
            chat: ChatLog::new(chat_history_limit),
            peers: Vec::new(),
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    fn peer(&self, connection_id: &ConnectionId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.connection_id() == connection_id)
    }

    fn peer_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut Peer> {
        self.peers
            .iter_mut()
            .find(|p| p.connection_id() == connection_id)
    }

    /// Encode once and hand the frame to every socket of every peer
    ///
    /// Returns the number of sockets that accepted the frame.
    pub fn broadcast(&mut self, packet: &ServerPacket) -> usize {
        match encode_packet(packet) {
            Some(frame) => self.peers.iter_mut().map(|p| p.send_all(&frame)).sum(),
            None => 0,
        }
    }

    /// Like [`broadcast`](Self::broadcast), skipping one peer
    pub fn broadcast_except(&mut self, packet: &ServerPacket, skip: &ConnectionId) -> usize {
        match encode_packet(packet) {
            Some(frame) => self
                .peers
                .iter_mut()
                .filter(|p| p.connection_id() != skip)
                .map(|p| p.send_all(&frame))
                .sum(),
            None => 0,
        }
    }

    fn send_to(
        &mut self,
        connection_id: &ConnectionId,
        socket_id: SocketId,
        packet: &ServerPacket,
    ) -> Result<(), SendError> {
        let peer = self
            .peer_mut(connection_id)
            .ok_or(SendError::PeerNotFound)?;
        if !peer.has_socket(socket_id) {
            return Err(SendError::SocketNotFound);
        }
        let Some(frame) = encode_packet(packet) else {
            return Ok(());
        };
        if peer.send_to(socket_id, frame) {
            Ok(())
        } else {
            Err(SendError::ConnectionClosed(socket_id))
        }
    }
}

fn encode_packet(packet: &ServerPacket) -> Option<Bytes> {
    match codec::encode(packet) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server packet");
            None
        }
    }
}

/// Public snapshot returned when a session is created
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub playlist: Vec<PlaylistItem>,
    pub playlist_index: i64,
    pub playhead: Playhead,
    pub paused: bool,
}

/// How a `LeaveSession` request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Sent on the peer's last socket; the peer is gone
    PeerDropped,
    /// The peer keeps its other sockets; only this one leaves
    SocketDetached,
    /// Peer or socket was already gone
    Unknown,
}

pub struct WatchSession {
    id: String,
    state: Mutex<SessionState>,
    events: EventBus<SessionState>,
}

impl WatchSession {
    pub fn new(id: impl Into<String>, playlist: Vec<PlaylistItem>, chat_history_limit: usize) -> Self {
        let id = id.into();
        let events = EventBus::new();
        events::install_default_listeners(&events, &id);
        Self {
            state: Mutex::new(SessionState::new(Playlist::new(playlist), chat_history_limit)),
            events,
            id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session bus, for listeners beyond the defaults
    ///
    /// Listeners run with the session lock held and must not call back into
    /// the session.
    pub fn events(&self) -> &EventBus<SessionState> {
        &self.events
    }

    pub fn info(&self, now: DateTime<Utc>) -> SessionInfo {
        let state = self.state.lock();
        SessionInfo {
            id: self.id.clone(),
            playlist: state.playlist.items().to_vec(),
            playlist_index: state.playlist.wire_index(),
            playhead: state.clock.current_position(now),
            paused: state.clock.paused(),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    pub fn peer_list(&self) -> Vec<PeerSummary> {
        self.state.lock().peers.iter().map(Peer::summary).collect()
    }

    pub fn chat_history(&self) -> Vec<ChatEntry> {
        self.state.lock().chat.snapshot()
    }

    pub fn socket_count(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.state.lock().peer(connection_id).map(Peer::socket_count)
    }

    /// Register a new peer and announce it to everybody else
    pub fn add_peer(&self, peer: Peer) -> ConnectionId {
        let summary = peer.summary();
        let connection_id = summary.connection_id.clone();
        let mut state = self.state.lock();
        state.peers.push(peer);
        self.events.publish(&mut *state, PeerJoined { peer: summary });
        connection_id
    }

    /// Find the peer a resumption token belongs to
    ///
    /// Every peer's token is compared so the time taken does not depend on
    /// which peer matched.
    pub fn resolve_resumption(&self, token: &str) -> Option<ConnectionId> {
        let state = self.state.lock();
        let mut found = None;
        for peer in &state.peers {
            if peer.resumption_token().matches(token) && found.is_none() {
                found = Some(peer.connection_id().clone());
            }
        }
        found
    }

    /// Attach a socket to an existing peer; returns the new socket count
    pub fn attach_socket(
        &self,
        connection_id: &ConnectionId,
        handle: SocketHandle,
        now: DateTime<Utc>,
    ) -> Result<usize, SendError> {
        let mut state = self.state.lock();
        let peer = state
            .peer_mut(connection_id)
            .ok_or(SendError::PeerNotFound)?;
        peer.touch(now);
        Ok(peer.attach_socket(handle))
    }

    /// Detach a socket; the peer stays registered even with no sockets left
    pub fn detach_socket(&self, connection_id: &ConnectionId, socket_id: SocketId) -> bool {
        self.state
            .lock()
            .peer_mut(connection_id)
            .map(|peer| peer.detach_socket(socket_id))
            .unwrap_or(false)
    }

    /// Refresh a peer's keepalive; false when the peer is gone
    pub fn touch(&self, connection_id: &ConnectionId, now: DateTime<Utc>) -> bool {
        match self.state.lock().peer_mut(connection_id) {
            Some(peer) => {
                peer.touch(now);
                true
            }
            None => false,
        }
    }

    pub fn handshake(&self, connection_id: &ConnectionId, now: DateTime<Utc>) -> Option<Handshake> {
        let state = self.state.lock();
        let peer = state.peer(connection_id)?;
        Some(Handshake {
            connection_id: peer.connection_id().clone(),
            resumption_token: peer.resumption_token().expose().to_string(),
            session: self.id.clone(),
            playlist: state.playlist.items().to_vec(),
            playlist_index: state.playlist.wire_index(),
            paused: state.clock.paused(),
            playhead: state.clock.current_position(now),
            playhead_timestamp: now.timestamp_millis(),
            nickname: peer.nickname().to_string(),
            display_color: peer.display_color().to_string(),
        })
    }

    /// Send `Handshake` then `ChatHistory` to one freshly attached socket
    pub fn greet(
        &self,
        connection_id: &ConnectionId,
        socket_id: SocketId,
        now: DateTime<Utc>,
    ) -> Result<(), SendError> {
        let handshake = self
            .handshake(connection_id, now)
            .ok_or(SendError::PeerNotFound)?;
        let mut state = self.state.lock();
        state.send_to(connection_id, socket_id, &ServerPacket::Handshake(handshake))?;
        let messages = state.chat.snapshot();
        state.send_to(connection_id, socket_id, &ServerPacket::ChatHistory { messages })
    }

    /// Reply to `RequestPeerList` on the asking socket only
    pub fn send_peer_list(
        &self,
        connection_id: &ConnectionId,
        socket_id: SocketId,
    ) -> Result<(), SendError> {
        let mut state = self.state.lock();
        let peers = state.peers.iter().map(Peer::summary).collect();
        state.send_to(connection_id, socket_id, &ServerPacket::FullPeerList { peers })
    }

    /// Reply to `RequestPlayheadSync` on the asking socket only
    pub fn send_playhead_sync(
        &self,
        connection_id: &ConnectionId,
        socket_id: SocketId,
        now: DateTime<Utc>,
    ) -> Result<(), SendError> {
        let mut state = self.state.lock();
        let packet = ServerPacket::ChangePlayhead {
            playhead: state.clock.current_position(now),
            paused: state.clock.paused(),
            from: None,
        };
        state.send_to(connection_id, socket_id, &packet)
    }

    /// Remove a peer and announce it; false when it was already gone
    pub fn drop_peer(&self, connection_id: &ConnectionId, reason: DropReason) -> bool {
        let mut state = self.state.lock();
        self.drop_peer_locked(&mut state, connection_id, reason)
    }

    fn drop_peer_locked(
        &self,
        state: &mut SessionState,
        connection_id: &ConnectionId,
        reason: DropReason,
    ) -> bool {
        let Some(position) = state
            .peers
            .iter()
            .position(|p| p.connection_id() == connection_id)
        else {
            return false;
        };
        // Dropping the peer drops its socket handles, which ends their writers.
        let peer = state.peers.remove(position);
        self.events.publish(
            state,
            PeerLeft {
                peer: peer.summary(),
                reason,
            },
        );
        true
    }

    /// Handle `LeaveSession` arriving on `socket_id`
    pub fn leave(&self, connection_id: &ConnectionId, socket_id: SocketId) -> LeaveOutcome {
        let mut state = self.state.lock();
        let Some(peer) = state.peer_mut(connection_id) else {
            return LeaveOutcome::Unknown;
        };
        if !peer.has_socket(socket_id) {
            return LeaveOutcome::Unknown;
        }
        if peer.socket_count() > 1 {
            peer.detach_socket(socket_id);
            return LeaveOutcome::SocketDetached;
        }
        self.drop_peer_locked(&mut state, connection_id, DropReason::Disconnect);
        LeaveOutcome::PeerDropped
    }

    /// Override the clock and broadcast the new playhead
    pub fn change_playhead(
        &self,
        playhead: Playhead,
        paused: bool,
        from: Option<ConnectionId>,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock();
        state.clock.apply_override(playhead, paused, now);
        self.events.publish(
            &mut *state,
            PlayheadChanged {
                playhead,
                paused,
                from,
            },
        );
    }

    /// Relay a position report without moving the clock
    pub fn report_playhead(&self, playhead: Playhead, paused: bool, from: ConnectionId) {
        let mut state = self.state.lock();
        self.events.publish(
            &mut *state,
            PlayheadReported {
                playhead,
                paused,
                from,
            },
        );
    }

    pub fn post_chat(&self, text: String, facets: Vec<ChatFacet>, from: &ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(summary) = state.peer(from).map(Peer::summary) else {
            return false;
        };
        self.events.publish(
            &mut *state,
            ChatPosted {
                sender: summary,
                text,
                facets,
            },
        );
        true
    }

    /// Append an item attributed to `from`; the active index is unchanged
    pub fn append_to_playlist(&self, mut item: PlaylistItem, from: &ConnectionId) -> bool {
        let mut state = self.state.lock();
        let Some(summary) = state.peer(from).map(Peer::summary) else {
            return false;
        };
        item.from_peer = Some(summary);
        state.playlist.append(item);
        self.publish_playlist(&mut state, Some(from.clone()));
        true
    }

    /// Remove `playlist[index]` if its video is still `expected_video`
    pub fn remove_from_playlist(
        &self,
        index: usize,
        expected_video: &str,
        from: Option<ConnectionId>,
    ) -> bool {
        let mut state = self.state.lock();
        let Some(removal) = state.playlist.remove(index, expected_video) else {
            tracing::debug!(
                session_id = %self.id,
                index,
                expected_video,
                "Stale playlist removal dropped"
            );
            return false;
        };
        if removal.removed_current {
            state.clock.reset();
        }
        self.publish_playlist(&mut state, from);
        true
    }

    /// Replace mirrors and subtitles of `playlist[index]` when its video
    /// matches `item.video`
    pub fn edit_playlist_item(
        &self,
        index: usize,
        item: PlaylistItem,
        from: Option<ConnectionId>,
    ) -> bool {
        let mut state = self.state.lock();
        if !state.playlist.edit(index, item) {
            tracing::debug!(session_id = %self.id, index, "Stale playlist edit dropped");
            return false;
        }
        self.publish_playlist(&mut state, from);
        true
    }

    /// Jump to another item and restart playback from zero, paused
    pub fn change_playlist_index(&self, index: usize, from: Option<ConnectionId>) -> bool {
        let mut state = self.state.lock();
        if !state.playlist.select(index) {
            tracing::debug!(session_id = %self.id, index, "Out-of-range playlist index ignored");
            return false;
        }
        state.clock.reset();
        self.publish_playlist(&mut state, from);
        true
    }

    fn publish_playlist(&self, state: &mut SessionState, from: Option<ConnectionId>) {
        self.events.publish(state, PlaylistChanged { from });
    }

    /// Prune dead sockets and evict peers orphaned for longer than `timeout`
    ///
    /// Returns the evicted peers.
    pub fn reap(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<ConnectionId> {
        let mut state = self.state.lock();
        for peer in state.peers.iter_mut() {
            peer.prune_closed_sockets();
        }
        let stale: Vec<ConnectionId> = state
            .peers
            .iter()
            .filter(|p| p.liveness(now, timeout) == PeerLiveness::Evicted)
            .map(|p| p.connection_id().clone())
            .collect();
        for connection_id in &stale {
            self.drop_peer_locked(&mut state, connection_id, DropReason::Timeout);
        }
        stale
    }
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("id", &self.id)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
