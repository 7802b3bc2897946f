//! Packet types for the session sync protocol
//!
//! Every packet is a map tagged by `type` with camelCase fields. Client and
//! server packet sets are separate types so a server packet can never be
//! mistaken for a request.

use serde::{Deserialize, Serialize};

use crate::models::{
    ChatEntry, ChatFacet, DropReason, PeerSummary, Playhead, PlaylistItem,
};
use crate::validation::{require_non_empty, Validate, ValidationIssue};
use crate::websocket::connection::ConnectionId;

// =============================================================================
// Client -> Server Packets
// =============================================================================

/// Packets sent from a client socket to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientPacket {
    /// Leave the session; drops the peer when sent on its last socket
    LeaveSession,

    /// Ask for the current peer list
    RequestPeerList,

    /// Ask for the current playhead
    RequestPlayheadSync,

    /// Play, pause or seek for everybody
    #[serde(rename_all = "camelCase")]
    ChangePlayhead { playhead: Playhead, paused: bool },

    /// Informational position report; does not move the clock
    #[serde(rename_all = "camelCase")]
    ReportPlayhead { playhead: Playhead, paused: bool },

    #[serde(rename_all = "camelCase")]
    ChatMessage {
        text: String,
        #[serde(default)]
        facets: Vec<ChatFacet>,
    },

    #[serde(rename_all = "camelCase")]
    AppendToPlaylist { item: PlaylistItem },

    /// Remove the item at `playlist_index` if its video still equals `url`
    #[serde(rename_all = "camelCase")]
    RemoveFromPlaylist { url: String, playlist_index: usize },

    #[serde(rename_all = "camelCase")]
    ChangePlaylistIndex { playlist_index: usize },

    /// Replace mirrors and subtitles of the item whose video equals `item.video`
    #[serde(rename_all = "camelCase")]
    EditPlaylistItem {
        playlist_index: usize,
        item: PlaylistItem,
    },
}

impl ClientPacket {
    /// Packet name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LeaveSession => "LeaveSession",
            Self::RequestPeerList => "RequestPeerList",
            Self::RequestPlayheadSync => "RequestPlayheadSync",
            Self::ChangePlayhead { .. } => "ChangePlayhead",
            Self::ReportPlayhead { .. } => "ReportPlayhead",
            Self::ChatMessage { .. } => "ChatMessage",
            Self::AppendToPlaylist { .. } => "AppendToPlaylist",
            Self::RemoveFromPlaylist { .. } => "RemoveFromPlaylist",
            Self::ChangePlaylistIndex { .. } => "ChangePlaylistIndex",
            Self::EditPlaylistItem { .. } => "EditPlaylistItem",
        }
    }
}

impl Validate for ClientPacket {
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
        match self {
            Self::ChatMessage { facets, .. } => {
                facets.collect_issues(&format!("{path}.facets"), issues);
            }
            Self::AppendToPlaylist { item } | Self::EditPlaylistItem { item, .. } => {
                item.collect_issues(&format!("{path}.item"), issues);
            }
            Self::RemoveFromPlaylist { url, .. } => {
                require_non_empty(url, &format!("{path}.url"), issues);
            }
            Self::LeaveSession
            | Self::RequestPeerList
            | Self::RequestPlayheadSync
            | Self::ChangePlayhead { .. }
            | Self::ReportPlayhead { .. }
            | Self::ChangePlaylistIndex { .. } => {}
        }
    }
}

// =============================================================================
// Server -> Client Packets
// =============================================================================

/// Packets sent from the server to client sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerPacket {
    /// First packet on every socket
    Handshake(Handshake),

    #[serde(rename_all = "camelCase")]
    FullPeerList { peers: Vec<PeerSummary> },

    PeerAdded(PeerSummary),

    #[serde(rename_all = "camelCase")]
    PeerDropped {
        connection_id: ConnectionId,
        reason: DropReason,
    },

    /// Authoritative playhead; `from` is absent for server-originated syncs
    #[serde(rename_all = "camelCase")]
    ChangePlayhead {
        playhead: Playhead,
        paused: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ConnectionId>,
    },

    #[serde(rename_all = "camelCase")]
    ReportPlayhead {
        playhead: Playhead,
        paused: bool,
        from: ConnectionId,
    },

    #[serde(rename_all = "camelCase")]
    PlaylistUpdate {
        playlist: Vec<PlaylistItem>,
        playlist_index: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ConnectionId>,
    },

    #[serde(rename_all = "camelCase")]
    ChatMessage {
        text: String,
        facets: Vec<ChatFacet>,
        from: ConnectionId,
    },

    #[serde(rename_all = "camelCase")]
    ChatHistory { messages: Vec<ChatEntry> },
}

/// Everything a freshly attached socket needs to render the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub connection_id: ConnectionId,
    pub resumption_token: String,
    pub session: String,
    pub playlist: Vec<PlaylistItem>,
    pub playlist_index: i64,
    pub paused: bool,
    pub playhead: Playhead,
    /// Server time the playhead was sampled at, Unix milliseconds
    pub playhead_timestamp: i64,
    pub nickname: String,
    pub display_color: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_client_packet_wire_names() {
        let packet: ClientPacket = serde_json::from_value(serde_json::json!({
            "type": "RemoveFromPlaylist",
            "url": "a.mp4",
            "playlistIndex": 2,
        }))
        .unwrap();
        assert_eq!(
            packet,
            ClientPacket::RemoveFromPlaylist {
                url: "a.mp4".into(),
                playlist_index: 2,
            }
        );

        let packet: ClientPacket =
            serde_json::from_value(serde_json::json!({"type": "LeaveSession"})).unwrap();
        assert_eq!(packet.kind(), "LeaveSession");
    }

    #[test]
    fn test_negative_values_fail_structurally() {
        let negative_index = serde_json::json!({"type": "ChangePlaylistIndex", "playlistIndex": -1});
        assert!(serde_json::from_value::<ClientPacket>(negative_index).is_err());

        let negative_playhead =
            serde_json::json!({"type": "ChangePlayhead", "playhead": -5.0, "paused": false});
        assert!(serde_json::from_value::<ClientPacket>(negative_playhead).is_err());
    }

    #[test]
    fn test_client_packet_validation() {
        let packet = ClientPacket::ChatMessage {
            text: "  ".into(),
            facets: vec![ChatFacet::Emphasis { start: 4, end: 1 }],
        };
        let err = packet.validate().unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["$.facets[0]: start (4) must not exceed end (1)"]
        );

        let blank = ClientPacket::ChatMessage {
            text: String::new(),
            facets: vec![],
        };
        assert!(blank.validate().is_ok());

        let packet = ClientPacket::AppendToPlaylist {
            item: PlaylistItem::new(""),
        };
        assert_matches!(packet.validate(), Err(e) if e.issues[0].path == "$.item.video");

        assert!(ClientPacket::RequestPeerList.validate().is_ok());
    }

    #[test]
    fn test_server_packet_optional_from() {
        let packet = ServerPacket::ChangePlayhead {
            playhead: Playhead::ZERO,
            paused: true,
            from: None,
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "ChangePlayhead", "playhead": 0.0, "paused": true})
        );
    }

    #[test]
    fn test_peer_added_is_flat() {
        let packet = ServerPacket::PeerAdded(PeerSummary {
            connection_id: ConnectionId::from("c1"),
            nickname: "alice".into(),
            display_color: "#f00".into(),
        });
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "PeerAdded",
                "connectionId": "c1",
                "nickname": "alice",
                "displayColor": "#f00",
            })
        );
    }

    #[test]
    fn test_chat_message_from_is_connection_id() {
        let packet = ServerPacket::ChatMessage {
            text: "hi".into(),
            facets: vec![],
            from: ConnectionId::from("c1"),
        };
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "ChatMessage", "text": "hi", "facets": [], "from": "c1"})
        );
    }

    #[test]
    fn test_peer_dropped_reason() {
        let packet = ServerPacket::PeerDropped {
            connection_id: ConnectionId::from("c1"),
            reason: DropReason::Timeout,
        };
        let json = serde_json::to_string(&packet).unwrap();
        assert!(json.contains("\"reason\":\"timeout\""));
        assert!(json.contains("\"connectionId\":\"c1\""));
    }
}
