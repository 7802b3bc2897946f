//! Session data model

pub mod chat;
pub mod clock;
pub mod peer;
pub mod playlist;

pub use chat::{ChatEntry, ChatFacet, ChatLog};
pub use clock::{InvalidPlayhead, PlaybackClock, Playhead};
pub use peer::{DropReason, Peer, PeerLiveness, PeerSummary};
pub use playlist::{Playlist, PlaylistItem, Removal, Subtitle};
