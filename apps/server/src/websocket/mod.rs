//! WebSocket transport for session sync
//!
//! - `connection`: peer identity, resumption tokens and socket handles
//! - `messages`: client and server packet types
//! - `codec`: MessagePack framing and the validation gate
//! - `sync`: per-socket packet dispatch
//! - `handler`: connect endpoint and socket loop

pub mod codec;
pub mod connection;
pub mod handler;
pub mod messages;
pub mod sync;

pub use connection::{ConnectionId, ResumptionToken, SendError, SocketHandle, SocketId};
pub use handler::connect_handler;
pub use messages::{ClientPacket, Handshake, ServerPacket};
pub use sync::{FrameOutcome, SyncError, SyncHandler};
