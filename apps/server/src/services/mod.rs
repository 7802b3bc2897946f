//! Session state and its lifecycle

pub mod reaper;
pub mod registry;
pub mod session;

pub use reaper::spawn_reaper;
pub use registry::SessionRegistry;
pub use session::{LeaveOutcome, SessionInfo, SessionState, WatchSession};
