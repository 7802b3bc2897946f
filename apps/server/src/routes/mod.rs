//! HTTP route handlers

pub mod health;
pub mod session;

pub use health::health_router;
pub use session::session_router;
