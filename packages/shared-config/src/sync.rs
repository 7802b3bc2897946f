//! Session synchronization tuning

use std::time::Duration;

use crate::{parse_env, ConfigError, ConfigResult};

/// Timing and capacity knobs for watch sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// How often the timeout reaper sweeps every session, in milliseconds
    pub reaper_interval_ms: u64,

    /// How long a peer without sockets keeps its identity, in seconds
    pub peer_timeout_secs: u64,

    /// Upper bound on a single socket write, in milliseconds
    pub send_timeout_ms: u64,

    /// Number of chat entries retained per session
    pub chat_history_limit: usize,
}

impl SyncConfig {
    /// Load sync configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            reaper_interval_ms: parse_env("REAPER_INTERVAL_MS", 1_000)?,
            peer_timeout_secs: parse_env("PEER_TIMEOUT_SECS", 15)?,
            send_timeout_ms: parse_env("SEND_TIMEOUT_MS", 5_000)?,
            chat_history_limit: parse_env("CHAT_HISTORY_LIMIT", 500)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the reaper or the socket writers
    pub fn validate(&self) -> ConfigResult<()> {
        if self.reaper_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "REAPER_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "SEND_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reaper_interval_ms: 1_000,
            peer_timeout_secs: 15,
            send_timeout_ms: 5_000,
            chat_history_limit: 500,
        }
    }
}
