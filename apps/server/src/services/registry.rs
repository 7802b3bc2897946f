//! Process-wide session registry

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use watchparty_shared_config::SyncConfig;

use super::session::WatchSession;
use crate::models::PlaylistItem;
use crate::validation::{Validate, ValidationError, ValidationIssue};
use crate::websocket::connection::{random_token, SESSION_ID_BYTES};

const MAX_SESSION_ID_LEN: usize = 128;

/// Validate a client-requested session id
fn validate_session_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("session id cannot be empty");
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err("session id must be at most 128 characters");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("session id contains invalid characters");
    }
    Ok(())
}

/// All live sessions, keyed by id
///
/// Sessions are never removed; they live until the process exits.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<WatchSession>>>,
    settings: Arc<SyncConfig>,
}

impl SessionRegistry {
    pub fn new(settings: SyncConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &SyncConfig {
        &self.settings
    }

    /// Create a session, preferring `requested_id` when it is free
    ///
    /// A taken id is replaced by a random one rather than rejected. A
    /// non-empty playlist starts on its first item.
    pub fn create_session(
        &self,
        requested_id: Option<String>,
        playlist: Vec<PlaylistItem>,
    ) -> Result<Arc<WatchSession>, ValidationError> {
        let mut issues = Vec::new();
        if let Some(id) = &requested_id {
            if let Err(message) = validate_session_id(id) {
                issues.push(ValidationIssue::new("$.id", message));
            }
        }
        playlist.collect_issues("$.playlist", &mut issues);
        if !issues.is_empty() {
            return Err(issues.into());
        }

        let mut candidate = requested_id.unwrap_or_else(|| random_token(SESSION_ID_BYTES));
        loop {
            match self.sessions.entry(candidate.clone()) {
                Entry::Occupied(_) => {
                    tracing::debug!(session_id = %candidate, "Session id taken, generating another");
                    candidate = random_token(SESSION_ID_BYTES);
                }
                Entry::Vacant(vacant) => {
                    let session = Arc::new(WatchSession::new(
                        candidate.clone(),
                        playlist,
                        self.settings.chat_history_limit,
                    ));
                    vacant.insert(Arc::clone(&session));
                    tracing::info!(session_id = %candidate, "Session created");
                    return Ok(session);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<WatchSession>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every session handle
    pub fn sessions(&self) -> Vec<Arc<WatchSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// One reaper sweep over every session; returns the number of evictions
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let timeout = chrono::Duration::from_std(self.settings.peer_timeout())
            .unwrap_or_else(|_| chrono::Duration::days(365));

        // Sessions are locked one at a time, never while a shard lock is held.
        self.sessions()
            .iter()
            .map(|session| {
                let evicted = session.reap(now, timeout);
                for connection_id in &evicted {
                    tracing::info!(
                        session_id = %session.id(),
                        connection_id = %connection_id,
                        "Evicted peer after keepalive timeout"
                    );
                }
                evicted.len()
            })
            .sum()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("settings", &self.settings)
            .finish()
    }
}
