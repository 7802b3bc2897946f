//! Background sweep that evicts peers whose keepalive went stale

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::registry::SessionRegistry;

/// Run [`SessionRegistry::reap`] every `interval` until the task is aborted
pub fn spawn_reaper(registry: SessionRegistry, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // A slow sweep pushes the schedule back instead of bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = interval.as_millis() as u64, "Timeout reaper started");

        loop {
            ticker.tick().await;
            let evicted = registry.reap(Utc::now());
            if evicted > 0 {
                tracing::debug!(evicted, sessions = registry.len(), "Reaper sweep finished");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Peer;
    use watchparty_shared_config::SyncConfig;

    #[tokio::test]
    async fn test_reaper_evicts_stale_orphans() {
        let registry = SessionRegistry::new(SyncConfig::default());
        let session = registry.create_session(None, vec![]).unwrap();
        let stale = Utc::now() - chrono::Duration::seconds(60);
        session.add_peer(Peer::new("alice", "#f00", stale));
        session.add_peer(Peer::new("bob", "#0f0", Utc::now()));

        let handle = spawn_reaper(registry.clone(), Duration::from_millis(10));
        for _ in 0..100 {
            if session.peer_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        let peers = session.peer_list();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].nickname, "bob");
    }
}
