// crates/tabula-server/src/session/sweeper.rs
// Background eviction of idle sessions

use super::SessionStore;
use crate::context::ContextMemory;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Sweep every `interval` until `shutdown` turns true (or its sender drops).
/// Context of evicted sessions is cleared with them.
pub fn spawn_sweeper(
    sessions: Arc<SessionStore>,
    context: Arc<ContextMemory>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for id in sessions.sweep_expired() {
                        context.clear(&id);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Session sweeper shutting down");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_evicts_and_clears_context() {
        let sessions = Arc::new(SessionStore::new(Duration::ZERO, 10));
        let context = Arc::new(ContextMemory::new());
        let id = sessions.create_or_get(None);
        context.set_current_table(&id, "orders");

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(sessions.clone(), context.clone(), Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sessions.contains(&id));
        assert!(context.snapshot(&id).is_none());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(
            Arc::new(SessionStore::default()),
            Arc::new(ContextMemory::new()),
            Duration::from_secs(3600),
            rx,
        );
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
