//! Periodic liveness write.
//!
//! Every interval the task overwrites [`HEARTBEAT_KEY`] with the current
//! wall-clock time in milliseconds. A failed write is logged and left alone:
//! the next tick simply tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use varcache_core::cache::{FullStore, HEARTBEAT_KEY};
use varcache_core::heartbeat::next_heartbeat;

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Spawns the heartbeat task.
///
/// The first write happens one full `interval` after the call. The task stops
/// when `shutdown` receives a message or its sender is dropped. The interval
/// is clamped to between one millisecond and one year.
pub fn spawn(
    store: Arc<dyn FullStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_written = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    let timestamp = next_heartbeat(last_written, Utc::now().timestamp_millis());
                    last_written = Some(timestamp);

                    match store.set(HEARTBEAT_KEY, &timestamp.to_string()).await {
                        Ok(()) => tracing::debug!(timestamp, "Heartbeat written"),
                        Err(e) => tracing::debug!(error = %e, "Heartbeat write failed"),
                    }
                }
            }
        }

        tracing::debug!("Heartbeat stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use varcache_core::cache::KeyValueStore;

    async fn heartbeat_value(store: &MemoryStore) -> Option<i64> {
        store
            .get(HEARTBEAT_KEY)
            .await
            .unwrap()
            .map(|v| v.parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_write_after_one_interval() {
        let store = MemoryStore::new(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn(Arc::new(store.clone()), Duration::from_secs(60), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(heartbeat_value(&store).await, None);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(heartbeat_value(&store).await.is_some());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_are_monotonic() {
        let store = MemoryStore::new(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn(Arc::new(store.clone()), Duration::from_secs(60), shutdown_rx);

        let mut previous = 0;
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(60)).await;
            tokio::task::yield_now().await;
            let current = heartbeat_value(&store).await.unwrap_or(previous);
            assert!(current >= previous);
            previous = current;
        }
        assert!(previous > 0);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_not_fatal() {
        let store = MemoryStore::new(16);
        store.set_online(false);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn(Arc::new(store.clone()), Duration::from_secs(60), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(61)).await;
        store.set_online(true);
        assert_eq!(heartbeat_value(&store).await, None);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(heartbeat_value(&store).await.is_some());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_is_clamped() {
        let store = MemoryStore::new(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn(Arc::new(store.clone()), Duration::MAX, shutdown_rx);

        tokio::time::sleep(MAX_INTERVAL + Duration::from_secs(1)).await;
        assert!(heartbeat_value(&store).await.is_some());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_sender_dropped() {
        let store = MemoryStore::new(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let handle = spawn(Arc::new(store), Duration::from_secs(60), shutdown_rx);

        drop(shutdown_tx);
        handle.await.unwrap();
    }
}
