//! Expiry Sweep Task
//!
//! Expired entries are dropped lazily on access; this task also reclaims the
//! ones nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Starts sweeping expired entries out of `store` every `cleanup_interval_secs`.
///
/// The write lock is held for the sweep only. Entries without an expiry,
/// dependency records among them, are never swept. Abort the returned handle
/// to stop the task.
pub fn spawn_cleanup_task(
    store: Arc<RwLock<CacheStore>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let period = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "Expiry sweep started");

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let (removed, remaining) = {
                let mut guard = store.write().await;
                (guard.cleanup_expired(), guard.len())
            };

            match removed {
                0 => debug!(remaining, "Expiry sweep found nothing"),
                n => info!(removed = n, remaining, "Expiry sweep removed entries"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Expiry, WriteCondition};

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let store = Arc::new(RwLock::new(CacheStore::new(100)));

        store
            .write()
            .await
            .set(
                "expire_soon".to_string(),
                "value".to_string(),
                Expiry::Sliding(Duration::from_millis(200)),
                WriteCondition::Always,
            )
            .unwrap();

        let handle = spawn_cleanup_task(store.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Swept by the task, not lazily on read
        assert_eq!(store.read().await.len(), 0);
        assert_eq!(store.read().await.stats().expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_persistent_entries() {
        let store = Arc::new(RwLock::new(CacheStore::new(100)));

        store
            .write()
            .await
            .set(
                "dependent_entity_set_orders".to_string(),
                "[]".to_string(),
                Expiry::Never,
                WriteCondition::Always,
            )
            .unwrap();

        let handle = spawn_cleanup_task(store.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let found = store.write().await.get("dependent_entity_set_orders");
        assert_eq!(found.unwrap().value, "[]");

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let store = Arc::new(RwLock::new(CacheStore::new(100)));

        let handle = spawn_cleanup_task(store, 1);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
