use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use crate::errors::{PurgeError, PurgeResult, StoreResult};
use crate::services::PurgeStore;

// Runs one store call under a deadline. Expiry and store errors both come
// back as StorageUnavailable.
pub(crate) async fn call_store<T, F>(timeout: Duration, what: &str, fut: F) -> PurgeResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!("Store call {} failed: {}", what, e);
            Err(PurgeError::from(e))
        }
        Err(_elapsed) => {
            tracing::error!("Store call {} timed out after {:?}", what, timeout);
            Err(PurgeError::StorageUnavailable(format!(
                "{} timed out after {} ms",
                what,
                timeout.as_millis()
            )))
        }
    }
}

/// Deletes a user's tasks that predate a reset boundary.
pub struct PurgeExecutor<S> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: PurgeStore> PurgeExecutor<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Removes every task of `user_id` created strictly before `boundary`.
    /// A task created exactly at the boundary belongs to the new day and stays.
    pub async fn purge(&self, user_id: &str, boundary: DateTime<Utc>) -> PurgeResult<u64> {
        let removed = call_store(
            self.timeout,
            "delete_tasks_before",
            self.store.delete_tasks_before(user_id, boundary),
        )
        .await?;

        if removed > 0 {
            tracing::info!("Purged {} tasks for user {} before {}", removed, user_id, boundary);
        } else {
            tracing::debug!("No tasks to purge for user {} before {}", user_id, boundary);
        }
        Ok(removed)
    }
}

impl<S> Clone for PurgeExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use crate::models::Task;
    use crate::services::MemoryStore;

    fn boundary() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn removes_only_tasks_strictly_before_boundary() {
        let store = Arc::new(MemoryStore::new());
        let b = boundary();
        store.insert_task(Task::new("u1", "before".into(), b - ChronoDuration::seconds(1)));
        store.insert_task(Task::new("u1", "exactly at".into(), b));
        store.insert_task(Task::new("u1", "after".into(), b + ChronoDuration::seconds(1)));
        store.insert_task(Task::new("u2", "someone else".into(), b - ChronoDuration::hours(3)));

        let executor = PurgeExecutor::new(store.clone(), Duration::from_secs(1));
        assert_eq!(executor.purge("u1", b).await.unwrap(), 1);

        let titles: Vec<String> = store.tasks_for("u1").into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["exactly at".to_string(), "after".to_string()]);
        assert_eq!(store.tasks_for("u2").len(), 1);
    }

    #[tokio::test]
    async fn zero_matches_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let executor = PurgeExecutor::new(store, Duration::from_secs(1));
        assert_eq!(executor.purge("nobody", boundary()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_store_is_storage_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.insert_task(Task::new("u1", "stays".into(), boundary() - ChronoDuration::hours(1)));
        store.set_unreachable(true);

        let executor = PurgeExecutor::new(store.clone(), Duration::from_secs(1));
        let err = executor.purge("u1", boundary()).await.unwrap_err();
        assert!(matches!(err, PurgeError::StorageUnavailable(_)));

        store.set_unreachable(false);
        assert_eq!(store.tasks_for("u1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let store = Arc::new(MemoryStore::new());
        store.set_delete_delay(Some(Duration::from_secs(30)));

        let executor = PurgeExecutor::new(store, Duration::from_millis(100));
        let err = executor.purge("u1", boundary()).await.unwrap_err();
        assert!(matches!(err, PurgeError::StorageUnavailable(msg) if msg.contains("timed out")));
    }
}
