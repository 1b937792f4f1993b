//! In-process store. Backs the tests and local runs without Redis; failures
//! and latency can be injected per operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use crate::errors::{StoreError, StoreResult};
use crate::models::{User, Task};
use super::store::{PurgeStore, FlagStore, TaskStore};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    tasks: HashMap<String, Task>,
    ledger: HashMap<String, DateTime<Utc>>,
    flags: HashMap<String, Instant>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unreachable: AtomicBool,
    fail_ledger_writes: AtomicBool,
    fail_deletes_for: Mutex<HashSet<String>>,
    delete_delay: Mutex<Option<Duration>>,
    delete_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> StoreResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unreachable".into()));
        }
        Ok(())
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    pub fn insert_task(&self, task: Task) {
        self.lock().tasks.insert(task.id.clone(), task);
    }

    /// Changes a user's reset time in place, the way a profile update would.
    pub fn set_reset_time(&self, user_id: &str, hour: u32, minute: u32) {
        if let Some(user) = self.lock().users.get_mut(user_id) {
            user.reset_hour = hour;
            user.reset_minute = minute;
        }
    }

    pub fn tasks_for(&self, user_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .lock()
            .tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn ledger_for(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.lock().ledger.get(user_id).copied()
    }

    /// Number of delete passes that actually reached the store.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn set_fail_ledger_writes(&self, fail: bool) {
        self.fail_ledger_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes_for(&self, user_id: &str) {
        self.fail_deletes_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string());
    }

    pub fn set_delete_delay(&self, delay: Option<Duration>) {
        *self.delete_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }
}

#[async_trait]
impl PurgeStore for MemoryStore {
    async fn find_users(&self) -> StoreResult<Vec<User>> {
        self.check_reachable()?;
        let mut users: Vec<User> = self.lock().users.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.check_reachable()?;
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn delete_tasks_before(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<u64> {
        let delay = *self.delete_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        let failing = self
            .fail_deletes_for
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id);
        if failing {
            return Err(StoreError::Unavailable(format!("delete failed for user {}", user_id)));
        }

        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        let before = inner.tasks.len();
        inner
            .tasks
            .retain(|_, task| !(task.user_id == user_id && task.created_at < boundary));
        Ok((before - inner.tasks.len()) as u64)
    }

    async fn get_purge_ledger(&self, user_id: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.check_reachable()?;
        Ok(self.lock().ledger.get(user_id).copied())
    }

    async fn set_purge_ledger(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<bool> {
        self.check_reachable()?;
        if self.fail_ledger_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger write rejected".into()));
        }
        let mut inner = self.lock();
        match inner.ledger.get(user_id) {
            Some(current) if *current >= boundary => Ok(false),
            _ => {
                inner.ledger.insert(user_id.to_string(), boundary);
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl FlagStore for MemoryStore {
    async fn get_flag(&self, key: &str) -> StoreResult<bool> {
        self.check_reachable()?;
        let mut inner = self.lock();
        match inner.flags.get(key) {
            Some(expires) if *expires > Instant::now() => Ok(true),
            Some(_) => {
                inner.flags.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn set_flag(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        self.check_reachable()?;
        // SET EX rejects a zero expiry
        if ttl_secs == 0 {
            return Err(StoreError::Unavailable(format!("invalid expire time for flag {}", key)));
        }
        let expires = Instant::now() + Duration::from_secs(ttl_secs);
        self.lock().flags.insert(key.to_string(), expires);
        Ok(())
    }

    async fn clear_flag(&self, key: &str) -> StoreResult<()> {
        self.check_reachable()?;
        self.lock().flags.remove(key);
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list_tasks(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        self.check_reachable()?;
        Ok(self.tasks_for(user_id))
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        self.check_reachable()?;
        Ok(self.lock().tasks.get(task_id).cloned())
    }

    async fn count_tasks(&self, user_id: &str) -> StoreResult<usize> {
        self.check_reachable()?;
        Ok(self.lock().tasks.values().filter(|t| t.user_id == user_id).count())
    }

    async fn create_task(&self, task: &Task) -> StoreResult<()> {
        self.check_reachable()?;
        self.insert_task(task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<bool> {
        self.check_reachable()?;
        match self.lock().tasks.get_mut(&task.id) {
            Some(stored) => {
                *stored = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        self.check_reachable()?;
        let mut inner = self.lock();
        if inner.tasks.get(task_id).map_or(false, |t| t.user_id == user_id) {
            inner.tasks.remove(task_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn ledger_never_moves_backwards() {
        let store = MemoryStore::new();
        let later = Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();

        assert!(store.set_purge_ledger("u1", later).await.unwrap());
        assert!(!store.set_purge_ledger("u1", earlier).await.unwrap());
        assert!(!store.set_purge_ledger("u1", later).await.unwrap());
        assert_eq!(store.get_purge_ledger("u1").await.unwrap(), Some(later));
    }

    #[tokio::test]
    async fn flags_can_be_set_and_cleared() {
        let store = MemoryStore::new();
        assert!(!store.get_flag("task_purge_scheduled").await.unwrap());
        store.set_flag("task_purge_scheduled", 60).await.unwrap();
        assert!(store.get_flag("task_purge_scheduled").await.unwrap());
        store.clear_flag("task_purge_scheduled").await.unwrap();
        assert!(!store.get_flag("task_purge_scheduled").await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_flag_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.set_flag("f", 0).await.is_err());
        assert!(!store.get_flag("f").await.unwrap());
    }

    #[tokio::test]
    async fn update_does_not_recreate_a_purged_task() {
        let store = MemoryStore::new();
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut task = Task::new("u1", "stale".into(), created);
        store.create_task(&task).await.unwrap();

        let boundary = created + chrono::Duration::hours(1);
        assert_eq!(store.delete_tasks_before("u1", boundary).await.unwrap(), 1);

        task.title = "edited after reset".into();
        assert!(!store.update_task(&task).await.unwrap());
        assert!(store.get_task(&task.id).await.unwrap().is_none());
        assert_eq!(store.count_tasks("u1").await.unwrap(), 0);
    }
}
