//! Seams between the reset scheduler and whatever holds users, tasks and the
//! purge ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::errors::StoreResult;
use crate::models::{Task, User};

#[async_trait]
pub trait PurgeStore: Send + Sync {
    async fn find_users(&self) -> StoreResult<Vec<User>>;

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    /// Removes every task of `user_id` created strictly before `boundary` in
    /// one atomic step and returns how many went.
    async fn delete_tasks_before(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<u64>;

    async fn get_purge_ledger(&self, user_id: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// Records `boundary` only if the stored value is missing or strictly
    /// earlier. Returns whether the write happened.
    async fn set_purge_ledger(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<bool>;
}

/// Expiring boolean flags, used to gate the scheduled purge.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get_flag(&self, key: &str) -> StoreResult<bool>;

    async fn set_flag(&self, key: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn clear_flag(&self, key: &str) -> StoreResult<()>;
}

/// Per-user task storage behind the HTTP handlers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Tasks of a user, oldest first.
    async fn list_tasks(&self, user_id: &str) -> StoreResult<Vec<Task>>;

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>>;

    async fn count_tasks(&self, user_id: &str) -> StoreResult<usize>;

    /// Stores a new task and indexes it under its owner by creation time.
    async fn create_task(&self, task: &Task) -> StoreResult<()>;

    /// Overwrites a task only if it still exists. Returns false when it is
    /// gone, e.g. removed by a reset between read and write; nothing is
    /// written in that case.
    async fn update_task(&self, task: &Task) -> StoreResult<bool>;

    async fn delete_task(&self, user_id: &str, task_id: &str) -> StoreResult<()>;
}
