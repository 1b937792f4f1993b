use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{AsyncCommands, Client, Script};
use std::sync::Arc;
use crate::errors::{StoreError, StoreResult};
use crate::models::{User, Task};
use super::store::{PurgeStore, FlagStore, TaskStore};

const USERS_KEY: &str = "users";

// Drops every task scored below ARGV[1] from the user's index in one step.
const DELETE_BEFORE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
for _, id in ipairs(ids) do
    redis.call('DEL', ARGV[2] .. id)
end
if #ids > 0 then
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. ARGV[1])
end
return #ids
"#;

// Ledger write that never moves the stored boundary backwards.
const LEDGER_ADVANCE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current and tonumber(current) >= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

// Rewrites a task only while it still exists, so a write racing a purge
// cannot bring the task back.
const UPDATE_TASK_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('ZADD', KEYS[2], 'XX', ARGV[2], ARGV[3])
return 1
"#;

fn user_key(user_id: &str) -> String {
    format!("user:{}", user_id)
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

fn user_tasks_key(user_id: &str) -> String {
    format!("user:{}:tasks", user_id)
}

fn task_key(task_id: &str) -> String {
    format!("task:{}", task_id)
}

fn ledger_key(user_id: &str) -> String {
    format!("purge_ledger:{}", user_id)
}

pub struct RedisService {
    client: Arc<Client>,
}

impl RedisService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn connection(&self) -> StoreResult<redis::aio::Connection> {
        Ok(self.client.get_async_connection().await?)
    }

    pub async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.connection().await?;
        let user_data: Option<String> = conn.get(user_key(user_id)).await?;
        user_data
            .map(|data| serde_json::from_str(&data).map_err(StoreError::from))
            .transpose()
    }

    pub async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let mut conn = self.connection().await?;
        let user_id: Option<String> = conn.get(username_key(username)).await?;
        match user_id {
            Some(id) => self.get_user(&id).await,
            None => Ok(None),
        }
    }

    /// Claims the username and stores the user. Returns false if the name is taken.
    pub async fn create_user(&self, user: &User) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let claimed: bool = conn.set_nx(username_key(&user.username), &user.id).await?;
        if !claimed {
            return Ok(false);
        }
        let _: () = conn.set(user_key(&user.id), serde_json::to_string(user)?).await?;
        let _: () = conn.sadd(USERS_KEY, &user.id).await?;
        Ok(true)
    }

    pub async fn save_user(&self, user: &User) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(user_key(&user.id), serde_json::to_string(user)?).await?;
        Ok(())
    }

    /// Removes the user together with their tasks and purge ledger.
    pub async fn delete_user(&self, user: &User) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let task_ids: Vec<String> = conn.zrange(user_tasks_key(&user.id), 0, -1).await?;

        let mut keys: Vec<String> = task_ids.iter().map(|id| task_key(id)).collect();
        keys.push(user_tasks_key(&user.id));
        keys.push(ledger_key(&user.id));
        keys.push(user_key(&user.id));
        keys.push(username_key(&user.username));

        let _: () = redis::pipe()
            .atomic()
            .del(keys).ignore()
            .srem(USERS_KEY, &user.id).ignore()
            .query_async(&mut conn)
            .await?;
        tracing::info!("Deleted user {} and {} tasks", user.id, task_ids.len());
        Ok(())
    }
}

#[async_trait]
impl PurgeStore for RedisService {
    async fn find_users(&self) -> StoreResult<Vec<User>> {
        let mut conn = self.connection().await?;
        let user_ids: Vec<String> = conn.smembers(USERS_KEY).await?;
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = user_ids.iter().map(|id| user_key(id)).collect();
        let user_data: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut users = Vec::with_capacity(user_data.len());
        for data in user_data.into_iter().flatten() {
            users.push(serde_json::from_str(&data)?);
        }
        Ok(users)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.get_user(user_id).await
    }

    async fn delete_tasks_before(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let removed: u64 = Script::new(DELETE_BEFORE_SCRIPT)
            .key(user_tasks_key(user_id))
            .arg(boundary.timestamp_millis())
            .arg("task:")
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn get_purge_ledger(&self, user_id: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let mut conn = self.connection().await?;
        let millis: Option<i64> = conn.get(ledger_key(user_id)).await?;
        match millis {
            Some(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(Some)
                .ok_or_else(|| StoreError::Unavailable(format!("corrupt ledger entry for user {}", user_id))),
            None => Ok(None),
        }
    }

    async fn set_purge_ledger(&self, user_id: &str, boundary: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let written: i64 = Script::new(LEDGER_ADVANCE_SCRIPT)
            .key(ledger_key(user_id))
            .arg(boundary.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }
}

#[async_trait]
impl FlagStore for RedisService {
    async fn get_flag(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(key).await?)
    }

    async fn set_flag(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, "true", ttl_secs as usize).await?;
        Ok(())
    }

    async fn clear_flag(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for RedisService {
    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        let mut conn = self.connection().await?;
        let task_data: Option<String> = conn.get(task_key(task_id)).await?;
        task_data
            .map(|data| serde_json::from_str(&data).map_err(StoreError::from))
            .transpose()
    }

    async fn create_task(&self, task: &Task) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .set(task_key(&task.id), serde_json::to_string(task)?).ignore()
            .zadd(user_tasks_key(&task.user_id), &task.id, task.created_at.timestamp_millis()).ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let written: i64 = Script::new(UPDATE_TASK_SCRIPT)
            .key(task_key(&task.id))
            .key(user_tasks_key(&task.user_id))
            .arg(serde_json::to_string(task)?)
            .arg(task.created_at.timestamp_millis())
            .arg(&task.id)
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }

    async fn delete_task(&self, user_id: &str, task_id: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .del(task_key(task_id)).ignore()
            .zrem(user_tasks_key(user_id), task_id).ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn count_tasks(&self, user_id: &str) -> StoreResult<usize> {
        let mut conn = self.connection().await?;
        Ok(conn.zcard(user_tasks_key(user_id)).await?)
    }

    async fn list_tasks(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        let mut conn = self.connection().await?;
        let task_ids: Vec<String> = conn.zrange(user_tasks_key(user_id), 0, -1).await?;
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = task_ids.iter().map(|id| task_key(id)).collect();
        let task_data: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::with_capacity(task_data.len());
        for (task_id, data) in task_ids.iter().zip(task_data) {
            match data {
                Some(data) => tasks.push(serde_json::from_str(&data)?),
                None => tracing::warn!("Task {} indexed for user {} but missing", task_id, user_id),
            }
        }
        Ok(tasks)
    }
}

impl Clone for RedisService {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone()
        }
    }
}
