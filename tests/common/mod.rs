#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sisyphus::models::{Task, User};
use sisyphus::scheduler::PurgeCoordinator;
use sisyphus::services::MemoryStore;
use std::sync::Arc;
use std::time::Duration;

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

pub fn user(id: &str, reset_hour: u32, reset_minute: u32) -> User {
    User {
        id: id.to_string(),
        username: format!("{}-name", id),
        email: format!("{}@example.com", id),
        full_name: None,
        password_hash: String::new(),
        reset_hour,
        reset_minute,
        created_at: at(2023, 1, 1, 0, 0, 0),
        updated_at: None,
    }
}

pub fn task(user_id: &str, title: &str, created_at: DateTime<Utc>) -> Task {
    Task::new(user_id, title.to_string(), created_at)
}

pub fn titles(store: &MemoryStore, user_id: &str) -> Vec<String> {
    store.tasks_for(user_id).into_iter().map(|t| t.title).collect()
}

pub fn coordinator(store: &Arc<MemoryStore>, workers: usize) -> Arc<PurgeCoordinator<MemoryStore>> {
    Arc::new(PurgeCoordinator::new(store.clone(), Duration::from_secs(5), workers))
}
