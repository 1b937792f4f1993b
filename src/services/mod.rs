mod store;
mod redis_service;
mod memory_store;

pub use store::{PurgeStore, FlagStore, TaskStore};
pub use redis_service::RedisService;
pub use memory_store::MemoryStore;
