use std::sync::Arc;
use crate::clock::Clock;
use crate::config::Config;
use crate::scheduler::PurgeCoordinator;
use crate::services::RedisService;

// Application state that is shared between handlers
#[derive(Clone)]
pub struct AppState {
    pub redis_service: RedisService,
    pub config: Config,
    pub coordinator: Arc<PurgeCoordinator<RedisService>>,
    pub clock: Arc<dyn Clock>,
}
