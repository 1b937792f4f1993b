use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub scheduler: SchedulerConfig,
    pub user: UserConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_size: usize,  // in bytes
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

// Which trigger source drives the recurring tick
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    Direct,
    FlagGated,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub trigger: TriggerMode,
    pub tick_interval_secs: u64,
    pub max_concurrent_users: usize,
    pub storage_timeout_ms: u64,
    pub flag_key: String,
    pub flag_ttl_secs: u64,  // in seconds
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        // Redis refuses SET EX with a zero expiry, so the flag could never be set
        if self.flag_ttl_secs == 0 {
            return Err("scheduler.flag_ttl_secs must be at least 1".into());
        }
        if self.max_concurrent_users == 0 {
            return Err("scheduler.max_concurrent_users must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerMode::Direct,
            tick_interval_secs: 300,
            max_concurrent_users: 8,
            storage_timeout_ms: 5000,
            flag_key: "task_purge_scheduled".to_string(),
            flag_ttl_secs: 86400,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub default_reset_hour: u32,
    pub default_reset_minute: u32,
    pub max_tasks_per_user: usize,
}

/// Accounts allowed to drive the reset scheduler over HTTP. Empty means
/// nobody; the admin routes then answer 403 for everyone.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub usernames: Vec<String>,
}

impl AdminConfig {
    pub fn is_admin(&self, username: &str) -> bool {
        self.usernames.iter().any(|name| name == username)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let config: Self = config.try_deserialize()?;
        config
            .scheduler
            .validate()
            .map_err(config::ConfigError::Message)?;
        Ok(config)
    }
}
