//! Things that decide when the coordinator runs: a direct trigger that always
//! runs, a flag-gated one that only runs once the purge flag has been
//! scheduled, and the periodic tick loop that drives either.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::clock::Clock;
use crate::config::{SchedulerConfig, TriggerMode};
use crate::errors::PurgeResult;
use crate::services::{FlagStore, PurgeStore};
use super::coordinator::{PurgeCoordinator, PurgeSummary};
use super::executor::call_store;

#[async_trait]
pub trait TriggerSource: Send + Sync {
    /// Runs a batch if this source considers one due. `None` means the tick
    /// was skipped or the batch could not start.
    async fn fire(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Option<PurgeSummary>;

    fn name(&self) -> &'static str;
}

pub struct DirectTrigger<S> {
    coordinator: Arc<PurgeCoordinator<S>>,
}

impl<S> DirectTrigger<S> {
    pub fn new(coordinator: Arc<PurgeCoordinator<S>>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl<S: PurgeStore + 'static> TriggerSource for DirectTrigger<S> {
    async fn fire(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Option<PurgeSummary> {
        match self.coordinator.run_once_with_cancel(now, cancel).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!("Purge run could not start: {}", e);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Sets the purge flag so the next flag-gated tick runs a batch.
pub async fn schedule_purge<F: FlagStore + ?Sized>(
    flags: &F,
    flag_key: &str,
    ttl_secs: u64,
    timeout: Duration,
) -> PurgeResult<()> {
    call_store(timeout, "set_flag", flags.set_flag(flag_key, ttl_secs)).await?;
    tracing::info!("Daily task purge scheduled (flag {} for {}s)", flag_key, ttl_secs);
    Ok(())
}

pub struct FlagGatedTrigger<S, F> {
    coordinator: Arc<PurgeCoordinator<S>>,
    flags: Arc<F>,
    flag_key: String,
    flag_ttl_secs: u64,
    timeout: Duration,
}

impl<S, F: FlagStore> FlagGatedTrigger<S, F> {
    pub fn new(
        coordinator: Arc<PurgeCoordinator<S>>,
        flags: Arc<F>,
        flag_key: impl Into<String>,
        flag_ttl_secs: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            flags,
            flag_key: flag_key.into(),
            flag_ttl_secs,
            timeout,
        }
    }

    pub async fn schedule(&self) -> PurgeResult<()> {
        schedule_purge(self.flags.as_ref(), &self.flag_key, self.flag_ttl_secs, self.timeout).await
    }
}

#[async_trait]
impl<S: PurgeStore + 'static, F: FlagStore + 'static> TriggerSource for FlagGatedTrigger<S, F> {
    async fn fire(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Option<PurgeSummary> {
        match call_store(self.timeout, "get_flag", self.flags.get_flag(&self.flag_key)).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Purge flag {} not set, skipping tick", self.flag_key);
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to check purge status: {}", e);
                return None;
            }
        }

        let summary = match self.coordinator.run_once_with_cancel(now, cancel).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Scheduled purge could not start: {}", e);
                return None;
            }
        };

        // A cancelled batch leaves the flag in place so the next tick finishes it.
        if !summary.cancelled {
            match call_store(self.timeout, "clear_flag", self.flags.clear_flag(&self.flag_key)).await {
                Ok(()) => tracing::info!("Scheduled task purge completed"),
                Err(e) => tracing::warn!("Scheduled purge ran but flag could not be cleared: {}", e),
            }
        }
        Some(summary)
    }

    fn name(&self) -> &'static str {
        "flag_gated"
    }
}

/// Picks the trigger named in the scheduler configuration.
pub fn build_trigger<S, F>(
    config: &SchedulerConfig,
    coordinator: Arc<PurgeCoordinator<S>>,
    flags: Arc<F>,
) -> Arc<dyn TriggerSource>
where
    S: PurgeStore + 'static,
    F: FlagStore + 'static,
{
    match config.trigger {
        TriggerMode::Direct => Arc::new(DirectTrigger::new(coordinator)),
        TriggerMode::FlagGated => Arc::new(FlagGatedTrigger::new(
            coordinator,
            flags,
            config.flag_key.clone(),
            config.flag_ttl_secs,
            config.storage_timeout(),
        )),
    }
}

/// Fires `trigger` every `interval` until `cancel` is triggered.
pub fn spawn_tick_loop(
    trigger: Arc<dyn TriggerSource>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Purge tick loop started ({} trigger, every {:?})", trigger.name(), interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Purge tick loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(summary) = trigger.fire(clock.now(), &cancel).await {
                        tracing::debug!("Tick purged {} tasks", summary.total_tasks_removed);
                    }
                }
            }
        }
    })
}
