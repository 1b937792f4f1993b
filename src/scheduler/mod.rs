//! The daily reset: per-user purge of yesterday's tasks, at most once per
//! reset boundary.

mod boundary;
mod executor;
mod coordinator;
mod trigger;

pub use boundary::{compute_boundary, ResetTime};
pub use executor::PurgeExecutor;
pub use coordinator::{PurgeCoordinator, PurgeSummary, UserFailure, UserPurgeOutcome, UserResetState};
pub use trigger::{
    build_trigger, schedule_purge, spawn_tick_loop,
    DirectTrigger, FlagGatedTrigger, TriggerSource,
};
