use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};
use serde_json::json;
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::scheduler::{self, PurgeSummary, UserPurgeOutcome};
use crate::state::AppState;
use super::session_user;

// Only usernames listed under [admin] may drive the scheduler.
async fn require_admin(state: &AppState, session: &Session) -> AppResult<User> {
    let user = session_user(state, session).await?;
    if !state.config.admin.is_admin(&user.username) {
        tracing::warn!("User {} denied access to admin purge routes", user.username);
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    Ok(user)
}

/// Manual batch run across every user.
pub async fn run_purge(State(state): State<AppState>, session: Session) -> AppResult<Json<PurgeSummary>> {
    let admin = require_admin(&state, &session).await?;
    let now = state.clock.now();
    tracing::info!("Manual purge requested by {} at {}", admin.username, now);
    let summary = state.coordinator.run_once(now).await?;
    Ok(Json(summary))
}

pub async fn run_purge_for_user(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
) -> AppResult<Json<UserPurgeOutcome>> {
    require_admin(&state, &session).await?;
    let outcome = state
        .coordinator
        .run_once_for_user(&user_id, state.clock.now())
        .await?;
    Ok(Json(outcome))
}

pub async fn purge_state_for_user(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    require_admin(&state, &session).await?;
    let reset_state = state
        .coordinator
        .state_for_user(&user_id, state.clock.now())
        .await?;
    Ok(Json(json!({ "user_id": user_id, "state": reset_state })))
}

/// Sets the purge flag picked up by the flag-gated trigger.
pub async fn schedule_purge(State(state): State<AppState>, session: Session) -> AppResult<impl IntoResponse> {
    require_admin(&state, &session).await?;
    let scheduler_config = &state.config.scheduler;
    scheduler::schedule_purge(
        &state.redis_service,
        &scheduler_config.flag_key,
        scheduler_config.flag_ttl_secs,
        scheduler_config.storage_timeout(),
    )
    .await?;
    Ok(Json(json!({ "message": "Daily task purge scheduled" })))
}
