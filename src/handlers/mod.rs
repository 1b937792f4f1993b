mod auth;
mod users;
mod task;
mod admin;

use axum::response::{IntoResponse, Json};
use serde_json::json;
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::state::AppState;

pub use auth::{handle_register, handle_login, handle_logout, get_current_user};
pub use users::{get_profile, update_profile, update_reset_time, delete_account};
pub use task::{
    list_tasks, create_task, get_task, update_task, delete_task, toggle_task,
    purge_completed_tasks, list_categories, list_overdue_tasks,
    bulk_delete_tasks, bulk_complete_tasks, bulk_update_priority,
};
pub use admin::{run_purge, run_purge_for_user, schedule_purge, purge_state_for_user};

pub const SESSION_USER_KEY: &str = "user_session";

pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "sisyphus" }))
}

// Id of the logged-in user, from the session cookie.
pub(crate) async fn session_user_id(session: &Session) -> AppResult<String> {
    session
        .get::<String>(SESSION_USER_KEY)
        .await
        .map_err(|e| AppError::Auth(format!("Session error: {}", e)))?
        .ok_or_else(|| AppError::Auth("Not authenticated".into()))
}

pub(crate) async fn session_user(state: &AppState, session: &Session) -> AppResult<User> {
    let user_id = session_user_id(session).await?;
    state
        .redis_service
        .get_user(&user_id)
        .await?
        .ok_or_else(|| AppError::Auth("User not found".into()))
}
