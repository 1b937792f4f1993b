use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde_json::json;
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::{ProfileUpdateForm, ResetTimeForm, User, UserView};
use crate::scheduler::ResetTime;
use crate::state::AppState;
use super::{session_user, SESSION_USER_KEY};

fn validated_reset_time(hour: u32, minute: u32) -> AppResult<ResetTime> {
    ResetTime::new(hour, minute).map_err(|_| {
        AppError::Validation("Reset hour must be 0-23 and reset minute 0-59".into())
    })
}

// Applies the optional profile fields; reset time changes take effect on the
// next purge evaluation since the scheduler always reads the stored user.
fn apply_profile_update(user: &mut User, form: ProfileUpdateForm) -> AppResult<()> {
    if let Some(email) = form.email {
        if !email.contains('@') {
            return Err(AppError::Validation("Email address is not valid".into()));
        }
        user.email = email;
    }
    if form.full_name.is_some() {
        user.full_name = form.full_name;
    }
    if form.reset_hour.is_some() || form.reset_minute.is_some() {
        let reset = validated_reset_time(
            form.reset_hour.unwrap_or(user.reset_hour),
            form.reset_minute.unwrap_or(user.reset_minute),
        )?;
        user.reset_hour = reset.hour();
        user.reset_minute = reset.minute();
    }
    Ok(())
}

pub async fn get_profile(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<UserView>> {
    let user = session_user(&state, &session).await?;
    Ok(Json(UserView::from(&user)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<ProfileUpdateForm>,
) -> AppResult<Json<UserView>> {
    let mut user = session_user(&state, &session).await?;
    apply_profile_update(&mut user, form)?;
    user.updated_at = Some(state.clock.now());
    state.redis_service.save_user(&user).await?;

    tracing::info!("Updated profile for user {}", user.id);
    Ok(Json(UserView::from(&user)))
}

pub async fn update_reset_time(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<ResetTimeForm>,
) -> AppResult<impl IntoResponse> {
    let reset = validated_reset_time(form.reset_hour, form.reset_minute)?;
    let mut user = session_user(&state, &session).await?;

    let now = state.clock.now();
    user.reset_hour = reset.hour();
    user.reset_minute = reset.minute();
    user.updated_at = Some(now);
    state.redis_service.save_user(&user).await?;

    tracing::info!(
        "User {} now resets at {:02}:{:02} UTC",
        user.id,
        reset.hour(),
        reset.minute()
    );
    Ok(Json(json!({
        "user": UserView::from(&user),
        "next_reset_at": reset.next_reset_after(now),
    })))
}

pub async fn delete_account(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user = session_user(&state, &session).await?;
    state.redis_service.delete_user(&user).await?;

    if let Err(e) = session.remove::<String>(SESSION_USER_KEY).await {
        tracing::warn!("Session removal error: {}", e);
    }
    Ok(Json(json!({ "message": "Account deleted successfully" })))
}
