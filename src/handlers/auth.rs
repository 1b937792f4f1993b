use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use serde_json::json;
use tower_sessions::Session;
use crate::errors::{AppError, AppResult};
use crate::models::{LoginForm, RegisterForm, User, UserView};
use crate::state::AppState;
use super::{session_user, SESSION_USER_KEY};

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 8;

// bcrypt is deliberately slow; keep it off the async workers.
async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || hash(password.as_bytes(), cost))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

async fn verify_password(password: String, password_hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || verify(password.as_bytes(), &password_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))
}

fn validate_registration(form: &RegisterForm) -> AppResult<()> {
    if form.username.trim().len() < MIN_USERNAME_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    if !form.email.contains('@') {
        return Err(AppError::Validation("Email address is not valid".into()));
    }
    if form.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn handle_register(
    State(state): State<AppState>,
    Json(register_form): Json<RegisterForm>,
) -> AppResult<Response> {
    validate_registration(&register_form)?;

    let password_hash = hash_password(register_form.password, DEFAULT_COST).await?;
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: register_form.username.trim().to_string(),
        email: register_form.email,
        full_name: register_form.full_name,
        password_hash,
        reset_hour: state.config.user.default_reset_hour,
        reset_minute: state.config.user.default_reset_minute,
        created_at: state.clock.now(),
        updated_at: None,
    };

    if !state.redis_service.create_user(&user).await? {
        return Err(AppError::Conflict("Username already registered".into()));
    }

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok((StatusCode::CREATED, Json(UserView::from(&user))).into_response())
}

pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    Json(login_form): Json<LoginForm>,
) -> AppResult<Json<UserView>> {
    tracing::debug!("Login attempt for user: {}", login_form.username);

    let user = state
        .redis_service
        .get_user_by_username(&login_form.username)
        .await?
        .ok_or_else(|| AppError::Auth("Incorrect username or password".into()))?;

    let verified = verify_password(login_form.password, user.password_hash.clone()).await?;
    if !verified {
        tracing::info!("Invalid password for user: {}", login_form.username);
        return Err(AppError::Auth("Incorrect username or password".into()));
    }

    session
        .insert(SESSION_USER_KEY, user.id.clone())
        .await
        .map_err(|e| AppError::Auth(format!("Session error: {}", e)))?;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(UserView::from(&user)))
}

pub async fn handle_logout(session: Session) -> impl IntoResponse {
    if let Err(e) = session.remove::<String>(SESSION_USER_KEY).await {
        tracing::warn!("Session removal error: {}", e);
    }
    Json(json!({ "message": "Successfully logged out" }))
}

pub async fn get_current_user(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<UserView>> {
    let user = session_user(&state, &session).await?;
    Ok(Json(UserView::from(&user)))
}
