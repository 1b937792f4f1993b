use axum::{
    middleware::Next,
    response::{IntoResponse, Response},
    extract::Request,
    body::Body,
};
use tower_sessions::Session;
use crate::errors::AppError;
use crate::handlers::SESSION_USER_KEY;

const PUBLIC_PATHS: [&str; 3] = ["/health", "/api/auth/login", "/api/auth/register"];

pub async fn require_auth(
    session: Session,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();

    if PUBLIC_PATHS.contains(&path) {
        return next.run(req).await;
    }

    match session.get::<String>(SESSION_USER_KEY).await {
        Ok(Some(_)) => next.run(req).await,
        Ok(None) => AppError::Auth("Not authenticated".into()).into_response(),
        Err(e) => AppError::Auth(format!("Session error: {}", e)).into_response(),
    }
}
