// Error types for the HTTP surface and the purge scheduler, built on thiserror.
use thiserror::Error;

pub mod response;
pub mod purge;

pub use purge::{PurgeError, PurgeResult, StoreError, StoreResult};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Store failures surface as AppError::Store through the From impl.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Purge error: {0}")]
    Purge(#[from] PurgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Store(StoreError::Redis(err))
    }
}

// Custom result type
pub type AppResult<T> = Result<T, AppError>;
