use thiserror::Error;
use redis::RedisError;

/// Failure of a single call to the storage collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-user failure of the reset scheduler. None of these abort a batch run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurgeError {
    /// The store could not be reached or did not answer in time. Retryable.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid reset configuration {hour:02}:{minute:02}")]
    InvalidResetConfiguration { hour: u32, minute: u32 },

    /// The purge went through but the ledger could not record it.
    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("User {0} not found")]
    UserNotFound(String),
}

impl PurgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PurgeError::StorageUnavailable(_) | PurgeError::LedgerWriteFailed(_))
    }
}

impl From<StoreError> for PurgeError {
    fn from(err: StoreError) -> Self {
        PurgeError::StorageUnavailable(err.to_string())
    }
}

pub type PurgeResult<T> = Result<T, PurgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_storage_unavailable() {
        let err: PurgeError = StoreError::Unavailable("connection refused".into()).into();
        assert_eq!(
            err,
            PurgeError::StorageUnavailable("Store unavailable: connection refused".into())
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_configuration_is_not_retryable() {
        let err = PurgeError::InvalidResetConfiguration { hour: 24, minute: 5 };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Invalid reset configuration 24:05");
    }
}
