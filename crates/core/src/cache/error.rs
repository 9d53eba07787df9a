use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Cache connection is offline")]
    Offline,
    #[error("Cache service not ready: {0}")]
    NotReady(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Returns true if the error means the connection itself is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            CacheError::ConnectionFailed(_) | CacheError::Offline | CacheError::NotReady(_)
        )
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
