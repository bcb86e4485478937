use hoard_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The key has no sealed object, or it was not sealed in time.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The store cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SessionError {
    /// Returns `true` only when reconnecting might help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => Self::Unavailable(reason),
            other => Self::Store(other),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
