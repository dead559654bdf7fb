use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reading or writing a backing file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A backing file exists but does not hold the expected JSON shape.
    #[error("corrupt data: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// The in-process lock guarding the backend was poisoned by a panic.
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for relay_core::RelayError {
    fn from(e: StoreError) -> Self {
        relay_core::RelayError::Storage(e.to_string())
    }
}
