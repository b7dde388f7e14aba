//! Error types for the SQLite cache implementation.

use duet_storage_traits::CacheError;

/// Error type for SQLite cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The blocking task running a statement panicked or was cancelled
    #[error("Cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    /// Error from rusqlite
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    /// Filesystem error while preparing the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored timestamp could not be converted back into a date
    #[error("Invalid stored timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl From<Error> for CacheError {
    fn from(e: Error) -> Self {
        CacheError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidTimestamp(-1);
        assert_eq!(err.to_string(), "Invalid stored timestamp: -1");
    }

    #[test]
    fn test_into_cache_error() {
        let err: CacheError = Error::InvalidTimestamp(7).into();
        assert!(matches!(err, CacheError::Database(msg) if msg == "Invalid stored timestamp: 7"));
    }
}
