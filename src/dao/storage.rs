use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of where collections live.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Underlying error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A collection exists but cannot be decoded.
    #[error("collection `{collection}` is corrupt")]
    Corrupt {
        /// Collection that failed to parse.
        collection: &'static str,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
