//! Error types for the full-text engine.

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SorrelError>;

/// Errors surfaced by the full-text engine.
#[derive(Debug, thiserror::Error)]
pub enum SorrelError {
    /// Invalid configuration: an unknown analyzer name, an out-of-range
    /// setting value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid schema request: empty token or property lists, a reserved
    /// property name, a duplicate index.
    #[error("schema error: {0}")]
    Schema(String),

    /// Index-level failure: the index is failed, dropped, still
    /// populating, or does not exist.
    #[error("index error: {0}")]
    Index(String),

    /// A domain conflict while applying an index update.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested operation does not apply to a relevance index.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A malformed argument outside the other categories.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SorrelError {
    pub fn config(message: impl Into<String>) -> Self {
        SorrelError::Config(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        SorrelError::Schema(message.into())
    }

    pub fn index(message: impl Into<String>) -> Self {
        SorrelError::Index(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        SorrelError::Conflict(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        SorrelError::Unsupported(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SorrelError::InvalidArgument(message.into())
    }
}
