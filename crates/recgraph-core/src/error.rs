//! Error types for recgraph core

use thiserror::Error;

/// Result type alias using the recgraph [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the record storage engine
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors from store files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors (meta file, bulk-load input)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record id beyond the high-water mark, or a record that is not in use
    #[error("Not found: {0}")]
    NotFound(String),

    /// Illegal property key or value, or otherwise malformed input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Deleting a node that still has relationships, token capacity exhausted
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Lost a race with another writer; the caller may retry
    #[error("Transient failure: {0}")]
    TransientFailure(String),

    /// Identifier space or record file size exhausted
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Inconsistent on-disk state (dangling pointers, unterminated chains)
    #[error("Store corruption: {0}")]
    Corruption(String),

    /// Record layout or record size violations
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a constraint-violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientFailure(msg.into())
    }

    /// Create a capacity error
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::CapacityExceeded(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the operation may succeed if the caller tries again.
    ///
    /// The engine never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFailure(_))
    }
}
