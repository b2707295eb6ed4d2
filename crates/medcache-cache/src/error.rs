//! Error types for cache operations.
//!
//! These errors never cross the public cache APIs: callers see a miss or a
//! no-op, and the error is logged.

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A bulk-removal pattern was not a valid regular expression.
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The stored value is not of the requested type.
    #[error("Type mismatch for key {key}: stored {stored}, requested {requested}")]
    TypeMismatch {
        key: String,
        stored: &'static str,
        requested: &'static str,
    },
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
