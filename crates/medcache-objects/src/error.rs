//! Error types for the object cache.

/// Internal object cache failure.
///
/// Never returned from [`ObjectCache`](crate::ObjectCache)'s public
/// operations; a failing add is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum ObjectCacheError {
    /// The object could not be serialised for size accounting.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for object cache internals.
pub type Result<T> = std::result::Result<T, ObjectCacheError>;
