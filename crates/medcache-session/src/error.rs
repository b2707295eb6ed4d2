//! Error types for session operations.
//!
//! Unlike the caches, the session store surfaces every failure: a masked
//! session error would be a security hole.

/// Error type for session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session (or refresh token) with this identifier.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The session existed but is past its expiry.
    #[error("Session expired: {0}")]
    Expired(String),

    /// A requested scope or elevation was denied by policy.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// The request itself was malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The identity provider could not re-authenticate the principal.
    #[error("Identity error: {0}")]
    Identity(String),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
