//! Facade error types.

use thiserror::Error;

/// Errors surfaced by the facade.
///
/// Cache operations never fail; only configuration and session errors
/// reach callers.
#[derive(Debug, Error)]
pub enum Error {
    /// Session lifecycle error.
    #[error("Session error: {0}")]
    Session(#[from] medcache_session::SessionError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, Error>;
