//! Configuration traits for decoupled config passing between crates.
//!
//! Caches depend on configuration capabilities rather than on a concrete
//! settings structure. Loading the settings (files, environment) is the
//! host's job; the host builds or deserialises [`CacheSettings`] and
//! [`SessionSettings`] and hands them to the caches at construction.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Base trait for all configuration types.
///
/// Implementations should be cheaply cloneable and thread-safe.
pub trait ConfigProvider: Clone + Send + Sync + 'static {}

/// Cache sizing and lifetime configuration.
pub trait HasCacheConfig: ConfigProvider {
    /// Upper bound for a single cache's approximate memory use, in megabytes.
    fn max_cache_size_mb(&self) -> usize;

    /// How long cached objects and ad-hoc values live.
    fn max_cache_age(&self) -> Duration;

    /// How long an idle query continuation stays registered.
    fn max_query_age(&self) -> Duration;

    /// Maximum number of ad-hoc entries.
    fn adhoc_max_entries(&self) -> usize {
        defaults::ADHOC_MAX_ENTRIES
    }

    /// [`max_cache_size_mb`](Self::max_cache_size_mb) in bytes.
    fn max_cache_bytes(&self) -> usize {
        self.max_cache_size_mb().saturating_mul(1024 * 1024)
    }
}

/// Session lifetime configuration.
pub trait HasSessionConfig: ConfigProvider {
    /// Lifetime of an ordinary session.
    fn session_length(&self) -> Duration;

    /// Lifetime of password-change and temporary sessions.
    fn restricted_session_length(&self) -> Duration {
        defaults::restricted_session_length()
    }

    /// How long an expired session stays resolvable so that callers can be
    /// told it expired rather than that it never existed.
    fn expired_session_retention(&self) -> Duration {
        defaults::expired_session_retention()
    }

    /// Audience claim stamped on locally issued sessions.
    fn audience(&self) -> Option<String> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Default values
// ─────────────────────────────────────────────────────────────────────────────

/// Fallback configuration values used when a setting is absent.
pub mod defaults {
    use std::time::Duration;

    pub const MAX_CACHE_SIZE_MB: usize = 10;
    pub const ADHOC_MAX_ENTRIES: usize = 512;
    pub const MAX_CACHE_AGE_SECS: u64 = 600;
    pub const MAX_QUERY_AGE_SECS: u64 = 3600;
    pub const SESSION_LENGTH_SECS: u64 = 30 * 60;
    pub const RESTRICTED_SESSION_LENGTH_SECS: u64 = 120;
    pub const EXPIRED_SESSION_RETENTION_SECS: u64 = 10 * 60;
    /// Trim target used by periodic maintenance (percentage of capacity).
    pub const TRIM_TARGET_PERCENT: u8 = 80;

    pub fn max_cache_age() -> Duration {
        Duration::from_secs(MAX_CACHE_AGE_SECS)
    }

    pub fn max_query_age() -> Duration {
        Duration::from_secs(MAX_QUERY_AGE_SECS)
    }

    pub fn session_length() -> Duration {
        Duration::from_secs(SESSION_LENGTH_SECS)
    }

    pub fn restricted_session_length() -> Duration {
        Duration::from_secs(RESTRICTED_SESSION_LENGTH_SECS)
    }

    pub fn expired_session_retention() -> Duration {
        Duration::from_secs(EXPIRED_SESSION_RETENTION_SECS)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Standalone settings types
// ─────────────────────────────────────────────────────────────────────────────

/// Cache settings, typically deserialised from the host's `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_cache_size_mb: usize,
    pub max_cache_age_secs: u64,
    pub max_query_age_secs: u64,
    pub adhoc_max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cache_size_mb: defaults::MAX_CACHE_SIZE_MB,
            max_cache_age_secs: defaults::MAX_CACHE_AGE_SECS,
            max_query_age_secs: defaults::MAX_QUERY_AGE_SECS,
            adhoc_max_entries: defaults::ADHOC_MAX_ENTRIES,
        }
    }
}

impl ConfigProvider for CacheSettings {}

impl HasCacheConfig for CacheSettings {
    fn max_cache_size_mb(&self) -> usize {
        self.max_cache_size_mb
    }

    fn max_cache_age(&self) -> Duration {
        Duration::from_secs(self.max_cache_age_secs)
    }

    fn max_query_age(&self) -> Duration {
        Duration::from_secs(self.max_query_age_secs)
    }

    fn adhoc_max_entries(&self) -> usize {
        self.adhoc_max_entries
    }
}

/// Session settings, typically deserialised from the host's `[session]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub session_length_secs: u64,
    pub restricted_session_length_secs: u64,
    pub expired_session_retention_secs: u64,
    pub audience: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_length_secs: defaults::SESSION_LENGTH_SECS,
            restricted_session_length_secs: defaults::RESTRICTED_SESSION_LENGTH_SECS,
            expired_session_retention_secs: defaults::EXPIRED_SESSION_RETENTION_SECS,
            audience: None,
        }
    }
}

impl ConfigProvider for SessionSettings {}

impl HasSessionConfig for SessionSettings {
    fn session_length(&self) -> Duration {
        Duration::from_secs(self.session_length_secs)
    }

    fn restricted_session_length(&self) -> Duration {
        Duration::from_secs(self.restricted_session_length_secs)
    }

    fn expired_session_retention(&self) -> Duration {
        Duration::from_secs(self.expired_session_retention_secs)
    }

    fn audience(&self) -> Option<String> {
        self.audience.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_settings_defaults() {
        let config = CacheSettings::default();
        assert_eq!(config.max_cache_size_mb(), defaults::MAX_CACHE_SIZE_MB);
        assert_eq!(config.max_cache_age(), defaults::max_cache_age());
        assert_eq!(config.max_query_age(), defaults::max_query_age());
        assert_eq!(config.adhoc_max_entries(), 512);
        assert_eq!(config.max_cache_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_session_settings_defaults() {
        let config = SessionSettings::default();
        assert_eq!(config.session_length(), defaults::session_length());
        assert_eq!(
            config.restricted_session_length(),
            Duration::from_secs(120)
        );
        assert_eq!(
            config.expired_session_retention(),
            defaults::expired_session_retention()
        );
        assert!(config.audience().is_none());
    }

    #[test]
    fn test_partial_settings_fall_back_to_defaults() {
        let config: CacheSettings = serde_json::from_str(r#"{ "max_cache_age_secs": 30 }"#).unwrap();
        assert_eq!(config.max_cache_age(), Duration::from_secs(30));
        assert_eq!(config.max_query_age(), defaults::max_query_age());
        assert_eq!(config.max_cache_size_mb(), defaults::MAX_CACHE_SIZE_MB);
    }

    #[test]
    fn test_custom_session_settings() {
        let config = SessionSettings {
            session_length_secs: 60,
            audience: Some("https://records.example.org".to_string()),
            ..Default::default()
        };
        assert_eq!(config.session_length(), Duration::from_secs(60));
        assert_eq!(
            config.audience().as_deref(),
            Some("https://records.example.org")
        );
    }
}
