//! Cache for arbitrary typed values under caller-chosen keys.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use medcache_types::{HasCacheConfig, SharedClock, expires_after};

use crate::cache::TtlCache;
use crate::config::TtlCacheConfig;
use crate::error::{CacheError, Result};
use crate::size::EstimateSize;

/// A stored ad-hoc value, or the "present but empty" marker.
#[derive(Clone)]
struct AdHocValue {
    value: Option<Arc<dyn Any + Send + Sync>>,
    type_name: &'static str,
    size: usize,
}

impl AdHocValue {
    fn of<T: Send + Sync + 'static>(value: T, size: usize) -> Self {
        Self {
            value: Some(Arc::new(value)),
            type_name: std::any::type_name::<T>(),
            size,
        }
    }

    fn empty() -> Self {
        Self {
            value: None,
            type_name: "()",
            size: 0,
        }
    }

    fn downcast<T: Clone + 'static>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = &self.value else {
            return Ok(None);
        };
        value
            .downcast_ref::<T>()
            .cloned()
            .map(Some)
            .ok_or_else(|| CacheError::TypeMismatch {
                key: key.to_string(),
                stored: self.type_name,
                requested: std::any::type_name::<T>(),
            })
    }
}

impl fmt::Debug for AdHocValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdHocValue")
            .field("type_name", &self.type_name)
            .field("empty", &self.value.is_none())
            .finish()
    }
}

impl EstimateSize for AdHocValue {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.size
    }
}

/// Cache for arbitrary values keyed by string.
///
/// Values are moved in on [`add`](Self::add) and cloned out on every read,
/// so neither the caller's later mutations nor a reader's mutations can
/// alter what is cached. Absent values are stored as an explicit empty
/// marker that [`try_get`](Self::try_get) reports as found.
///
/// Failures never reach the caller: a bad pattern removes nothing and a
/// type mismatch reads as a miss.
#[derive(Clone, Debug)]
pub struct AdHocCache {
    cache: TtlCache<AdHocValue>,
    default_ttl: Duration,
}

impl AdHocCache {
    /// Create an ad-hoc cache from a configuration provider.
    pub fn new<C: HasCacheConfig>(config: &C, clock: SharedClock) -> Self {
        let cache_config = TtlCacheConfig::new()
            .with_name("adhoc")
            .with_max_bytes(config.max_cache_bytes())
            .with_max_entries(config.adhoc_max_entries());

        Self {
            cache: TtlCache::new(cache_config, clock),
            default_ttl: config.max_cache_age(),
        }
    }

    fn expiry(&self, ttl: Option<Duration>) -> chrono::DateTime<chrono::Utc> {
        expires_after(self.cache.clock().now(), ttl.unwrap_or(self.default_ttl))
    }

    /// Store `value` under `key` for `ttl`, or the configured max age.
    ///
    /// Only the inline size of `T` is accounted. Values owning heap data
    /// should go through [`add_estimated`](Self::add_estimated) or
    /// [`add_sized`](Self::add_sized) so the byte budget sees them.
    pub fn add<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.add_sized(key, value, std::mem::size_of::<T>(), ttl);
    }

    /// Store `value`, accounting its [`EstimateSize`] footprint.
    pub fn add_estimated<T>(&self, key: &str, value: T, ttl: Option<Duration>)
    where
        T: Clone + Send + Sync + EstimateSize + 'static,
    {
        let size = value.estimated_size();
        self.add_sized(key, value, size, ttl);
    }

    /// Store `value`, accounting `size_bytes` against the byte budget.
    pub fn add_sized<T>(&self, key: &str, value: T, size_bytes: usize, ttl: Option<Duration>)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.cache
            .set(key, AdHocValue::of(value, size_bytes), self.expiry(ttl));
    }

    /// Store the "present but empty" marker under `key`.
    pub fn add_empty(&self, key: &str, ttl: Option<Duration>) {
        self.cache.set(key, AdHocValue::empty(), self.expiry(ttl));
    }

    /// Get a copy of the value under `key`.
    ///
    /// Misses, empty markers and values of another type all return `None`.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.try_get(key).flatten()
    }

    /// Look up `key`, distinguishing an empty value from an absent key.
    ///
    /// Returns `None` when the key is absent (or holds another type),
    /// `Some(None)` for the empty marker, and `Some(Some(value))` otherwise.
    pub fn try_get<T: Clone + 'static>(&self, key: &str) -> Option<Option<T>> {
        let stored = self.cache.get(key)?;
        match stored.downcast::<T>(key) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Ad-hoc lookup degraded to miss");
                None
            }
        }
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.cache.remove(key)
    }

    /// Remove every key matching the regular expression `pattern`.
    ///
    /// Returns the number of entries removed; an invalid pattern removes
    /// nothing.
    pub fn remove_all(&self, pattern: &str) -> usize {
        match self.try_remove_all(pattern) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, pattern = %pattern, "Ad-hoc bulk removal skipped");
                0
            }
        }
    }

    fn try_remove_all(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern)?;
        Ok(self.cache.remove_matching(|key| regex.is_match(key)))
    }

    /// Whether `key` holds a live value or empty marker.
    pub fn exists(&self, key: &str) -> bool {
        self.cache.contains(key)
    }

    /// Sweep expired entries and relieve capacity pressure.
    pub fn trim(&self) -> usize {
        self.cache.trim(medcache_types::config_defaults::TRIM_TARGET_PERCENT)
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.cache.count()
    }

    /// Approximate bytes held.
    pub fn size(&self) -> usize {
        self.cache.approximate_size()
    }
}
