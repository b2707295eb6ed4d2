//! Keyed cache with absolute per-entry expiry and LRU-ordered trimming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use medcache_types::SharedClock;

use crate::config::TtlCacheConfig;
use crate::size::EstimateSize;

/// Eviction priority of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePriority {
    /// May be evicted by `trim` or the entry cap.
    #[default]
    Normal,
    /// Removed only by expiry or explicit removal.
    NeverEvict,
}

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// Absolute expiry. The entry is a miss from this instant on.
    pub expires_at: DateTime<Utc>,

    /// Eviction priority.
    pub priority: CachePriority,

    /// Approximate footprint, including the key.
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    /// Whether the entry has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Inner state protected by the cache mutex.
struct CacheInner<V> {
    /// Entries in recency order.
    lru: LruCache<String, CacheEntry<V>>,

    /// Sum of `size_bytes` over all entries.
    current_bytes: usize,

    hits: u64,
    misses: u64,
}

impl<V> CacheInner<V> {
    fn insert(&mut self, key: String, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        let size = entry.size_bytes;
        let previous = self.lru.put(key, entry);
        if let Some(previous) = &previous {
            self.current_bytes = self.current_bytes.saturating_sub(previous.size_bytes);
        }
        self.current_bytes += size;
        previous
    }

    fn pop(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.lru.pop(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Least recently used evictable key, skipping `except`.
    fn lru_evictable(&self, except: &str) -> Option<String> {
        self.lru
            .iter()
            .rev()
            .find(|(key, entry)| entry.priority == CachePriority::Normal && key.as_str() != except)
            .map(|(key, _)| key.clone())
    }

    fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .lru
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.pop(key);
        }
        expired.len()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet swept.
    pub entries: usize,

    /// Approximate bytes held.
    pub approximate_bytes: usize,

    /// Configured memory budget.
    pub capacity_bytes: usize,

    /// Configured entry cap, if any.
    pub max_entries: Option<usize>,

    pub hits: u64,
    pub misses: u64,
}

/// String-keyed cache with absolute per-entry expiry.
///
/// Expiry is evaluated lazily on every read, so an expired entry is never
/// returned whether or not [`trim`](Self::trim) has run. `trim` sweeps
/// expired entries and, under capacity pressure, evicts
/// [`CachePriority::Normal`] entries least recently used first.
///
/// Values are cloned out on read. Cloning the cache itself shares the
/// underlying storage.
pub struct TtlCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
    config: TtlCacheConfig,
    clock: SharedClock,
}

impl<V: Clone> TtlCache<V> {
    /// Create an empty cache.
    pub fn new(config: TtlCacheConfig, clock: SharedClock) -> Self {
        let inner = CacheInner {
            lru: LruCache::unbounded(),
            current_bytes: 0,
            hits: 0,
            misses: 0,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
            config,
            clock,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    /// Get the clock this cache reads time from.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Store `value` until `expires_at` with normal priority.
    ///
    /// Returns `true` if a live entry was replaced.
    pub fn set(&self, key: impl Into<String>, value: V, expires_at: DateTime<Utc>) -> bool
    where
        V: EstimateSize,
    {
        self.set_with_priority(key, value, expires_at, CachePriority::Normal)
    }

    /// Store `value` until `expires_at` with the given priority.
    pub fn set_with_priority(
        &self,
        key: impl Into<String>,
        value: V,
        expires_at: DateTime<Utc>,
        priority: CachePriority,
    ) -> bool
    where
        V: EstimateSize,
    {
        let size = value.estimated_size();
        self.set_sized(key, value, expires_at, priority, size)
    }

    /// Store `value` with a caller-computed size estimate.
    pub fn set_sized(
        &self,
        key: impl Into<String>,
        value: V,
        expires_at: DateTime<Utc>,
        priority: CachePriority,
        size_bytes: usize,
    ) -> bool {
        let key = key.into();
        let now = self.clock.now();
        let entry = CacheEntry {
            value,
            expires_at,
            priority,
            size_bytes: size_bytes + key.len(),
        };

        let mut inner = self.inner.lock();
        self.store_locked(&mut inner, key, entry, now)
    }

    /// Store `value` only if no live entry exists under `key`.
    ///
    /// The check and the insert happen under one lock acquisition.
    /// Returns `true` if the value was stored.
    pub fn insert_if_absent(
        &self,
        key: impl Into<String>,
        value: V,
        expires_at: DateTime<Utc>,
        priority: CachePriority,
    ) -> bool
    where
        V: EstimateSize,
    {
        let key = key.into();
        let now = self.clock.now();
        let entry = CacheEntry {
            size_bytes: value.estimated_size() + key.len(),
            value,
            expires_at,
            priority,
        };

        let mut inner = self.inner.lock();
        if inner
            .lru
            .peek(&key)
            .is_some_and(|existing| !existing.is_expired_at(now))
        {
            trace!(cache = %self.config.name, key = %key, "Live entry present, not inserting");
            return false;
        }
        self.store_locked(&mut inner, key, entry, now);
        true
    }

    /// Replace the live entry under `key` only if `current` accepts its
    /// value. The check and the replacement happen under one lock
    /// acquisition.
    ///
    /// Returns `false`, leaving the cache untouched, if there is no live
    /// entry or `current` rejects it.
    pub fn replace_if<F>(
        &self,
        key: &str,
        value: V,
        expires_at: DateTime<Utc>,
        size_bytes: usize,
        current: F,
    ) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let Some(existing) = inner
            .lru
            .peek(key)
            .filter(|existing| !existing.is_expired_at(now))
        else {
            return false;
        };
        if !current(&existing.value) {
            trace!(cache = %self.config.name, key = %key, "Live entry changed, not replacing");
            return false;
        }

        let entry = CacheEntry {
            value,
            expires_at,
            priority: existing.priority,
            size_bytes: size_bytes + key.len(),
        };
        self.store_locked(&mut inner, key.to_string(), entry, now)
    }

    /// Run `f` on the live entry under `key` while holding the cache lock,
    /// marking it recently used.
    ///
    /// `f` may change the value and its expiry; the entry's size is
    /// re-estimated afterwards. Returns `None` if there is no live entry.
    pub fn update<R, F>(&self, key: &str, f: F) -> Option<R>
    where
        V: EstimateSize,
        F: FnOnce(&mut CacheEntry<V>) -> R,
    {
        let now = self.clock.now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner
            .lru
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
        {
            return None;
        }
        let entry = inner.lru.get_mut(key)?;
        let before = entry.size_bytes;
        let result = f(entry);
        entry.size_bytes = entry.value.estimated_size() + key.len();
        inner.current_bytes = inner.current_bytes.saturating_sub(before) + entry.size_bytes;

        trace!(cache = %self.config.name, key = %key, "Entry updated");
        Some(result)
    }

    /// Insert under an already-held lock and enforce the entry cap.
    fn store_locked(
        &self,
        inner: &mut CacheInner<V>,
        key: String,
        entry: CacheEntry<V>,
        now: DateTime<Utc>,
    ) -> bool {
        let replaced = inner
            .insert(key.clone(), entry)
            .is_some_and(|previous| !previous.is_expired_at(now));

        if let Some(max) = self.config.max_entries {
            if inner.lru.len() > max {
                inner.remove_expired(now);
            }
            while inner.lru.len() > max {
                let Some(victim) = inner.lru_evictable(&key) else {
                    break;
                };
                inner.pop(&victim);
                debug!(cache = %self.config.name, key = %victim, "Evicted entry over entry cap");
            }
        }

        trace!(
            cache = %self.config.name,
            key = %key,
            replaced,
            cache_size = inner.lru.len(),
            "Entry stored"
        );

        replaced
    }

    /// Get a live value, marking it recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let expired = match inner.lru.peek(key) {
            None => {
                inner.misses += 1;
                trace!(cache = %self.config.name, key = %key, "Cache miss");
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            inner.pop(key);
            inner.misses += 1;
            trace!(cache = %self.config.name, key = %key, "Entry expired on read");
            return None;
        }

        inner.hits += 1;
        inner.lru.get(key).map(|entry| entry.value.clone())
    }

    /// Get a live value without touching recency order or hit counters.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .lru
            .peek(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Get a live entry, including its expiry and priority.
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .lru
            .peek(key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    /// Remove a key and return its value if it was live.
    pub fn take(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let entry = self.inner.lock().pop(key)?;
        (!entry.is_expired_at(now)).then_some(entry.value)
    }

    /// Remove a key. Returns `true` if a live entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.take(key).is_some();
        if removed {
            trace!(cache = %self.config.name, key = %key, "Entry removed");
        }
        removed
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .lru
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .lru
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .count()
    }

    /// Approximate bytes held, including expired entries not yet swept.
    pub fn approximate_size(&self) -> usize {
        self.inner.lock().current_bytes
    }

    /// Snapshot of all live entries, most recently used first.
    pub fn enumerate(&self) -> Vec<(String, V)> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        inner
            .lru
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove every entry whose key matches `predicate`.
    pub fn remove_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .lru
            .iter()
            .filter(|(key, _)| predicate(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            inner.pop(key);
        }

        if !keys.is_empty() {
            debug!(cache = %self.config.name, count = keys.len(), "Removed matching entries");
        }
        keys.len()
    }

    /// Sweep expired entries and relieve capacity pressure.
    ///
    /// If the cache is over its byte budget or entry cap after the sweep,
    /// normal-priority entries are evicted least recently used first until
    /// usage is at or below `target_percent` of capacity. Returns the
    /// number of entries removed.
    pub fn trim(&self, target_percent: u8) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired = inner.remove_expired(now);
        let mut evicted = 0;

        let over_bytes = inner.current_bytes > self.config.max_bytes;
        let over_entries = self
            .config
            .max_entries
            .is_some_and(|max| inner.lru.len() > max);

        if over_bytes || over_entries {
            let percent = usize::from(target_percent.min(100));
            let target_bytes = self.config.max_bytes.saturating_mul(percent) / 100;
            let target_entries = self
                .config
                .max_entries
                .map(|max| max.saturating_mul(percent) / 100);

            let candidates: Vec<String> = inner
                .lru
                .iter()
                .rev()
                .filter(|(_, entry)| entry.priority == CachePriority::Normal)
                .map(|(key, _)| key.clone())
                .collect();

            for key in candidates {
                let within_target = inner.current_bytes <= target_bytes
                    && target_entries.is_none_or(|target| inner.lru.len() <= target);
                if within_target {
                    break;
                }
                inner.pop(&key);
                evicted += 1;
            }
        }

        if expired + evicted > 0 {
            debug!(
                cache = %self.config.name,
                expired,
                evicted,
                remaining = inner.lru.len(),
                bytes = inner.current_bytes,
                "Trimmed cache"
            );
        }

        expired + evicted
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let count = inner.lru.len();
        inner.lru.clear();
        inner.current_bytes = 0;
        debug!(cache = %self.config.name, count, "Cleared cache");
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.lru.len(),
            approximate_bytes: inner.current_bytes,
            capacity_bytes: self.config.max_bytes,
            max_entries: self.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
