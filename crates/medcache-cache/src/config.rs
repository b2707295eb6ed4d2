//! Configuration for a single TTL cache instance.

/// Default capacity in bytes (10 MB).
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for a [`TtlCache`](crate::TtlCache).
#[derive(Debug, Clone)]
pub struct TtlCacheConfig {
    /// Name used in log output.
    pub name: String,

    /// Approximate memory budget. Exceeding it makes `trim` evict.
    pub max_bytes: usize,

    /// Optional hard cap on entry count, enforced on insert by evicting the
    /// least recently used evictable entry.
    pub max_entries: Option<usize>,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_entries: None,
        }
    }
}

impl TtlCacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the memory budget in bytes.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Set the memory budget in megabytes.
    pub fn with_max_size_mb(self, mb: usize) -> Self {
        self.with_max_bytes(mb.saturating_mul(1024 * 1024))
    }

    /// Cap the number of entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }
}
