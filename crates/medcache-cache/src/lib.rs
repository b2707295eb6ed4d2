//! In-memory caches with absolute per-entry expiry.
//!
//! This crate provides the generic [`TtlCache`] primitive and two thin
//! caches built on it:
//! - [`AdHocCache`] for arbitrary typed values keyed by string
//! - [`QueryCache`] for stateful, paginated query continuations
//!
//! # Example
//!
//! ```rust,ignore
//! use medcache_cache::{TtlCache, TtlCacheConfig};
//! use medcache_types::SystemClock;
//!
//! let cache: TtlCache<String> = TtlCache::new(
//!     TtlCacheConfig::new().with_name("labels").with_max_entries(1000),
//!     SystemClock::shared(),
//! );
//! cache.set("k", "v".to_string(), expires_at);
//! ```

mod adhoc;
mod cache;
mod config;
mod error;
mod query;
mod size;

pub use adhoc::AdHocCache;
pub use cache::{CacheEntry, CachePriority, CacheStats, TtlCache};
pub use config::TtlCacheConfig;
pub use error::{CacheError, Result};
pub use query::{QueryCache, QueryState};
pub use size::EstimateSize;
