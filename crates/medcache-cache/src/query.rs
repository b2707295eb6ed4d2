//! Continuation state for stateful (paged) queries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use medcache_types::{HasCacheConfig, SharedClock, expires_after};

use crate::cache::{CachePriority, TtlCache};
use crate::config::TtlCacheConfig;
use crate::size::EstimateSize;

/// Mutable part of a query continuation.
#[derive(Debug, Default)]
struct QueryResults {
    total_results: usize,
    keys: Vec<Uuid>,
    seen: HashSet<Uuid>,
    tag: Option<Value>,
}

impl QueryResults {
    /// Append keys not already present, keeping first-seen order.
    fn append(&mut self, keys: &[Uuid]) -> usize {
        let before = self.keys.len();
        for key in keys {
            if self.seen.insert(*key) {
                self.keys.push(*key);
            }
        }
        self.keys.len() - before
    }
}

/// A registered query continuation.
///
/// The result list has its own lock so that appends to one query never
/// serialise with pagers reading another.
#[derive(Debug)]
pub struct QueryState {
    query_id: Uuid,
    created_at: DateTime<Utc>,
    results: Mutex<QueryResults>,
}

impl QueryState {
    fn new(query_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            query_id,
            created_at,
            results: Mutex::new(QueryResults::default()),
        }
    }

    pub fn query_id(&self) -> Uuid {
        self.query_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn total_results(&self) -> usize {
        self.results.lock().total_results
    }

    /// Snapshot of the accumulated keys in insertion order.
    pub fn result_keys(&self) -> Vec<Uuid> {
        self.results.lock().keys.clone()
    }

    pub fn tag(&self) -> Option<Value> {
        self.results.lock().tag.clone()
    }
}

impl EstimateSize for QueryState {
    fn estimated_size(&self) -> usize {
        let results = self.results.lock();
        std::mem::size_of::<Self>()
            + results.keys.len() * std::mem::size_of::<Uuid>() * 2
            + results.tag.as_ref().map_or(0, |tag| tag.to_string().len())
    }
}

/// Cache of stateful query continuations keyed by query id.
///
/// Every mutation pushes the continuation's expiry out to the configured
/// max query age. Operations on an unknown or expired query id are
/// silent no-ops.
#[derive(Clone, Debug)]
pub struct QueryCache {
    cache: TtlCache<Arc<QueryState>>,
    max_age: Duration,
}

impl QueryCache {
    /// Create a query cache from a configuration provider.
    pub fn new<C: HasCacheConfig>(config: &C, clock: SharedClock) -> Self {
        let cache_config = TtlCacheConfig::new()
            .with_name("query")
            .with_max_bytes(config.max_cache_bytes());

        Self {
            cache: TtlCache::new(cache_config, clock),
            max_age: config.max_query_age(),
        }
    }

    fn lookup(&self, query_id: Uuid) -> Option<Arc<QueryState>> {
        self.cache.get(&query_id.to_string())
    }

    fn next_expiry(&self) -> DateTime<Utc> {
        expires_after(self.cache.clock().now(), self.max_age)
    }

    /// Apply `f` to a live continuation under the cache lock and push its
    /// expiry out. A continuation removed or expired concurrently is
    /// never brought back.
    fn mutate<R>(&self, query_id: Uuid, f: impl FnOnce(&mut QueryResults) -> R) -> Option<R> {
        let expires_at = self.next_expiry();
        self.cache.update(&query_id.to_string(), |entry| {
            let result = {
                let mut results = entry.value.results.lock();
                f(&mut *results)
            };
            entry.expires_at = expires_at;
            result
        })
    }

    /// Register a new continuation with its first batch of results.
    ///
    /// Returns `false` if `query_id` is already registered; the existing
    /// continuation is left untouched.
    pub fn register_query_set(
        &self,
        query_id: Uuid,
        result_keys: &[Uuid],
        tag: Option<Value>,
        total_results: usize,
    ) -> bool {
        let state = Arc::new(QueryState::new(query_id, self.cache.clock().now()));
        {
            let mut results = state.results.lock();
            results.append(result_keys);
            results.total_results = total_results;
            results.tag = tag;
        }

        let stored = self.cache.insert_if_absent(
            query_id.to_string(),
            state,
            self.next_expiry(),
            CachePriority::Normal,
        );
        if !stored {
            debug!(query_id = %query_id, "Query already registered");
            return false;
        }

        debug!(query_id = %query_id, initial = result_keys.len(), total_results, "Registered query");
        true
    }

    /// Append more results to a registered continuation.
    ///
    /// Keys already present are skipped.
    pub fn add_results(&self, query_id: Uuid, result_keys: &[Uuid], total_results: usize) {
        let Some(added) = self.mutate(query_id, |results| {
            results.total_results = total_results;
            results.append(result_keys)
        }) else {
            trace!(query_id = %query_id, "Ignoring results for unknown query");
            return;
        };

        trace!(query_id = %query_id, added, total_results, "Appended query results");
    }

    /// Page through the accumulated result keys.
    pub fn get_query_results(&self, query_id: Uuid, offset: usize, count: usize) -> Vec<Uuid> {
        let Some(state) = self.lookup(query_id) else {
            return Vec::new();
        };
        let results = state.results.lock();
        results.keys.iter().skip(offset).take(count).copied().collect()
    }

    /// Total result count reported by the query, or 0 if unknown.
    pub fn query_result_total_quantity(&self, query_id: Uuid) -> usize {
        self.lookup(query_id)
            .map_or(0, |state| state.total_results())
    }

    /// Tag of a registered query.
    pub fn get_query_tag(&self, query_id: Uuid) -> Option<Value> {
        self.lookup(query_id)?.tag()
    }

    /// Replace the tag of a registered query.
    pub fn set_query_tag(&self, query_id: Uuid, tag: Value) {
        self.mutate(query_id, |results| results.tag = Some(tag));
    }

    /// Whether `query_id` is registered and not expired.
    pub fn is_registered(&self, query_id: Uuid) -> bool {
        self.cache.contains(&query_id.to_string())
    }

    /// Find the first live query whose tag equals `tag`.
    pub fn find_query_id(&self, tag: &Value) -> Option<Uuid> {
        self.cache
            .enumerate()
            .into_iter()
            .map(|(_, state)| state)
            .find(|state| state.results.lock().tag.as_ref() == Some(tag))
            .map(|state| state.query_id)
    }

    /// Drop a continuation. Returns `true` if it was registered.
    pub fn remove(&self, query_id: Uuid) -> bool {
        self.cache.remove(&query_id.to_string())
    }

    /// Number of open continuations.
    pub fn count(&self) -> usize {
        self.cache.count()
    }

    /// Sweep expired continuations and relieve capacity pressure.
    pub fn trim(&self) -> usize {
        self.cache.trim(medcache_types::config_defaults::TRIM_TARGET_PERCENT)
    }
}
