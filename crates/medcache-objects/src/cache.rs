//! Object cache with relationship-consistency invalidation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use medcache_cache::{CachePriority, TtlCache, TtlCacheConfig};
use medcache_types::{
    CacheEvent, HasCacheConfig, Observer, ObserverRegistry, SharedClock, expires_after,
};

use crate::consistency::{AssociationPolicy, AssociationUpdate, WalkContext};
use crate::error::Result;
use crate::model::{
    AssociationRef, BatchOperation, CachedType, DomainObject, Shape, TAG_GENERATED, TAG_REFETCH,
};
use crate::registry::TypeRegistry;

/// An object that passed the storage rules, ready to be written.
struct Admitted {
    key: String,
    object: DomainObject,
    size: usize,
    expires_at: DateTime<Utc>,
}

/// Cache of domain objects keyed by UUID.
///
/// Every read returns an independent copy. Every add and remove runs the
/// consistency walk inline before returning, so by the time a call
/// completes any cached object it made stale is gone (or patched).
///
/// The cache is cheap to clone; clones share storage and observers.
#[derive(Clone)]
pub struct ObjectCache {
    cache: TtlCache<DomainObject>,
    registry: Arc<TypeRegistry>,
    max_age: Duration,
    default_policy: AssociationPolicy,
    observers: Arc<ObserverRegistry<CacheEvent>>,
}

impl ObjectCache {
    /// Create an object cache.
    ///
    /// `registry` is built once at start-up and only consulted here.
    pub fn new<C: HasCacheConfig>(
        config: &C,
        registry: Arc<TypeRegistry>,
        clock: SharedClock,
    ) -> Self {
        let cache_config = TtlCacheConfig::new()
            .with_name("objects")
            .with_max_bytes(config.max_cache_bytes());

        Self {
            cache: TtlCache::new(cache_config, clock),
            registry,
            max_age: config.max_cache_age(),
            default_policy: AssociationPolicy::default(),
            observers: Arc::new(ObserverRegistry::new()),
        }
    }

    /// Set the association policy used by [`add`](Self::add) and
    /// [`remove`](Self::remove).
    pub fn with_default_policy(mut self, policy: AssociationPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn default_policy(&self) -> AssociationPolicy {
        self.default_policy
    }

    /// Register an observer for Added/Updated/Removed notifications.
    pub fn subscribe(&self, observer: Arc<dyn Observer<CacheEvent>>) {
        self.observers.subscribe(observer);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Add or update an object using the default association policy.
    pub fn add(&self, object: DomainObject) {
        self.add_with(object, self.default_policy);
    }

    /// Add or update an object using `policy` for any association change
    /// found while walking it.
    ///
    /// Objects without a key, of a non-cacheable kind, obsoleted, or
    /// tagged as generated are not stored, but the walk still runs.
    pub fn add_with(&self, object: DomainObject, policy: AssociationPolicy) {
        let mut ctx = WalkContext::new(policy);
        self.add_inner(object, &mut ctx);
    }

    /// Remove the entry under `key` and invalidate anything it links.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, key: Uuid) -> bool {
        let mut ctx = WalkContext::new(self.default_policy);
        match self.cache.take(&key.to_string()) {
            Some(object) => {
                self.notify_removed(key);
                self.remove_inner(object, &mut ctx);
                true
            }
            None => false,
        }
    }

    /// Remove `object` from the cache and invalidate anything it links,
    /// whether or not it was cached.
    pub fn remove_object(&self, object: DomainObject) {
        self.remove_object_with(object, self.default_policy);
    }

    /// [`remove_object`](Self::remove_object) with an explicit policy.
    pub fn remove_object_with(&self, object: DomainObject, policy: AssociationPolicy) {
        let mut ctx = WalkContext::new(policy);
        if let Some(key) = object.key() {
            self.evict(key);
        }
        self.remove_inner(object, &mut ctx);
    }

    fn add_inner(&self, object: DomainObject, ctx: &mut WalkContext) {
        self.walk(&object, ctx);

        let linked = match object.shape() {
            Shape::Association(_) => Vec::new(),
            _ => object.linked_keys(),
        };

        match self.store(object) {
            Ok(true) => {
                for key in linked {
                    self.evict(key);
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to cache object, skipping"),
        }
    }

    fn remove_inner(&self, object: DomainObject, ctx: &mut WalkContext) {
        let object = object.with_operation(BatchOperation::Delete);
        self.walk(&object, ctx);
    }

    /// Consistency walk over `object`.
    fn walk(&self, object: &DomainObject, ctx: &mut WalkContext) {
        if let Some(key) = object.key() {
            if !ctx.enter(key) {
                trace!(key = %key, "Already walked in this call");
                return;
            }
        }

        match object.shape() {
            Shape::Container(items) => {
                for item in items {
                    if item.meta().operation.is_delete() {
                        if let Some(key) = item.key() {
                            self.evict(key);
                        }
                        self.remove_inner(item.clone(), ctx);
                    } else {
                        self.add_inner(item.clone(), ctx);
                    }
                }
            }
            Shape::Association(link) => {
                let delete = object.meta().operation.is_delete();
                match ctx.policy {
                    AssociationPolicy::Evict => self.evict_link(link),
                    AssociationPolicy::Patch => self.patch_link(object, link, delete),
                }
            }
            Shape::Plain => {}
        }
    }

    fn evict_link(&self, link: AssociationRef) {
        self.evict(link.source_key);
        if let Some(target) = link.target_key {
            self.evict(target);
        }
    }

    fn patch_link(&self, object: &DomainObject, link: AssociationRef, delete: bool) {
        let Some(update) = AssociationUpdate::from_object(object) else {
            self.evict_link(link);
            return;
        };

        for host_key in std::iter::once(link.source_key).chain(link.target_key) {
            let Some(cached) = self.cache.peek(&host_key.to_string()) else {
                continue;
            };

            let mut host = cached.clone();
            if !update.apply_to(&mut host, delete) {
                self.evict(host_key);
                continue;
            }
            host.meta_mut().tags.insert(TAG_REFETCH.to_string());

            match self.restore_patched(host_key, &cached, host) {
                Ok(true) => debug!(key = %host_key, "Patched cached association host"),
                Ok(false) => {
                    debug!(key = %host_key, "Host changed while patching, evicting");
                    self.evict(host_key);
                }
                Err(e) => {
                    warn!(error = %e, key = %host_key, "Failed to re-store patched host");
                    self.evict(host_key);
                }
            }
        }
    }

    /// Write `patched` back over `host_key` only if the cache still holds
    /// `cached`. Returns `Ok(false)` if the entry changed or is gone.
    fn restore_patched(
        &self,
        host_key: Uuid,
        cached: &DomainObject,
        patched: DomainObject,
    ) -> Result<bool> {
        let Some(admitted) = self.admit(patched)? else {
            return Ok(false);
        };
        let replaced = self.cache.replace_if(
            &host_key.to_string(),
            admitted.object,
            admitted.expires_at,
            admitted.size,
            |live| live == cached,
        );
        if replaced {
            self.observers.notify(&CacheEvent::Updated {
                key: host_key.to_string(),
            });
        }
        Ok(replaced)
    }

    /// Apply the storage rules to `object`. Returns `Ok(None)` if the
    /// object is refused.
    fn admit(&self, mut object: DomainObject) -> Result<Option<Admitted>> {
        let Some(key) = object.key() else {
            trace!("Refusing object without a key");
            return Ok(None);
        };
        if !self.registry.is_cacheable(object.kind()) {
            trace!(key = %key, kind = ?object.kind(), "Refusing non-cacheable kind");
            return Ok(None);
        }
        let meta = object.meta();
        if meta.obsoleted || meta.has_tag(TAG_GENERATED) {
            trace!(key = %key, "Refusing obsoleted or generated object");
            return Ok(None);
        }

        object.meta_mut().strip_reserved_tags();
        let size = serde_json::to_vec(&object)?.len();
        Ok(Some(Admitted {
            key: key.to_string(),
            object,
            size,
            expires_at: expires_after(self.cache.clock().now(), self.max_age),
        }))
    }

    /// Store one object. Returns `Ok(false)` if the object is refused.
    fn store(&self, object: DomainObject) -> Result<bool> {
        let Some(Admitted {
            key,
            object,
            size,
            expires_at,
        }) = self.admit(object)?
        else {
            return Ok(false);
        };

        let replaced = self
            .cache
            .set_sized(key.as_str(), object, expires_at, CachePriority::Normal, size);

        let event = if replaced {
            CacheEvent::Updated { key }
        } else {
            CacheEvent::Added { key }
        };
        self.observers.notify(&event);
        Ok(true)
    }

    /// Drop `key` if cached, notifying observers.
    fn evict(&self, key: Uuid) {
        if self.cache.remove(&key.to_string()) {
            debug!(key = %key, "Evicted stale object");
            self.notify_removed(key);
        }
    }

    fn notify_removed(&self, key: Uuid) {
        self.observers.notify(&CacheEvent::Removed {
            key: key.to_string(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Get a copy of the object under `key`.
    pub fn get(&self, key: Uuid) -> Option<DomainObject> {
        self.cache.get(&key.to_string())
    }

    /// Get a copy of the object under `key` if it is a `T`.
    pub fn get_as<T: CachedType>(&self, key: Uuid) -> Option<T> {
        self.get(key).and_then(T::from_object)
    }

    /// Whether an entry exists under `key` and holds a `T`.
    pub fn exists<T: CachedType>(&self, key: Uuid) -> bool {
        self.cache
            .peek(&key.to_string())
            .is_some_and(|object| object.kind() == T::KIND)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Sweep expired entries and relieve capacity pressure.
    pub fn trim(&self) -> usize {
        self.cache.trim(medcache_types::config_defaults::TRIM_TARGET_PERCENT)
    }

    /// Approximate bytes held.
    pub fn size(&self) -> usize {
        self.cache.approximate_size()
    }

    /// Number of live entries.
    pub fn count(&self) -> usize {
        self.cache.count()
    }

    /// Drop every entry without notifying observers.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("cache", &self.cache)
            .field("max_age", &self.max_age)
            .field("default_policy", &self.default_policy)
            .field("observers", &self.observers.len())
            .finish()
    }
}
