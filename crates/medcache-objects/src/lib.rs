//! Domain object cache with relationship-consistency invalidation.
//!
//! [`ObjectCache`] keeps copies of domain objects keyed by their UUID. On
//! every add or remove it walks the incoming object once to find cached
//! entries that a change to it makes stale:
//! - a [`Bundle`] is expanded and each item is added or removed according
//!   to its own [`BatchOperation`]
//! - an association (relationship or participation) invalidates the cached
//!   copies of its source and target, either by eviction or by patching
//!   the embedded list in place (see [`AssociationPolicy`])
//!
//! Caching is best-effort: nothing in this crate's public API fails the
//! caller. Rejections and internal errors are logged and become no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use medcache_objects::{ObjectCache, TypeRegistry, Entity};
//!
//! let cache = ObjectCache::new(&settings, Arc::new(TypeRegistry::default()), clock);
//! cache.add(Entity::new(key, "Patient").into());
//! let patient: Option<Entity> = cache.get_as(key);
//! ```

mod cache;
mod consistency;
mod error;
mod model;
mod registry;

pub use cache::ObjectCache;
pub use consistency::{AssociationPolicy, AssociationUpdate};
pub use error::{ObjectCacheError, Result};
pub use model::{
    Act, ActParticipation, ActRelationship, AssociationRef, AuditEvent, BatchOperation, Bundle,
    CachedType, Concept, DomainObject, Entity, EntityRelationship, LoadMode, Note, ObjectKind,
    ObjectMeta, Shape, RESERVED_TAG_PREFIX, TAG_GENERATED, TAG_REFETCH,
};
pub use registry::{TypeCapabilities, TypeRegistry};
