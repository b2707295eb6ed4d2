//! In-process caching layer for a health-record server.
//!
//! This crate wires the individual caches into one [`CacheServices`]
//! facade built from a single configuration:
//!
//! - **Objects**: domain objects with relationship-consistency
//!   invalidation ([`ObjectCache`])
//! - **Ad-hoc**: arbitrary typed values under caller-chosen keys
//!   ([`AdHocCache`])
//! - **Queries**: continuation state for paged queries ([`QueryCache`])
//! - **Sessions**: the authenticated session lifecycle ([`SessionStore`])
//!
//! Trimming is driven externally, either by calling
//! [`CacheServices::trim_all`] or by [`CacheServices::spawn_maintenance`].
//!
//! # Example
//!
//! ```ignore
//! use medcache::{CacheServices, Settings};
//!
//! medcache::logging::init(false);
//! let services = CacheServices::from_settings(&Settings::default(), collaborators);
//! let _maintenance = services.spawn_maintenance(Duration::from_secs(60))?;
//!
//! services.objects().add(patient.into());
//! let session = services.sessions().establish(request)?;
//! ```

mod error;
pub mod logging;
mod services;

pub use error::{Error, Result};
pub use services::{CacheServices, Settings, TrimReport};

// Re-export the cache types for convenience
pub use medcache_cache::{AdHocCache, QueryCache};
pub use medcache_objects::{AssociationPolicy, DomainObject, ObjectCache, TypeRegistry};
pub use medcache_session::{EstablishRequest, Session, SessionCollaborators, SessionStore};
pub use medcache_types::{
    CacheEvent, CacheSettings, Clock, ManualClock, Observer, SessionEvent, SessionSettings,
    SharedClock, SystemClock,
};
