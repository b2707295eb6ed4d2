//! Cache services facade.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use medcache_cache::{AdHocCache, QueryCache};
use medcache_objects::{AssociationPolicy, ObjectCache, TypeRegistry};
use medcache_session::{SessionCollaborators, SessionStore};
use medcache_types::{
    CacheSettings, HasCacheConfig, HasSessionConfig, SessionSettings, SharedClock, SystemClock,
};

use crate::error::{Error, Result};

/// Combined settings, typically deserialised from the host's
/// configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub session: SessionSettings,
}

/// Entries removed by one [`CacheServices::trim_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub objects: usize,
    pub adhoc: usize,
    pub queries: usize,
    pub sessions: usize,
}

impl TrimReport {
    pub fn total(&self) -> usize {
        self.objects + self.adhoc + self.queries + self.sessions
    }
}

/// Every cache of the layer, built from one configuration and sharing
/// one clock.
///
/// Cheap to clone; clones share all caches.
#[derive(Clone, Debug)]
pub struct CacheServices {
    objects: ObjectCache,
    adhoc: AdHocCache,
    queries: QueryCache,
    sessions: Arc<SessionStore>,
    clock: SharedClock,
}

impl CacheServices {
    /// Build all caches on the system clock.
    pub fn new<C, S>(cache_config: &C, session_config: &S, collaborators: SessionCollaborators) -> Self
    where
        C: HasCacheConfig,
        S: HasSessionConfig,
    {
        Self::with_clock(cache_config, session_config, collaborators, SystemClock::shared())
    }

    /// Build all caches from combined [`Settings`].
    pub fn from_settings(settings: &Settings, collaborators: SessionCollaborators) -> Self {
        Self::new(&settings.cache, &settings.session, collaborators)
    }

    /// Build all caches on an explicit clock.
    pub fn with_clock<C, S>(
        cache_config: &C,
        session_config: &S,
        collaborators: SessionCollaborators,
        clock: SharedClock,
    ) -> Self
    where
        C: HasCacheConfig,
        S: HasSessionConfig,
    {
        Self::with_registry(
            cache_config,
            session_config,
            collaborators,
            clock,
            Arc::new(TypeRegistry::default()),
        )
    }

    /// Build all caches on an explicit clock, consulting `registry` for
    /// which object kinds may be cached.
    pub fn with_registry<C, S>(
        cache_config: &C,
        session_config: &S,
        collaborators: SessionCollaborators,
        clock: SharedClock,
        registry: Arc<TypeRegistry>,
    ) -> Self
    where
        C: HasCacheConfig,
        S: HasSessionConfig,
    {
        info!(
            max_cache_size_mb = cache_config.max_cache_size_mb(),
            max_cache_age_secs = cache_config.max_cache_age().as_secs(),
            max_query_age_secs = cache_config.max_query_age().as_secs(),
            session_length_secs = session_config.session_length().as_secs(),
            "Initializing cache services"
        );

        Self {
            objects: ObjectCache::new(cache_config, registry, clock.clone()),
            adhoc: AdHocCache::new(cache_config, clock.clone()),
            queries: QueryCache::new(cache_config, clock.clone()),
            sessions: Arc::new(SessionStore::new(session_config, collaborators, clock.clone())),
            clock,
        }
    }

    /// Use `policy` as the object cache's default association policy.
    pub fn with_association_policy(mut self, policy: AssociationPolicy) -> Self {
        self.objects = self.objects.with_default_policy(policy);
        self
    }

    /// Get the object cache.
    pub fn objects(&self) -> &ObjectCache {
        &self.objects
    }

    /// Get the ad-hoc cache.
    pub fn adhoc(&self) -> &AdHocCache {
        &self.adhoc
    }

    /// Get the query continuation cache.
    pub fn queries(&self) -> &QueryCache {
        &self.queries
    }

    /// Get the session store.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Get the shared clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Trim every cache once.
    pub fn trim_all(&self) -> TrimReport {
        let report = TrimReport {
            objects: self.objects.trim(),
            adhoc: self.adhoc.trim(),
            queries: self.queries.trim(),
            sessions: self.sessions.trim(),
        };
        if report.total() > 0 {
            debug!(
                objects = report.objects,
                adhoc = report.adhoc,
                queries = report.queries,
                sessions = report.sessions,
                "Trimmed caches"
            );
        }
        report
    }

    /// Run [`trim_all`](Self::trim_all) every `period` on the current
    /// tokio runtime until the returned handle is aborted.
    ///
    /// The first pass runs one full `period` after spawning.
    pub fn spawn_maintenance(&self, period: Duration) -> Result<JoinHandle<()>> {
        if period.is_zero() {
            return Err(Error::Config(
                "maintenance period must be non-zero".to_string(),
            ));
        }

        let services = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                services.trim_all();
            }
        }))
    }
}
