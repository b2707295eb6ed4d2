//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use medcache::{CacheServices, CacheSettings, ManualClock, SessionSettings};
use medcache_session::testing::{
    StaticEnforcement, StaticIdentityProvider, StaticPolicyService, collaborators,
};
use medcache_session::{Identity, PolicyOutcome, Principal, policies};

pub const READ: &str = "policy:read-clinical";
pub const RESTRICTED: &str = "policy:read-restricted";

/// Services on a manual clock with short lifetimes.
pub struct TestServices {
    pub services: CacheServices,
    pub clock: Arc<ManualClock>,
    pub policy: Arc<StaticPolicyService>,
    pub user_key: Uuid,
}

impl TestServices {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let user_key = Uuid::new_v4();
        let policy = Arc::new(
            StaticPolicyService::new()
                .with(READ, PolicyOutcome::Grant)
                .with(RESTRICTED, PolicyOutcome::Elevate),
        );
        let cache = CacheSettings {
            max_cache_age_secs: 60,
            max_query_age_secs: 120,
            ..Default::default()
        };
        let session = SessionSettings {
            session_length_secs: 300,
            expired_session_retention_secs: 60,
            ..Default::default()
        };

        let services = CacheServices::with_clock(
            &cache,
            &session,
            collaborators(
                policy.clone(),
                StaticEnforcement::new().allow(policies::OVERRIDE_DISCLOSURE),
                StaticIdentityProvider::new().with_user(Identity::user("nurse", user_key)),
            ),
            clock.clone(),
        );

        Self {
            services,
            clock,
            policy,
            user_key,
        }
    }

    pub fn nurse(&self) -> Principal {
        Principal::new(Identity::user("nurse", self.user_key))
    }
}
