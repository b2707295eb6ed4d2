//! External collaborators consulted by the session store.
//!
//! The store never decides policy itself. Every collaborator is injected
//! at construction and is required; there is no "allow when not
//! configured" fallback.

use std::sync::Arc;

use uuid::Uuid;

use crate::principal::{Identity, Principal};

/// Scope value requesting every policy the principal is granted.
pub const WILDCARD_SCOPE: &str = "*";

/// Policy identifiers the store checks itself.
pub mod policies {
    /// Permission to override (break-the-glass) disclosure rules.
    pub const OVERRIDE_DISCLOSURE: &str = "policy:override-disclosure";
}

/// Purpose-of-use values with special session handling.
pub mod purposes {
    /// Security administration. Never silently extended.
    pub const SECURITY_ADMIN: &str = "SECADM";
    /// Password change. Short-lived.
    pub const PASSWORD_CHANGE: &str = "PWD";
    /// Temporary session. Short-lived.
    pub const TEMPORARY: &str = "TEMP";
}

/// Outcome of a policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    Grant,
    /// Granted only if the session is established as an override.
    Elevate,
    Deny,
}

/// Demand refused by the enforcement service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Policy {policy_id} denied for {principal}")]
pub struct PolicyDenied {
    pub policy_id: String,
    pub principal: String,
}

/// Re-authentication failure reported by the identity provider.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct IdentityError(pub String);

/// Policy decision point.
pub trait PolicyDecisionService: Send + Sync {
    /// Every policy the principal is granted.
    fn effective_policies(&self, principal: &Principal) -> Vec<String>;

    /// Decision for one policy.
    fn policy_outcome(&self, principal: &Principal, policy_id: &str) -> PolicyOutcome;

    /// Drop any cached decisions for the principal.
    fn clear_cache(&self, principal: &Principal);
}

/// Policy enforcement point.
pub trait PolicyEnforcementService: Send + Sync {
    /// Succeed only if `principal` holds `policy_id`.
    fn demand(&self, principal: &Principal, policy_id: &str) -> Result<(), PolicyDenied>;
}

/// Identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Re-authenticate a principal during session extension.
    fn reauthenticate(&self, principal: &Principal) -> Result<Principal, IdentityError>;

    /// Resolve a user key to its identity.
    fn identity_for_user(&self, user_key: Uuid) -> Option<Identity>;
}

/// The collaborators a [`SessionStore`](crate::SessionStore) is built with.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub policy_decision: Arc<dyn PolicyDecisionService>,
    pub policy_enforcement: Arc<dyn PolicyEnforcementService>,
    pub identity_provider: Arc<dyn IdentityProvider>,
}

impl SessionCollaborators {
    pub fn new(
        policy_decision: Arc<dyn PolicyDecisionService>,
        policy_enforcement: Arc<dyn PolicyEnforcementService>,
        identity_provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            policy_decision,
            policy_enforcement,
            identity_provider,
        }
    }
}

impl std::fmt::Debug for SessionCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCollaborators").finish_non_exhaustive()
    }
}
