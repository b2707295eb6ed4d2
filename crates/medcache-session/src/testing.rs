//! In-memory collaborators for tests.
//!
//! Available inside this crate's tests and, for downstream crates, with
//! the `testing` feature.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::principal::{Identity, Principal};
use crate::services::{
    IdentityError, IdentityProvider, PolicyDecisionService, PolicyDenied,
    PolicyEnforcementService, PolicyOutcome, SessionCollaborators,
};

/// Policy decision point with a fixed outcome per policy. Unknown
/// policies are denied.
#[derive(Debug, Default)]
pub struct StaticPolicyService {
    outcomes: HashMap<String, PolicyOutcome>,
    cleared: Mutex<Vec<String>>,
}

impl StaticPolicyService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy_id: impl Into<String>, outcome: PolicyOutcome) -> Self {
        self.outcomes.insert(policy_id.into(), outcome);
        self
    }

    /// Names of principals whose cached decisions were cleared, in order.
    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().clone()
    }
}

impl PolicyDecisionService for StaticPolicyService {
    fn effective_policies(&self, _principal: &Principal) -> Vec<String> {
        let mut granted: Vec<String> = self
            .outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == PolicyOutcome::Grant)
            .map(|(policy, _)| policy.clone())
            .collect();
        granted.sort();
        granted
    }

    fn policy_outcome(&self, _principal: &Principal, policy_id: &str) -> PolicyOutcome {
        self.outcomes
            .get(policy_id)
            .copied()
            .unwrap_or(PolicyOutcome::Deny)
    }

    fn clear_cache(&self, principal: &Principal) {
        self.cleared.lock().push(principal.name().to_string());
    }
}

/// Enforcement point that allows a fixed set of policies.
#[derive(Debug, Default)]
pub struct StaticEnforcement {
    allowed: HashSet<String>,
}

impl StaticEnforcement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, policy_id: impl Into<String>) -> Self {
        self.allowed.insert(policy_id.into());
        self
    }
}

impl PolicyEnforcementService for StaticEnforcement {
    fn demand(&self, principal: &Principal, policy_id: &str) -> Result<(), PolicyDenied> {
        if self.allowed.contains(policy_id) {
            Ok(())
        } else {
            Err(PolicyDenied {
                policy_id: policy_id.to_string(),
                principal: principal.name().to_string(),
            })
        }
    }
}

/// Identity provider backed by a fixed user table.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<Uuid, Identity>,
    reject_reauthentication: bool,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, identity: Identity) -> Self {
        if let Some(key) = identity.user_key {
            self.users.insert(key, identity);
        }
        self
    }

    /// Make every re-authentication fail.
    pub fn rejecting(mut self) -> Self {
        self.reject_reauthentication = true;
        self
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn reauthenticate(&self, principal: &Principal) -> Result<Principal, IdentityError> {
        if self.reject_reauthentication {
            return Err(IdentityError(format!(
                "{} is no longer active",
                principal.name()
            )));
        }
        Ok(principal.clone())
    }

    fn identity_for_user(&self, user_key: Uuid) -> Option<Identity> {
        self.users.get(&user_key).cloned()
    }
}

/// Bundle the three static collaborators.
pub fn collaborators(
    policy: Arc<StaticPolicyService>,
    enforcement: StaticEnforcement,
    identity: StaticIdentityProvider,
) -> SessionCollaborators {
    SessionCollaborators::new(policy, Arc::new(enforcement), Arc::new(identity))
}
