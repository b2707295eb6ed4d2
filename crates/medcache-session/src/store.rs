//! Session lifecycle store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use medcache_cache::{CachePriority, TtlCache, TtlCacheConfig};
use medcache_types::{
    HasSessionConfig, Observer, ObserverRegistry, SessionEvent, SharedClock, expires_after,
};

use crate::error::{Result, SessionError};
use crate::principal::{Claim, Identity, Principal, claim_types};
use crate::services::{
    PolicyOutcome, SessionCollaborators, WILDCARD_SCOPE, policies, purposes,
};
use crate::session::{Session, SessionToken};

/// Parameters of a session establishment.
#[derive(Debug, Clone)]
pub struct EstablishRequest {
    pub principal: Arc<Principal>,
    pub remote_address: Option<String>,
    /// Break-the-glass request. Needs a purpose and at least one scope.
    pub is_override: bool,
    pub purpose: Option<String>,
    /// Requested scopes. Empty or `*` alone means every granted policy.
    pub scopes: Vec<String>,
    pub language: Option<String>,
}

impl EstablishRequest {
    pub fn new(principal: impl Into<Arc<Principal>>) -> Self {
        Self {
            principal: principal.into(),
            remote_address: None,
            is_override: false,
            purpose: None,
            scopes: Vec::new(),
            language: None,
        }
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_override(mut self) -> Self {
        self.is_override = true;
        self
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Keyed, time-bounded store of authenticated sessions.
///
/// Sessions are indexed by id and by refresh token. An expired session
/// stays resolvable for the configured retention window so that
/// [`authenticate`](Self::authenticate) and [`extend`](Self::extend) can
/// report [`SessionError::Expired`] rather than `NotFound`; ordinary
/// lookups never return it.
pub struct SessionStore {
    sessions: TtlCache<Session>,
    /// Refresh token (hex) to session id (hex).
    refresh_index: TtlCache<String>,
    session_length: Duration,
    restricted_session_length: Duration,
    retention: Duration,
    audience: Option<String>,
    collaborators: SessionCollaborators,
    observers: ObserverRegistry<SessionEvent>,
}

impl SessionStore {
    /// Create a session store.
    pub fn new<C: HasSessionConfig>(
        config: &C,
        collaborators: SessionCollaborators,
        clock: SharedClock,
    ) -> Self {
        Self {
            sessions: TtlCache::new(TtlCacheConfig::new().with_name("sessions"), clock.clone()),
            refresh_index: TtlCache::new(
                TtlCacheConfig::new().with_name("refresh_tokens"),
                clock,
            ),
            session_length: config.session_length(),
            restricted_session_length: config.restricted_session_length(),
            retention: config.expired_session_retention(),
            audience: config.audience(),
            collaborators,
            observers: ObserverRegistry::new(),
        }
    }

    /// Register an observer for Established/Extended/Abandoned events.
    pub fn subscribe(&self, observer: Arc<dyn Observer<SessionEvent>>) {
        self.observers.subscribe(observer);
    }

    fn now(&self) -> DateTime<Utc> {
        self.sessions.clock().now()
    }

    fn length_for(&self, purpose: Option<&str>) -> Duration {
        let restricted = purpose.is_some_and(|purpose| {
            purpose.eq_ignore_ascii_case(purposes::PASSWORD_CHANGE)
                || purpose.eq_ignore_ascii_case(purposes::TEMPORARY)
        });
        if restricted {
            self.restricted_session_length
        } else {
            self.session_length
        }
    }

    fn index(&self, session: &Session) {
        let expires_at = expires_after(session.not_after(), self.retention);
        let id = session.id().to_string();
        if let Some(refresh) = session.refresh_token() {
            self.refresh_index.set_with_priority(
                refresh.to_string(),
                id.clone(),
                expires_at,
                CachePriority::NeverEvict,
            );
        }
        self.sessions
            .set_with_priority(id, session.clone(), expires_at, CachePriority::NeverEvict);
    }

    /// Remove both index entries and drop cached policy decisions for the
    /// session's principal. Returns the session if it was held.
    fn retire(&self, session_id: &SessionToken) -> Option<Session> {
        let session = self.sessions.take(&session_id.to_string())?;
        if let Some(refresh) = session.refresh_token() {
            self.refresh_index.remove(&refresh.to_string());
        }
        self.collaborators
            .policy_decision
            .clear_cache(session.principal());
        Some(session)
    }

    /// Put back a refresh token claimed by a failed extension, unless its
    /// session has gone in the meantime.
    fn release(&self, refresh_token: &SessionToken, session: &Session) {
        if !self.sessions.contains(&session.id().to_string()) {
            return;
        }
        self.refresh_index.insert_if_absent(
            refresh_token.to_string(),
            session.id().to_string(),
            expires_after(session.not_after(), self.retention),
            CachePriority::NeverEvict,
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Establish a new session.
    ///
    /// An Established event is raised whether or not this succeeds.
    pub fn establish(&self, request: EstablishRequest) -> Result<Session> {
        let principal = request.principal.name().to_string();
        let result = self.try_establish(request);

        match &result {
            Ok(session) => debug!(principal = %principal, session = ?session.id(), "Session established"),
            Err(e) => debug!(principal = %principal, error = %e, "Session establishment refused"),
        }
        self.observers.notify(&SessionEvent::Established {
            principal,
            session_id: result.as_ref().ok().map(|session| session.id().to_string()),
            success: result.is_ok(),
        });
        result
    }

    fn try_establish(&self, request: EstablishRequest) -> Result<Session> {
        let EstablishRequest {
            principal,
            remote_address,
            is_override,
            purpose,
            scopes,
            language,
        } = request;

        if !principal.is_authenticated() {
            return Err(SessionError::InvalidArgument(
                "principal is not authenticated".to_string(),
            ));
        }
        if is_override && (purpose.is_none() || scopes.is_empty()) {
            return Err(SessionError::InvalidArgument(
                "override requires a purpose of use and at least one scope".to_string(),
            ));
        }

        // Issued upstream: trust it and only index it locally.
        if let Some(token) = &principal.token {
            let session = Session::new(
                token.session_id.clone(),
                token.not_before,
                token.not_after,
                token.refresh_token.clone(),
                token.claims.clone(),
                Arc::clone(&principal),
            );
            self.index(&session);
            return Ok(session);
        }

        let decisions = &self.collaborators.policy_decision;
        let explicit: Vec<String> = scopes
            .into_iter()
            .filter(|scope| scope != WILDCARD_SCOPE)
            .collect();

        if is_override {
            self.collaborators
                .policy_enforcement
                .demand(&principal, policies::OVERRIDE_DISCLOSURE)
                .map_err(|e| SessionError::PolicyViolation(e.to_string()))?;
        }

        for scope in &explicit {
            match decisions.policy_outcome(&principal, scope) {
                PolicyOutcome::Grant => {}
                PolicyOutcome::Elevate if is_override => {}
                PolicyOutcome::Elevate => {
                    return Err(SessionError::PolicyViolation(format!(
                        "scope {scope} requires an override session"
                    )));
                }
                PolicyOutcome::Deny => {
                    return Err(SessionError::PolicyViolation(format!(
                        "scope {scope} is denied"
                    )));
                }
            }
        }

        let granted = if explicit.is_empty() {
            decisions.effective_policies(&principal)
        } else {
            explicit
        };

        let now = self.now();
        let not_after = expires_after(now, self.length_for(purpose.as_deref()));

        let mut claims: Vec<Claim> = granted
            .into_iter()
            .map(|scope| Claim::new(claim_types::SCOPE, scope))
            .collect();
        if let Some(purpose) = purpose {
            claims.push(Claim::new(claim_types::PURPOSE_OF_USE, purpose));
        }
        if is_override {
            claims.push(Claim::new(claim_types::OVERRIDE, "true"));
        }
        if let Some(audience) = &self.audience {
            claims.push(Claim::new(claim_types::AUDIENCE, audience.clone()));
        }
        if let Some(language) = language {
            claims.push(Claim::new(claim_types::LANGUAGE, language));
        }
        if let Some(address) = remote_address {
            claims.push(Claim::new(claim_types::REMOTE_ENDPOINT, address));
        }

        let session = Session::new(
            SessionToken::generate(),
            now,
            not_after,
            Some(SessionToken::generate()),
            claims,
            principal,
        );
        self.index(&session);
        Ok(session)
    }

    /// Resolve a session id to its principal.
    pub fn authenticate(&self, session_id: &SessionToken) -> Result<Arc<Principal>> {
        let session = self
            .sessions
            .get(&session_id.to_string())
            .ok_or_else(|| SessionError::NotFound(format!("{session_id:?}")))?;

        if session.is_expired_at(self.now()) {
            return Err(SessionError::Expired(format!("{session_id:?}")));
        }
        Ok(Arc::clone(session.principal()))
    }

    /// Replace the session behind `refresh_token` with a fresh one.
    ///
    /// The refresh token is claimed before anything else, so it can be
    /// redeemed at most once. The old session is retired the same way as
    /// by [`abandon`](Self::abandon), except that only an Extended event
    /// is raised.
    ///
    /// Override and security-administration sessions are never extended;
    /// they must be established again.
    pub fn extend(&self, refresh_token: &SessionToken) -> Result<Session> {
        let not_found = || SessionError::NotFound(format!("{refresh_token:?}"));
        let session_id = self
            .refresh_index
            .take(&refresh_token.to_string())
            .ok_or_else(not_found)?;
        let session = self.sessions.get(&session_id).ok_or_else(not_found)?;

        let result = self.renew(&session);
        match &result {
            Ok(_) => {}
            Err(SessionError::NotFound(_)) => {}
            Err(e) => {
                trace!(
                    session = ?session.id(),
                    error = %e,
                    "Extension refused, keeping refresh token"
                );
                self.release(refresh_token, &session);
            }
        }
        result
    }

    fn renew(&self, session: &Session) -> Result<Session> {
        let now = self.now();
        if session.is_expired_at(now) {
            return Err(SessionError::Expired(format!("{:?}", session.id())));
        }

        let elevated = session.is_override()
            || session
                .purpose()
                .is_some_and(|purpose| purpose.eq_ignore_ascii_case(purposes::SECURITY_ADMIN));
        if elevated {
            return Err(SessionError::PolicyViolation(
                "elevated sessions cannot be extended".to_string(),
            ));
        }

        let principal = self
            .collaborators
            .identity_provider
            .reauthenticate(session.principal())
            .map_err(|e| SessionError::Identity(e.to_string()))?;

        // Abandoned while re-authenticating.
        if self.retire(session.id()).is_none() {
            return Err(SessionError::NotFound(format!("{:?}", session.id())));
        }

        let renewed = Session::new(
            SessionToken::generate(),
            now,
            expires_after(now, self.length_for(session.purpose())),
            Some(SessionToken::generate()),
            session.claims().to_vec(),
            Arc::new(principal),
        );
        self.index(&renewed);

        debug!(
            principal = %renewed.principal().name(),
            previous = ?session.id(),
            session = ?renewed.id(),
            "Session extended"
        );
        self.observers.notify(&SessionEvent::Extended {
            principal: renewed.principal().name().to_string(),
            previous_session_id: session.id().to_string(),
            session_id: renewed.id().to_string(),
        });
        Ok(renewed)
    }

    /// End a session. Does nothing if it is already gone.
    pub fn abandon(&self, session_id: &SessionToken) {
        let Some(session) = self.retire(session_id) else {
            trace!(session = ?session_id, "Abandon of unknown session ignored");
            return;
        };

        debug!(principal = %session.principal().name(), session = ?session_id, "Session abandoned");
        self.observers.notify(&SessionEvent::Abandoned {
            principal: session.principal().name().to_string(),
            session_id: session_id.to_string(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────────────

    /// Get a session by id. Expired sessions are returned only when
    /// `allow_expired` is set, and only within the retention window.
    pub fn get(&self, session_id: &SessionToken, allow_expired: bool) -> Option<Session> {
        let session = self.sessions.get(&session_id.to_string())?;
        (allow_expired || !session.is_expired_at(self.now())).then_some(session)
    }

    /// Identities of the principal behind `session`.
    pub fn get_identities(&self, session: &Session) -> Vec<Identity> {
        session.principal().identities.clone()
    }

    /// Unexpired sessions of the user with `user_key`.
    pub fn get_user_sessions(&self, user_key: Uuid) -> Vec<Session> {
        let Some(identity) = self
            .collaborators
            .identity_provider
            .identity_for_user(user_key)
        else {
            trace!(user = %user_key, "No identity for user");
            return Vec::new();
        };

        self.get_active_sessions()
            .into_iter()
            .filter(|session| session.principal().has_identity_named(&identity.name))
            .collect()
    }

    /// Every unexpired session.
    pub fn get_active_sessions(&self) -> Vec<Session> {
        let now = self.now();
        self.sessions
            .enumerate()
            .into_iter()
            .map(|(_, session)| session)
            .filter(|session| !session.is_expired_at(now))
            .collect()
    }

    /// Number of unexpired sessions.
    pub fn count(&self) -> usize {
        self.get_active_sessions().len()
    }

    /// Drop sessions past their retention window.
    pub fn trim(&self) -> usize {
        let percent = medcache_types::config_defaults::TRIM_TARGET_PERCENT;
        let removed = self.sessions.trim(percent);
        self.refresh_index.trim(percent);
        removed
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_length", &self.session_length)
            .field("restricted_session_length", &self.restricted_session_length)
            .field("retention", &self.retention)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{IdentityKind, IssuedToken};
    use crate::services::{IdentityError, IdentityProvider};
    use parking_lot::Mutex;
    use std::sync::{OnceLock, Weak};
    use crate::testing::{
        StaticEnforcement, StaticIdentityProvider, StaticPolicyService, collaborators,
    };
    use medcache_types::{ManualClock, RecordingObserver, SessionSettings};

    const READ: &str = "policy:read-clinical";
    const WRITE: &str = "policy:write-clinical";
    const RESTRICTED: &str = "policy:read-restricted";
    const ADMIN: &str = "policy:administer";

    struct Fixture {
        store: SessionStore,
        clock: Arc<ManualClock>,
        policy: Arc<StaticPolicyService>,
        events: Arc<RecordingObserver<SessionEvent>>,
        user_key: Uuid,
    }

    fn fixture_with(identity: StaticIdentityProvider, user_key: Uuid) -> Fixture {
        let clock = Arc::new(ManualClock::starting_now());
        let policy = Arc::new(
            StaticPolicyService::new()
                .with(READ, PolicyOutcome::Grant)
                .with(WRITE, PolicyOutcome::Grant)
                .with(RESTRICTED, PolicyOutcome::Elevate)
                .with(ADMIN, PolicyOutcome::Deny),
        );
        let enforcement = StaticEnforcement::new().allow(policies::OVERRIDE_DISCLOSURE);
        let settings = SessionSettings {
            session_length_secs: 60,
            restricted_session_length_secs: 10,
            expired_session_retention_secs: 30,
            audience: Some("records".to_string()),
        };
        let store = SessionStore::new(
            &settings,
            collaborators(policy.clone(), enforcement, identity),
            clock.clone(),
        );
        let events = Arc::new(RecordingObserver::new());
        store.subscribe(events.clone());
        Fixture {
            store,
            clock,
            policy,
            events,
            user_key,
        }
    }

    fn fixture() -> Fixture {
        let user_key = Uuid::new_v4();
        fixture_with(
            StaticIdentityProvider::new().with_user(Identity::user("nurse", user_key)),
            user_key,
        )
    }

    fn nurse(f: &Fixture) -> Principal {
        Principal::new(Identity::user("nurse", f.user_key))
    }

    fn claim<'a>(session: &'a Session, claim_type: &'a str) -> Option<&'a str> {
        session.claim_values(claim_type).next()
    }

    #[test]
    fn test_establish_and_authenticate() {
        let f = fixture();
        let session = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_scope(READ)
                    .with_language("en")
                    .with_remote_address("10.0.0.7"),
            )
            .unwrap();

        assert_eq!(session.scopes(), vec![READ]);
        assert_eq!(claim(&session, claim_types::AUDIENCE), Some("records"));
        assert_eq!(claim(&session, claim_types::LANGUAGE), Some("en"));
        assert_eq!(claim(&session, claim_types::REMOTE_ENDPOINT), Some("10.0.0.7"));
        assert!(session.refresh_token().is_some());

        let principal = f.store.authenticate(session.id()).unwrap();
        assert_eq!(principal.name(), "nurse");
        assert_eq!(f.store.count(), 1);
    }

    #[test]
    fn test_wildcard_expands_to_granted_policies() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(WILDCARD_SCOPE))
            .unwrap();
        assert_eq!(session.scopes(), vec![READ, WRITE]);

        let explicit = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_scope(WILDCARD_SCOPE)
                    .with_scope(WRITE),
            )
            .unwrap();
        assert_eq!(explicit.scopes(), vec![WRITE]);
    }

    #[test]
    fn test_establish_rejections() {
        let f = fixture();
        let anonymous = Principal::new(Identity {
            name: "anonymous".to_string(),
            kind: IdentityKind::User,
            user_key: None,
            authenticated: false,
        });
        assert!(matches!(
            f.store.establish(EstablishRequest::new(anonymous)),
            Err(SessionError::InvalidArgument(_))
        ));

        assert!(matches!(
            f.store
                .establish(EstablishRequest::new(nurse(&f)).with_override().with_scope(READ)),
            Err(SessionError::InvalidArgument(_))
        ));

        assert!(matches!(
            f.store.establish(EstablishRequest::new(nurse(&f)).with_scope(ADMIN)),
            Err(SessionError::PolicyViolation(_))
        ));

        assert!(matches!(
            f.store.establish(EstablishRequest::new(nurse(&f)).with_scope(RESTRICTED)),
            Err(SessionError::PolicyViolation(_))
        ));

        assert_eq!(f.store.count(), 0);
    }

    #[test]
    fn test_override_session() {
        let f = fixture();
        let session = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_override()
                    .with_purpose("EMERG")
                    .with_scope(RESTRICTED),
            )
            .unwrap();

        assert!(session.is_override());
        assert_eq!(session.purpose(), Some("EMERG"));
        assert_eq!(session.scopes(), vec![RESTRICTED]);
    }

    #[test]
    fn test_override_requires_enforcement_grant() {
        let user_key = Uuid::new_v4();
        let clock = Arc::new(ManualClock::starting_now());
        let policy = Arc::new(StaticPolicyService::new().with(RESTRICTED, PolicyOutcome::Elevate));
        let store = SessionStore::new(
            &SessionSettings::default(),
            collaborators(policy, StaticEnforcement::new(), StaticIdentityProvider::new()),
            clock,
        );

        let result = store.establish(
            EstablishRequest::new(Principal::new(Identity::user("nurse", user_key)))
                .with_override()
                .with_purpose("EMERG")
                .with_scope(RESTRICTED),
        );
        assert!(matches!(result, Err(SessionError::PolicyViolation(_))));
    }

    #[test]
    fn test_established_event_raised_on_failure_too() {
        let f = fixture();
        let _ = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(ADMIN));
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();

        assert_eq!(
            f.events.events(),
            vec![
                SessionEvent::Established {
                    principal: "nurse".to_string(),
                    session_id: None,
                    success: false,
                },
                SessionEvent::Established {
                    principal: "nurse".to_string(),
                    session_id: Some(session.id().to_string()),
                    success: true,
                },
            ]
        );
    }

    #[test]
    fn test_expiry_boundary() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();

        f.clock.advance(Duration::from_millis(59_999));
        assert!(f.store.authenticate(session.id()).is_ok());

        f.clock.advance(Duration::from_millis(1));
        assert!(matches!(
            f.store.authenticate(session.id()),
            Err(SessionError::Expired(_))
        ));
        assert!(f.store.get(session.id(), false).is_none());
        assert!(f.store.get(session.id(), true).is_some());
        assert!(f.store.get_active_sessions().is_empty());

        // Past the retention window it is simply gone.
        f.clock.advance(Duration::from_secs(30));
        assert!(matches!(
            f.store.authenticate(session.id()),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_restricted_purposes_are_short_lived() {
        let f = fixture();
        let session = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_purpose(purposes::PASSWORD_CHANGE)
                    .with_scope(READ),
            )
            .unwrap();
        assert_eq!(
            session.not_after() - session.not_before(),
            chrono::Duration::seconds(10)
        );
    }

    #[test]
    fn test_extend_replaces_session() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();
        f.clock.advance(Duration::from_secs(30));

        let refresh = session.refresh_token().unwrap().clone();
        let renewed = f.store.extend(&refresh).unwrap();

        assert_ne!(renewed.id(), session.id());
        assert_ne!(renewed.refresh_token(), session.refresh_token());
        assert_eq!(renewed.claims(), session.claims());
        assert!(renewed.not_after() > session.not_after());
        assert!(matches!(
            f.store.authenticate(session.id()),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            f.store.extend(&refresh),
            Err(SessionError::NotFound(_))
        ));
        assert!(f.store.authenticate(renewed.id()).is_ok());

        assert!(f.events.events().iter().any(|event| matches!(
            event,
            SessionEvent::Extended { session_id, .. } if *session_id == renewed.id().to_string()
        )));
        assert!(!f
            .events
            .events()
            .iter()
            .any(|event| matches!(event, SessionEvent::Abandoned { .. })));
        // Decisions cached for the old principal do not outlive it.
        assert_eq!(f.policy.cleared(), vec!["nurse".to_string()]);
    }

    /// Identity provider that runs one store operation from inside
    /// re-authentication, the way a request racing the extension would.
    #[derive(Default)]
    struct InterleavingIdentity {
        store: OnceLock<Weak<SessionStore>>,
        during: Mutex<Option<Box<dyn FnOnce(&SessionStore) + Send>>>,
    }

    impl IdentityProvider for InterleavingIdentity {
        fn reauthenticate(
            &self,
            principal: &Principal,
        ) -> std::result::Result<Principal, IdentityError> {
            let during = self.during.lock().take();
            let store = self.store.get().and_then(Weak::upgrade);
            if let (Some(during), Some(store)) = (during, store) {
                during(&store);
            }
            Ok(principal.clone())
        }

        fn identity_for_user(&self, _user_key: Uuid) -> Option<Identity> {
            None
        }
    }

    fn interleaved_store() -> (Arc<SessionStore>, Arc<InterleavingIdentity>, Session) {
        let identity = Arc::new(InterleavingIdentity::default());
        let policy = Arc::new(StaticPolicyService::new().with(READ, PolicyOutcome::Grant));
        let store = Arc::new(SessionStore::new(
            &SessionSettings::default(),
            SessionCollaborators::new(
                policy,
                Arc::new(StaticEnforcement::new()),
                identity.clone(),
            ),
            Arc::new(ManualClock::starting_now()),
        ));
        let _ = identity.store.set(Arc::downgrade(&store));

        let session = store
            .establish(
                EstablishRequest::new(Principal::new(Identity::user("nurse", Uuid::new_v4())))
                    .with_scope(READ),
            )
            .unwrap();
        (store, identity, session)
    }

    #[test]
    fn test_refresh_token_redeemed_once() {
        let (store, identity, session) = interleaved_store();
        let refresh = session.refresh_token().unwrap().clone();

        let nested = Arc::new(Mutex::new(None));
        *identity.during.lock() = Some(Box::new({
            let nested = nested.clone();
            let refresh = refresh.clone();
            move |store: &SessionStore| *nested.lock() = Some(store.extend(&refresh))
        }));

        let renewed = store.extend(&refresh).unwrap();

        assert!(matches!(
            nested.lock().take(),
            Some(Err(SessionError::NotFound(_)))
        ));
        assert_eq!(store.get_active_sessions().len(), 1);
        assert!(store.authenticate(renewed.id()).is_ok());
        assert!(matches!(
            store.extend(&refresh),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_extend_of_session_abandoned_meanwhile() {
        let (store, identity, session) = interleaved_store();
        let abandoned = session.id().clone();
        *identity.during.lock() = Some(Box::new(move |store: &SessionStore| {
            store.abandon(&abandoned);
        }));

        let result = store.extend(session.refresh_token().unwrap());

        assert!(matches!(result, Err(SessionError::NotFound(_))));
        assert!(store.get_active_sessions().is_empty());
    }

    #[test]
    fn test_extend_expired_session() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();
        f.clock.advance(Duration::from_secs(60));

        let refresh = session.refresh_token().unwrap();
        assert!(matches!(
            f.store.extend(refresh),
            Err(SessionError::Expired(_))
        ));
        assert!(matches!(
            f.store.extend(&SessionToken::generate()),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_extend_rejects_elevated_sessions() {
        let f = fixture();
        let override_session = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_override()
                    .with_purpose("EMERG")
                    .with_scope(RESTRICTED),
            )
            .unwrap();
        let admin_session = f
            .store
            .establish(
                EstablishRequest::new(nurse(&f))
                    .with_purpose(purposes::SECURITY_ADMIN)
                    .with_scope(READ),
            )
            .unwrap();

        for session in [&override_session, &admin_session] {
            let refresh = session.refresh_token().unwrap();
            // A refused extension does not spend the refresh token.
            for _ in 0..2 {
                assert!(matches!(
                    f.store.extend(refresh),
                    Err(SessionError::PolicyViolation(_))
                ));
            }
            assert!(f.store.authenticate(session.id()).is_ok());
        }
    }

    #[test]
    fn test_extend_surfaces_identity_failure() {
        let user_key = Uuid::new_v4();
        let f = fixture_with(StaticIdentityProvider::new().rejecting(), user_key);
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();

        let result = f.store.extend(session.refresh_token().unwrap());
        assert!(matches!(result, Err(SessionError::Identity(_))));
        assert!(f.store.authenticate(session.id()).is_ok());
        assert!(matches!(
            f.store.extend(session.refresh_token().unwrap()),
            Err(SessionError::Identity(_))
        ));
        assert!(f.policy.cleared().is_empty());
    }

    #[test]
    fn test_abandon() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();

        f.store.abandon(session.id());
        f.store.abandon(session.id());

        assert!(matches!(
            f.store.authenticate(session.id()),
            Err(SessionError::NotFound(_))
        ));
        assert!(matches!(
            f.store.extend(session.refresh_token().unwrap()),
            Err(SessionError::NotFound(_))
        ));
        assert_eq!(f.policy.cleared(), vec!["nurse".to_string()]);

        let abandoned = f
            .events
            .events()
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::Abandoned { .. }))
            .count();
        assert_eq!(abandoned, 1);
    }

    #[test]
    fn test_upstream_token_is_trusted() {
        let f = fixture();
        let now = DateTime::<Utc>::UNIX_EPOCH;
        f.clock.set(now);
        let token = IssuedToken {
            session_id: SessionToken::from_bytes(vec![1, 2, 3]),
            refresh_token: None,
            not_before: now,
            not_after: now + chrono::Duration::seconds(5),
            claims: vec![Claim::new(claim_types::SCOPE, ADMIN)],
        };
        let principal = nurse(&f).with_token(token);

        // ADMIN is denied locally, but the upstream decision stands.
        let session = f
            .store
            .establish(EstablishRequest::new(principal).with_scope(ADMIN))
            .unwrap();
        assert_eq!(session.id().as_bytes(), &[1, 2, 3]);
        assert_eq!(session.scopes(), vec![ADMIN]);
        assert!(f.store.authenticate(session.id()).is_ok());
    }

    #[test]
    fn test_user_and_identity_lookups() {
        let f = fixture();
        let session = f
            .store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();
        f.store
            .establish(
                EstablishRequest::new(Principal::new(Identity::user("doctor", Uuid::new_v4())))
                    .with_scope(READ),
            )
            .unwrap();

        let sessions = f.store.get_user_sessions(f.user_key);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id(), session.id());
        assert!(f.store.get_user_sessions(Uuid::new_v4()).is_empty());

        let identities = f.store.get_identities(&session);
        assert_eq!(identities[0].name, "nurse");
        assert_eq!(f.store.get_active_sessions().len(), 2);
    }

    #[test]
    fn test_trim_drops_sessions_past_retention() {
        let f = fixture();
        f.store
            .establish(EstablishRequest::new(nurse(&f)).with_scope(READ))
            .unwrap();

        f.clock.advance(Duration::from_secs(61));
        assert_eq!(f.store.trim(), 0);

        f.clock.advance(Duration::from_secs(30));
        assert_eq!(f.store.trim(), 1);
    }
}
