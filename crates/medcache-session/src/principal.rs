//! Authenticated principals and their claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionToken;

/// Well-known claim types stamped on sessions.
pub mod claim_types {
    pub const SCOPE: &str = "scope";
    pub const PURPOSE_OF_USE: &str = "purposeOfUse";
    pub const OVERRIDE: &str = "override";
    pub const AUDIENCE: &str = "aud";
    pub const LANGUAGE: &str = "lang";
    pub const REMOTE_ENDPOINT: &str = "remoteEndpoint";
}

/// A typed fact about a principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    User,
    Device,
    Application,
}

/// One identity making up a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub kind: IdentityKind,
    /// Key of the user record, for user identities.
    pub user_key: Option<Uuid>,
    pub authenticated: bool,
}

impl Identity {
    /// An authenticated user identity.
    pub fn user(name: impl Into<String>, user_key: Uuid) -> Self {
        Self {
            name: name.into(),
            kind: IdentityKind::User,
            user_key: Some(user_key),
            authenticated: true,
        }
    }

    /// An authenticated application identity.
    pub fn application(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IdentityKind::Application,
            user_key: None,
            authenticated: true,
        }
    }
}

/// A session already issued and vetted by an upstream authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub session_id: SessionToken,
    pub refresh_token: Option<SessionToken>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub claims: Vec<Claim>,
}

/// An authenticated actor: one or more identities plus claims.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Principal {
    pub identities: Vec<Identity>,
    pub claims: Vec<Claim>,
    /// Finished token exchange, if an upstream authority already issued
    /// the session.
    pub token: Option<IssuedToken>,
}

impl Principal {
    pub fn new(identity: Identity) -> Self {
        Self {
            identities: vec![identity],
            ..Default::default()
        }
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identities.push(identity);
        self
    }

    pub fn with_claim(mut self, claim: Claim) -> Self {
        self.claims.push(claim);
        self
    }

    pub fn with_token(mut self, token: IssuedToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Whether any identity is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.identities.iter().any(|identity| identity.authenticated)
    }

    /// Name of the primary identity, for logs and events.
    pub fn name(&self) -> &str {
        self.identities
            .first()
            .map_or("anonymous", |identity| identity.name.as_str())
    }

    /// Whether one of the identities has `name` (case-insensitive).
    pub fn has_identity_named(&self, name: &str) -> bool {
        self.identities
            .iter()
            .any(|identity| identity.name.eq_ignore_ascii_case(name))
    }
}
