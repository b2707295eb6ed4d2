//! Session records and their identifiers.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;

use medcache_cache::EstimateSize;

use crate::principal::{Claim, Principal, claim_types};

/// Length of generated session ids and refresh tokens, in bytes.
pub const TOKEN_LENGTH: usize = 16;

/// Opaque session id or refresh token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(Vec<u8>);

impl SessionToken {
    /// Fresh random token.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; TOKEN_LENGTH];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the hex form produced by `Display`.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to correlate log lines without leaking the credential.
        let hex = hex::encode(&self.0);
        write!(f, "SessionToken({}…)", &hex[..hex.len().min(8)])
    }
}

/// An authenticated session.
///
/// Immutable: extending a session replaces it with a new one.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionToken,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
    refresh_token: Option<SessionToken>,
    claims: Vec<Claim>,
    principal: Arc<Principal>,
}

impl Session {
    pub fn new(
        id: SessionToken,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        refresh_token: Option<SessionToken>,
        claims: Vec<Claim>,
        principal: Arc<Principal>,
    ) -> Self {
        Self {
            id,
            not_before,
            not_after,
            refresh_token,
            claims,
            principal,
        }
    }

    pub fn id(&self) -> &SessionToken {
        &self.id
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn refresh_token(&self) -> Option<&SessionToken> {
        self.refresh_token.as_ref()
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn principal(&self) -> &Arc<Principal> {
        &self.principal
    }

    /// Whether the session is past its expiry at `now`. A session is
    /// already expired at exactly `not_after`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_after
    }

    /// Values of every claim of `claim_type`.
    pub fn claim_values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |claim| claim.claim_type == claim_type)
            .map(|claim| claim.value.as_str())
    }

    /// Granted scopes.
    pub fn scopes(&self) -> Vec<&str> {
        self.claim_values(claim_types::SCOPE).collect()
    }

    /// Purpose of use, if one was given.
    pub fn purpose(&self) -> Option<&str> {
        self.claim_values(claim_types::PURPOSE_OF_USE).next()
    }

    /// Whether the session was established as an override (break-the-glass).
    pub fn is_override(&self) -> bool {
        self.claim_values(claim_types::OVERRIDE)
            .any(|value| value.eq_ignore_ascii_case("true"))
    }
}

impl EstimateSize for Session {
    fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.id.0.len()
            + self.refresh_token.as_ref().map_or(0, |token| token.0.len())
            + self
                .claims
                .iter()
                .map(|claim| claim.claim_type.len() + claim.value.len())
                .sum::<usize>()
    }
}
