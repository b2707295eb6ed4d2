//! Session lifecycle store.
//!
//! [`SessionStore`] establishes, authenticates, extends and abandons
//! sessions for authenticated [`Principal`]s. Policy decisions and
//! re-authentication are delegated to injected collaborators (see
//! [`SessionCollaborators`]); the store only enforces the lifecycle:
//!
//! - a session is immutable and expires at exactly its `not_after`
//! - extension replaces the session, and is refused for override and
//!   security-administration sessions
//! - expiry is reported as [`SessionError::Expired`] by `authenticate` and
//!   `extend`, while ordinary lookups simply miss
//!
//! # Example
//!
//! ```rust,ignore
//! use medcache_session::{EstablishRequest, SessionStore};
//!
//! let store = SessionStore::new(&settings, collaborators, clock);
//! let session = store.establish(EstablishRequest::new(principal).with_scope("*"))?;
//! let principal = store.authenticate(session.id())?;
//! ```

mod error;
mod principal;
mod services;
mod session;
mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Result, SessionError};
pub use principal::{Claim, Identity, IdentityKind, IssuedToken, Principal, claim_types};
pub use services::{
    IdentityError, IdentityProvider, PolicyDecisionService, PolicyDenied,
    PolicyEnforcementService, PolicyOutcome, SessionCollaborators, WILDCARD_SCOPE, policies,
    purposes,
};
pub use session::{Session, SessionToken, TOKEN_LENGTH};
pub use store::{EstablishRequest, SessionStore};
