//! Start-up registry of which object kinds may be cached.

use std::collections::HashSet;

use tracing::debug;

use crate::model::ObjectKind;

/// Static capabilities declared by a domain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCapabilities {
    pub kind: ObjectKind,
    /// The type can be persisted and served on its own.
    pub serializable_root: bool,
    /// The type is explicitly excluded from caching.
    pub non_cacheable: bool,
}

impl TypeCapabilities {
    const fn root(kind: ObjectKind) -> Self {
        Self {
            kind,
            serializable_root: true,
            non_cacheable: false,
        }
    }

    /// Whether these capabilities exclude the type from caching.
    pub fn excludes_caching(&self) -> bool {
        self.non_cacheable || !self.serializable_root
    }
}

impl ObjectKind {
    /// Capabilities declared by this kind.
    pub const fn capabilities(self) -> TypeCapabilities {
        match self {
            // Audit records live in their own ledger and are never roots
            // of the clinical model.
            ObjectKind::AuditEvent => TypeCapabilities {
                kind: self,
                serializable_root: false,
                non_cacheable: false,
            },
            // Bundles are expanded, never stored as a unit.
            ObjectKind::Bundle => TypeCapabilities {
                kind: self,
                serializable_root: true,
                non_cacheable: true,
            },
            _ => TypeCapabilities::root(self),
        }
    }
}

/// Set of kinds the object cache refuses, built once at start-up.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    non_cacheable: HashSet<ObjectKind>,
}

impl TypeRegistry {
    /// Build the registry from declared capabilities.
    pub fn from_capabilities(capabilities: impl IntoIterator<Item = TypeCapabilities>) -> Self {
        let non_cacheable: HashSet<ObjectKind> = capabilities
            .into_iter()
            .filter(TypeCapabilities::excludes_caching)
            .map(|caps| caps.kind)
            .collect();

        debug!(non_cacheable = ?non_cacheable, "Built type registry");
        Self { non_cacheable }
    }

    /// Whether objects of `kind` may be cached.
    pub fn is_cacheable(&self, kind: ObjectKind) -> bool {
        !self.non_cacheable.contains(&kind)
    }

    /// Kinds excluded from caching.
    pub fn non_cacheable(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.non_cacheable.iter().copied()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::from_capabilities(ObjectKind::ALL.map(ObjectKind::capabilities))
    }
}
