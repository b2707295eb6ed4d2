//! Association updates applied to cached host objects.

use std::collections::HashSet;

use uuid::Uuid;

use crate::model::{ActParticipation, ActRelationship, DomainObject, EntityRelationship};

/// How an association change invalidates the cached source and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssociationPolicy {
    /// Evict the cached source and target.
    #[default]
    Evict,
    /// Patch the association into the cached hosts' embedded lists and
    /// re-store them tagged for refetch. Falls back to eviction when a
    /// host has no list for the association.
    Patch,
}

/// An association change, one variant per embeddable association kind.
#[derive(Debug, Clone, PartialEq)]
pub enum AssociationUpdate {
    EntityRelationship(EntityRelationship),
    ActRelationship(ActRelationship),
    Participation(ActParticipation),
}

trait Keyed {
    fn key(&self) -> Option<Uuid>;
}

impl Keyed for EntityRelationship {
    fn key(&self) -> Option<Uuid> {
        self.key
    }
}

impl Keyed for ActRelationship {
    fn key(&self) -> Option<Uuid> {
        self.key
    }
}

impl Keyed for ActParticipation {
    fn key(&self) -> Option<Uuid> {
        self.key
    }
}

/// Replace-or-append `item` in `list`, or remove it on delete.
///
/// Returns `false` for a keyless item, which cannot be matched.
fn upsert<T: Keyed + Clone>(list: &mut Vec<T>, item: &T, delete: bool) -> bool {
    let Some(key) = item.key() else {
        return false;
    };

    if delete {
        list.retain(|existing| existing.key() != Some(key));
    } else if let Some(existing) = list.iter_mut().find(|existing| existing.key() == Some(key)) {
        *existing = item.clone();
    } else {
        list.push(item.clone());
    }
    true
}

impl AssociationUpdate {
    /// The update carried by `object`, if it is an embeddable association.
    pub fn from_object(object: &DomainObject) -> Option<Self> {
        match object {
            DomainObject::EntityRelationship(r) => Some(Self::EntityRelationship(r.clone())),
            DomainObject::ActRelationship(r) => Some(Self::ActRelationship(r.clone())),
            DomainObject::ActParticipation(p) => Some(Self::Participation(p.clone())),
            _ => None,
        }
    }

    /// Apply the update to the host's matching embedded list.
    ///
    /// Returns `true` if `host` has a list for this association and the
    /// host is the side that embeds it. Applying the same update twice
    /// leaves the host as applying it once.
    pub fn apply_to(&self, host: &mut DomainObject, delete: bool) -> bool {
        match (self, host) {
            (Self::EntityRelationship(r), DomainObject::Entity(entity))
                if entity.key.is_some() && r.source_key == entity.key =>
            {
                upsert(&mut entity.relationships, r, delete)
            }
            (Self::ActRelationship(r), DomainObject::Act(act))
                if act.key.is_some() && r.source_key == act.key =>
            {
                upsert(&mut act.relationships, r, delete)
            }
            (Self::Participation(p), DomainObject::Act(act))
                if act.key.is_some() && p.act_key == act.key =>
            {
                upsert(&mut act.participations, p, delete)
            }
            (Self::Participation(p), DomainObject::Entity(entity))
                if entity.key.is_some() && p.player_key == entity.key =>
            {
                upsert(&mut entity.participations, p, delete)
            }
            _ => false,
        }
    }
}

/// State of one top-level add or remove.
///
/// Dropped when the call returns, so nothing leaks into later calls.
#[derive(Debug)]
pub(crate) struct WalkContext {
    visited: HashSet<Uuid>,
    pub(crate) policy: AssociationPolicy,
}

impl WalkContext {
    pub(crate) fn new(policy: AssociationPolicy) -> Self {
        Self {
            visited: HashSet::new(),
            policy,
        }
    }

    /// Mark `key` as walked. Returns `false` if it already was during this
    /// call.
    pub(crate) fn enter(&mut self, key: Uuid) -> bool {
        self.visited.insert(key)
    }
}
