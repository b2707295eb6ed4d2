//! Domain objects held by the object cache.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tags starting with this prefix are reserved for the server.
pub const RESERVED_TAG_PREFIX: &str = "$";

/// Marks an object produced on the fly (never cached).
pub const TAG_GENERATED: &str = "$generated";

/// Marks a cached host whose embedded lists were patched in place and
/// which a reader may want to reload.
pub const TAG_REFETCH: &str = "$refetch";

/// What a submitted object asks the store to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    #[default]
    InsertOrUpdate,
    Insert,
    Update,
    Delete,
}

impl BatchOperation {
    pub fn is_delete(self) -> bool {
        self == BatchOperation::Delete
    }
}

/// How deeply the object was loaded. Carried through for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    #[default]
    QuickLoad,
    SyncLoad,
    FullLoad,
}

/// Metadata common to every domain object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectMeta {
    pub tags: BTreeSet<String>,
    /// Soft-deleted.
    pub obsoleted: bool,
    pub operation: BatchOperation,
    pub load_mode: LoadMode,
}

impl ObjectMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Drop reserved tags, keeping only the refetch marker.
    pub fn strip_reserved_tags(&mut self) {
        self.tags
            .retain(|tag| !tag.starts_with(RESERVED_TAG_PREFIX) || tag == TAG_REFETCH);
    }
}

/// A person, place, organization, device or other thing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entity {
    pub key: Option<Uuid>,
    pub class_code: String,
    pub names: Vec<String>,
    pub relationships: Vec<EntityRelationship>,
    pub participations: Vec<ActParticipation>,
    pub meta: ObjectMeta,
}

impl Entity {
    pub fn new(key: Uuid, class_code: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            class_code: class_code.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    pub fn with_relationship(mut self, relationship: EntityRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }
}

/// Something that happened or is planned: an encounter, an observation,
/// a procedure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Act {
    pub key: Option<Uuid>,
    pub type_code: String,
    pub relationships: Vec<ActRelationship>,
    pub participations: Vec<ActParticipation>,
    pub meta: ObjectMeta,
}

impl Act {
    pub fn new(key: Uuid, type_code: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            type_code: type_code.into(),
            ..Default::default()
        }
    }
}

/// Link between two entities, embedded in the source entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRelationship {
    pub key: Option<Uuid>,
    pub source_key: Option<Uuid>,
    pub target_key: Option<Uuid>,
    pub relationship_type: String,
    pub meta: ObjectMeta,
}

impl EntityRelationship {
    pub fn new(key: Uuid, source: Uuid, target: Uuid, relationship_type: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            source_key: Some(source),
            target_key: Some(target),
            relationship_type: relationship_type.into(),
            meta: ObjectMeta::default(),
        }
    }
}

/// Link between two acts, embedded in the source act.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActRelationship {
    pub key: Option<Uuid>,
    pub source_key: Option<Uuid>,
    pub target_key: Option<Uuid>,
    pub relationship_type: String,
    pub meta: ObjectMeta,
}

impl ActRelationship {
    pub fn new(key: Uuid, source: Uuid, target: Uuid, relationship_type: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            source_key: Some(source),
            target_key: Some(target),
            relationship_type: relationship_type.into(),
            meta: ObjectMeta::default(),
        }
    }
}

/// An entity's role in an act. Embedded in both the act and the entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActParticipation {
    pub key: Option<Uuid>,
    pub act_key: Option<Uuid>,
    pub player_key: Option<Uuid>,
    pub role: String,
    pub meta: ObjectMeta,
}

impl ActParticipation {
    pub fn new(key: Uuid, act: Uuid, player: Uuid, role: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            act_key: Some(act),
            player_key: Some(player),
            role: role.into(),
            meta: ObjectMeta::default(),
        }
    }
}

/// Free-text note about an entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub key: Option<Uuid>,
    pub entity_key: Option<Uuid>,
    pub author_key: Option<Uuid>,
    pub text: String,
    pub meta: ObjectMeta,
}

/// Coded vocabulary term.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Concept {
    pub key: Option<Uuid>,
    pub mnemonic: String,
    pub meta: ObjectMeta,
}

impl Concept {
    pub fn new(key: Uuid, mnemonic: impl Into<String>) -> Self {
        Self {
            key: Some(key),
            mnemonic: mnemonic.into(),
            meta: ObjectMeta::default(),
        }
    }
}

/// Security audit record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditEvent {
    pub key: Option<Uuid>,
    pub action: String,
    pub meta: ObjectMeta,
}

/// Batch of objects submitted together, each with its own operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bundle {
    pub key: Option<Uuid>,
    pub items: Vec<DomainObject>,
    pub meta: ObjectMeta,
}

impl Bundle {
    pub fn new(items: Vec<DomainObject>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }
}

/// Any object the cache can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum DomainObject {
    Entity(Entity),
    Act(Act),
    EntityRelationship(EntityRelationship),
    ActRelationship(ActRelationship),
    ActParticipation(ActParticipation),
    Note(Note),
    Concept(Concept),
    AuditEvent(AuditEvent),
    Bundle(Bundle),
}

/// Discriminant of [`DomainObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Entity,
    Act,
    EntityRelationship,
    ActRelationship,
    ActParticipation,
    Note,
    Concept,
    AuditEvent,
    Bundle,
}

impl ObjectKind {
    /// Every known kind.
    pub const ALL: [ObjectKind; 9] = [
        ObjectKind::Entity,
        ObjectKind::Act,
        ObjectKind::EntityRelationship,
        ObjectKind::ActRelationship,
        ObjectKind::ActParticipation,
        ObjectKind::Note,
        ObjectKind::Concept,
        ObjectKind::AuditEvent,
        ObjectKind::Bundle,
    ];
}

/// Source and target of an association object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationRef {
    pub source_key: Uuid,
    pub target_key: Option<Uuid>,
}

/// Structural role of an object during the consistency walk.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    /// Holds other objects.
    Container(&'a [DomainObject]),
    /// Links two other objects.
    Association(AssociationRef),
    Plain,
}

macro_rules! each_variant {
    ($object:expr, $inner:ident => $body:expr) => {
        match $object {
            DomainObject::Entity($inner) => $body,
            DomainObject::Act($inner) => $body,
            DomainObject::EntityRelationship($inner) => $body,
            DomainObject::ActRelationship($inner) => $body,
            DomainObject::ActParticipation($inner) => $body,
            DomainObject::Note($inner) => $body,
            DomainObject::Concept($inner) => $body,
            DomainObject::AuditEvent($inner) => $body,
            DomainObject::Bundle($inner) => $body,
        }
    };
}

impl DomainObject {
    pub fn key(&self) -> Option<Uuid> {
        each_variant!(self, inner => inner.key)
    }

    pub fn meta(&self) -> &ObjectMeta {
        each_variant!(self, inner => &inner.meta)
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        each_variant!(self, inner => &mut inner.meta)
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            DomainObject::Entity(_) => ObjectKind::Entity,
            DomainObject::Act(_) => ObjectKind::Act,
            DomainObject::EntityRelationship(_) => ObjectKind::EntityRelationship,
            DomainObject::ActRelationship(_) => ObjectKind::ActRelationship,
            DomainObject::ActParticipation(_) => ObjectKind::ActParticipation,
            DomainObject::Note(_) => ObjectKind::Note,
            DomainObject::Concept(_) => ObjectKind::Concept,
            DomainObject::AuditEvent(_) => ObjectKind::AuditEvent,
            DomainObject::Bundle(_) => ObjectKind::Bundle,
        }
    }

    /// Source and target keys carried by the object, if it has them.
    fn endpoints(&self) -> Option<(Option<Uuid>, Option<Uuid>)> {
        match self {
            DomainObject::EntityRelationship(r) => Some((r.source_key, r.target_key)),
            DomainObject::ActRelationship(r) => Some((r.source_key, r.target_key)),
            DomainObject::ActParticipation(p) => Some((p.act_key, p.player_key)),
            DomainObject::Note(n) => Some((n.entity_key, n.author_key)),
            _ => None,
        }
    }

    /// The link this object represents, if it is an association with a
    /// known source.
    pub fn association(&self) -> Option<AssociationRef> {
        match self {
            DomainObject::EntityRelationship(_)
            | DomainObject::ActRelationship(_)
            | DomainObject::ActParticipation(_) => {
                let (source, target) = self.endpoints()?;
                Some(AssociationRef {
                    source_key: source?,
                    target_key: target,
                })
            }
            _ => None,
        }
    }

    /// Every source/target key the object carries, whatever its kind.
    pub fn linked_keys(&self) -> Vec<Uuid> {
        self.endpoints()
            .map(|(source, target)| source.into_iter().chain(target).collect())
            .unwrap_or_default()
    }

    pub fn shape(&self) -> Shape<'_> {
        if let DomainObject::Bundle(bundle) = self {
            return Shape::Container(&bundle.items);
        }
        match self.association() {
            Some(link) => Shape::Association(link),
            None => Shape::Plain,
        }
    }

    /// Set the operation this object asks for.
    pub fn with_operation(mut self, operation: BatchOperation) -> Self {
        self.meta_mut().operation = operation;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.meta_mut().tags.insert(tag.into());
        self
    }
}

/// A concrete domain type that can be read back out of the cache.
pub trait CachedType: Sized + Into<DomainObject> {
    const KIND: ObjectKind;

    /// Unwrap `object` if it holds this type.
    fn from_object(object: DomainObject) -> Option<Self>;
}

macro_rules! cached_type {
    ($($variant:ident),* $(,)?) => {
        $(
            impl CachedType for $variant {
                const KIND: ObjectKind = ObjectKind::$variant;

                fn from_object(object: DomainObject) -> Option<Self> {
                    match object {
                        DomainObject::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$variant> for DomainObject {
                fn from(inner: $variant) -> Self {
                    DomainObject::$variant(inner)
                }
            }
        )*
    };
}

cached_type!(
    Entity,
    Act,
    EntityRelationship,
    ActRelationship,
    ActParticipation,
    Note,
    Concept,
    AuditEvent,
    Bundle,
);
