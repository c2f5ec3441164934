//! Static per-type relation and field descriptors
//!
//! Each entity type builds its [`EntitySchema`] once as a `static`. Graph
//! traversal reads relations from the schema instead of discovering them
//! at runtime.

use serde::{Deserialize, Serialize};

use super::fields::{FieldId, FieldSet};

/// Ordinal of a relation within its entity schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(u8);

impl RelationId {
    pub const fn new(ordinal: u8) -> Self {
        Self(ordinal)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn ordinal(self) -> u8 {
        self.0
    }
}

/// Shape of a relation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// 0..1 child node; either owns an attached subtree or references an
    /// existing node anywhere in the graph
    Single,
    /// Ordered sequence of owned child nodes, observed by a tracking collection
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: &'static str,
    pub kind: RelationKind,
}

impl RelationDescriptor {
    pub const fn single(name: &'static str) -> Self {
        Self {
            name,
            kind: RelationKind::Single,
        }
    }

    pub const fn collection(name: &'static str) -> Self {
        Self {
            name,
            kind: RelationKind::Collection,
        }
    }
}

/// Static description of one entity type
#[derive(Debug)]
pub struct EntitySchema {
    /// Type name, used in errors, logs and nested serialization
    pub name: &'static str,
    /// Field names indexed by [`FieldId`] ordinal
    pub fields: &'static [&'static str],
    /// Relations indexed by [`RelationId`] ordinal
    pub relations: &'static [RelationDescriptor],
    /// Fields the store is authoritative for on every commit
    /// (primary key, version stamp)
    pub store_generated: FieldSet,
}

impl EntitySchema {
    pub fn field_name(&self, field: FieldId) -> Option<&'static str> {
        self.fields.get(field.ordinal() as usize).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<FieldId> {
        self.fields
            .iter()
            .position(|f| *f == name)
            .and_then(|pos| u8::try_from(pos).ok())
            .filter(|ordinal| *ordinal <= FieldId::MAX_ORDINAL)
            .map(FieldId::new)
    }

    pub fn has_field(&self, field: FieldId) -> bool {
        (field.ordinal() as usize) < self.fields.len()
    }

    /// Every declared field
    pub fn all_fields(&self) -> FieldSet {
        FieldSet::first(self.fields.len())
    }

    pub fn relation(&self, relation: RelationId) -> Option<&'static RelationDescriptor> {
        self.relations.get(relation.index())
    }

    pub fn relation_by_name(&self, name: &str) -> Option<RelationId> {
        self.relations
            .iter()
            .position(|r| r.name == name)
            .and_then(|pos| u8::try_from(pos).ok())
            .map(RelationId::new)
    }

    /// Relation name for errors; falls back to the ordinal
    pub fn relation_label(&self, relation: RelationId) -> String {
        self.relation(relation)
            .map(|r| r.name.to_string())
            .unwrap_or_else(|| format!("#{}", relation.ordinal()))
    }

    /// Names of the fields in `set`, in ordinal order
    pub fn field_names(&self, set: FieldSet) -> Vec<&'static str> {
        set.iter().filter_map(|f| self.field_name(f)).collect()
    }
}
