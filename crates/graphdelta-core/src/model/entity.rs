use super::fields::FieldSet;
use super::id::EntityKey;
use super::schema::{EntitySchema, RelationDescriptor, RelationId};

/// Payload capability every graph element's data must provide
///
/// The tracking header (identifier, state, modified fields) lives on
/// [`Node`](super::Node); the payload only describes its own shape and how
/// to copy authoritative values from another instance of itself.
///
/// A graph holding several entity types uses one enum implementing this
/// trait, with a schema per variant.
pub trait Entity: Clone + std::fmt::Debug {
    /// Static schema of this value's type
    fn schema(&self) -> &'static EntitySchema;

    /// Store primary key, once known
    fn key(&self) -> Option<EntityKey> {
        None
    }

    /// Copy the fields in `fields` from `from` into `self`
    ///
    /// Called only when both values share the same schema.
    fn merge_fields(&mut self, from: &Self, fields: FieldSet);

    /// Refresh foreign keys that point at `parent` through `relation`
    ///
    /// Runs during reconciliation right after the parent has received its
    /// store-generated key, and before the child itself is merged.
    fn sync_foreign_keys(&mut self, _relation: RelationId, _parent: &Self) {}

    fn type_name(&self) -> &'static str {
        self.schema().name
    }

    fn relations(&self) -> &'static [RelationDescriptor] {
        self.schema().relations
    }
}
