pub mod entity;
pub mod fields;
pub mod id;
pub mod node;
pub mod schema;
pub mod state;

pub use entity::Entity;
pub use fields::{FieldId, FieldSet};
pub use id::{EntityKey, NodeId};
pub use node::{Node, ParentLink, Relation, SingleRef, Subtree, Trackable};
pub use schema::{EntitySchema, RelationDescriptor, RelationId, RelationKind};
pub use state::TrackingState;
