//! graphdelta core - change tracking for disconnected entity graphs
//!
//! A caller holds an object graph away from its store, edits it, ships only
//! the delta across a boundary and merges the store's authoritative answer
//! back without losing concurrent local edits:
//!
//! - [`graph::Graph`]: id-keyed node arena with tracking collections
//! - [`changes::get_changes`]: minimal changed subgraph
//! - [`apply::apply_changes`]: tracking state to store operation flags
//! - [`merge::merge_changes`]: field-level reconciliation
//! - [`store::MemoryStore`]: reference store adapter
//!
//! Entity types describe themselves through a static
//! [`model::EntitySchema`]; nothing is discovered at runtime.

pub mod apply;
pub mod changes;
pub mod errors;
pub mod graph;
pub mod logging_facility;
pub mod merge;
pub mod model;
pub mod rules;
pub mod serialization;
pub mod store;

/// Correlation ids and logging schema, re-exported for the logging macros
pub use graphdelta_core_types as core_types;

// Re-export commonly used types
pub use apply::{apply_changes, ApplyOptions, ApplyReport};
pub use changes::{get_changes, has_changes, summarize_changes, ChangeSummary};
pub use errors::{ExError, ExErrorKind, Result, TrackError};
pub use graph::{CollectionMut, Graph, Removal, TrackingCollection};
pub use merge::{merge_changes, MergeOptions, MergeReport};
pub use model::{
    Entity, EntityKey, EntitySchema, FieldId, FieldSet, Node, NodeId, RelationDescriptor,
    RelationId, RelationKind, Subtree, Trackable, TrackingState,
};
pub use rules::validate_graph;
pub use store::{MemoryStore, StoreError, StoreHandle, StoreRecord, StoreState};
