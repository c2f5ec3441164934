//! Persistence adapter contract
//!
//! A [`StoreHandle`] receives per-node operation flags from
//! [`apply_changes`](crate::apply::apply_changes) and turns them into store
//! operations on [`commit`](StoreHandle::commit). Flag assignment never
//! fails; every store-side failure is reported by `commit`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{FlagOp, FlagRecord, MemoryStore, RowKey, StoreRecord, StoreRow};

use crate::errors::{ExErrorKind, TrackError};
use crate::graph::Graph;
use crate::model::{Entity, FieldId, NodeId};

/// Operation a store performs for one node on commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Unchanged,
    Insert,
    Update,
    Delete,
}

/// Commit failure reported by a store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Version stamp no longer matches (row changed or vanished)
    #[error("Concurrency conflict on node {node_id}")]
    ConcurrencyConflict { node_id: String },

    /// Store rejected the operation (ordering, uniqueness, missing key)
    #[error("Constraint violation on node {node_id}: {reason}")]
    ConstraintViolation { node_id: String, reason: String },

    /// Commit was cancelled before it took effect
    #[error("Commit cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn kind(&self) -> ExErrorKind {
        match self {
            StoreError::ConcurrencyConflict { .. } => ExErrorKind::ConcurrencyConflict,
            StoreError::ConstraintViolation { .. } => ExErrorKind::ConstraintViolation,
            StoreError::Cancelled => ExErrorKind::Cancelled,
        }
    }
}

impl From<StoreError> for TrackError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { node_id } => TrackError::ConcurrencyConflict { node_id },
            StoreError::ConstraintViolation { node_id, reason } => {
                TrackError::ConstraintViolation { node_id, reason }
            }
            StoreError::Cancelled => TrackError::CommitCancelled,
        }
    }
}

/// Handle to a live store bound to one apply + commit cycle
///
/// `graph` is the delta being applied; adapters read node payloads and
/// owners from it. A failed commit discards every pending flag.
#[async_trait(?Send)]
pub trait StoreHandle<E: Entity> {
    /// Set the store operation for `id`; a later call for the same node wins
    fn set_state(&mut self, graph: &Graph<E>, id: &NodeId, state: StoreState);

    /// Flag one field of `id` for a field-level update
    fn set_field_dirty(&mut self, graph: &Graph<E>, id: &NodeId, field: FieldId);

    /// Execute every pending flag and return the authoritative snapshot of
    /// the affected nodes
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` or `ConstraintViolation` when the store rejects
    /// the change set; `Cancelled` when the commit did not take effect.
    async fn commit(&mut self) -> std::result::Result<Graph<E>, StoreError>;
}
