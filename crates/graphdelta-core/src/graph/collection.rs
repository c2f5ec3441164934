//! Tracking collections
//!
//! A [`TrackingCollection`] is the observed, ordered membership of one
//! relation. It records membership deltas (inserted nodes become `Added`,
//! removed nodes move to a shadow list as `Deleted`) independently of the
//! field deltas recorded on the member nodes themselves.

use serde::{Deserialize, Serialize};

use super::Graph;
use crate::errors::{Result, TrackError};
use crate::model::{Entity, NodeId, ParentLink, Subtree, TrackingState};

/// Ordered live members of one relation plus its pending-deletion shadow list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingCollection {
    pub(crate) members: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) deleted: Vec<NodeId>,
    #[serde(skip)]
    pub(crate) observing: bool,
}

impl TrackingCollection {
    /// Live members in order; deleted nodes are excluded
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Removed nodes waiting for the next apply pass
    pub fn deleted(&self) -> &[NodeId] {
        &self.deleted
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.members.contains(id)
    }

    pub(crate) fn holds(&self, id: &NodeId) -> bool {
        self.members.contains(id) || self.deleted.contains(id)
    }
}

/// Outcome of removing a node from a tracking collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The node was never persisted (or the collection was not observing);
    /// it is gone with its owned subtree and leaves no record
    Discarded,
    /// The node is now `Deleted` and sits in the shadow list
    MarkedDeleted,
}

/// Mutable view of one collection inside a graph
///
/// Obtained from [`Graph::collection_mut`] or [`Graph::root_collection_mut`].
pub struct CollectionMut<'g, E> {
    pub(crate) graph: &'g mut Graph<E>,
    pub(crate) slot: Option<ParentLink>,
}

impl<E: Entity> CollectionMut<'_, E> {
    fn collection(&self) -> Result<&TrackingCollection> {
        self.graph.collection_at(self.slot.as_ref())
    }

    /// Live members in order
    pub fn members(&self) -> Vec<NodeId> {
        self.collection()
            .map(|c| c.members.clone())
            .unwrap_or_default()
    }

    /// Shadow list of removed, previously persisted members
    pub fn deleted(&self) -> Vec<NodeId> {
        self.collection()
            .map(|c| c.deleted.clone())
            .unwrap_or_default()
    }

    pub fn is_observing(&self) -> bool {
        self.collection().map(|c| c.observing).unwrap_or(false)
    }

    /// Insert a new subtree at the end of the collection
    ///
    /// When the collection is observing, the whole subtree becomes `Added`
    /// and observed; otherwise it joins as baseline content (`Unchanged`).
    ///
    /// # Errors
    ///
    /// `DuplicateNode` when an id in the subtree already exists, or a shape
    /// error when the subtree uses relations its schema does not declare.
    /// Nothing is inserted on error.
    pub fn insert(&mut self, subtree: Subtree<E>) -> Result<NodeId> {
        let observing = self.collection()?.observing;
        let state = if observing {
            TrackingState::Added
        } else {
            TrackingState::Unchanged
        };

        let id = self
            .graph
            .materialize(subtree, self.slot.clone(), state, observing)?;
        self.graph
            .collection_at_mut(self.slot.as_ref())?
            .members
            .push(id.clone());

        tracing::debug!(
            node_id = %id,
            state = %state,
            owner = ?self.slot.as_ref().map(|s| s.owner.as_str()),
            "inserted into tracking collection"
        );
        Ok(id)
    }

    /// Remove a live member
    ///
    /// `Added` members (and every member of a non-observing collection) are
    /// discarded outright. Anything else becomes `Deleted`, loses its
    /// modified-field set and moves to the shadow list, where it stays
    /// reachable for the next apply pass.
    ///
    /// # Errors
    ///
    /// `NotAMember` when `id` is not a live member of this collection.
    pub fn remove(&mut self, id: &NodeId) -> Result<Removal> {
        let (position, observing) = {
            let coll = self.collection()?;
            let position = coll
                .members
                .iter()
                .position(|m| m == id)
                .ok_or_else(|| TrackError::NotAMember {
                    node_id: id.to_string(),
                    relation: self.graph.slot_label(self.slot.as_ref()),
                })?;
            (position, coll.observing)
        };
        let state = self.graph.node(id)?.state;

        self.graph
            .collection_at_mut(self.slot.as_ref())?
            .members
            .remove(position);

        if !observing || state == TrackingState::Added {
            self.graph.discard_subtree(id);
            tracing::debug!(node_id = %id, "discarded from tracking collection");
            return Ok(Removal::Discarded);
        }

        if let Some(node) = self.graph.nodes.get_mut(id) {
            node.state = TrackingState::Deleted;
            node.modified.clear();
        }
        self.graph
            .collection_at_mut(self.slot.as_ref())?
            .deleted
            .push(id.clone());
        tracing::debug!(node_id = %id, "moved to pending-deletion list");
        Ok(Removal::MarkedDeleted)
    }

    /// Switch observation on or off for this collection and, recursively,
    /// for every node it holds
    pub fn set_observing(&mut self, observing: bool) -> Result<()> {
        let held = {
            let coll = self.graph.collection_at_mut(self.slot.as_ref())?;
            coll.observing = observing;
            coll.members
                .iter()
                .chain(coll.deleted.iter())
                .cloned()
                .collect::<Vec<_>>()
        };
        for id in held {
            self.graph.set_subtree_observing(&id, observing);
        }
        Ok(())
    }
}
