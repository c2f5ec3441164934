//! Reconciliation of an authoritative snapshot into the tracked graph
//!
//! [`merge_changes`] runs in two passes. The planning pass walks the
//! original graph pre-order along owned edges, correlates every node with
//! its counterpart in the reconciled graph and decides what happens to it;
//! it never mutates anything, so a correlation failure leaves the original
//! exactly as it was. The second pass executes the plan in the same order,
//! which guarantees a parent has received its store-generated key before
//! any child is synchronized with it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TrackError};
use crate::graph::Graph;
use crate::model::{Entity, FieldSet, Node, NodeId, ParentLink, Relation, TrackingState};
use crate::rules::validation::validate_graph;

/// Reconciliation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Fail when an `Added` or `Modified` node has no counterpart in the
    /// reconciled graph. When off (the default) such nodes were edited
    /// after the delta left and keep their pending state.
    pub strict_identifiers: bool,
}

/// What a merge pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Nodes that received authoritative fields
    pub merged: usize,
    /// `Deleted` nodes removed for good, owned descendants included
    pub detached: usize,
    /// `Deleted` nodes the store reported live again
    pub restored: usize,
    /// Merged nodes that kept local edits outside the authoritative fields
    pub still_modified: usize,
    /// Changed nodes left pending because nothing correlated with them
    pub unmatched: usize,
}

#[derive(Debug)]
enum Step {
    Merge {
        id: NodeId,
        counterpart: NodeId,
        sync_from_parent: bool,
    },
    Restore {
        id: NodeId,
        counterpart: NodeId,
    },
    Detach {
        id: NodeId,
    },
}

/// Fields the reconciled node is authoritative for
fn authoritative_fields<E: Entity>(reconciled: &Node<E>) -> FieldSet {
    let schema = reconciled.data.schema();
    match reconciled.state {
        TrackingState::Added => schema.all_fields(),
        TrackingState::Modified if reconciled.modified.is_empty() => schema.all_fields(),
        TrackingState::Modified => reconciled.modified.union(schema.store_generated),
        TrackingState::Unchanged | TrackingState::Deleted => schema.store_generated,
    }
}

struct Planner<'a, E> {
    original: &'a Graph<E>,
    reconciled: &'a Graph<E>,
    options: &'a MergeOptions,
    visited: HashSet<NodeId>,
    claimed: HashSet<NodeId>,
    steps: Vec<Step>,
    unmatched: usize,
}

impl<'a, E: Entity> Planner<'a, E> {
    /// Counterpart of `node` in the reconciled graph
    ///
    /// `scope` lists the reconciled nodes sitting in the slot that matches
    /// the node's own slot; it is `None` when the owner has no counterpart.
    fn correlate(&self, node: &Node<E>, scope: Option<&[NodeId]>) -> Result<Option<NodeId>> {
        if let Some(other) = self.reconciled.nodes.get(&node.id) {
            if other.data.type_name() != node.data.type_name() {
                return Err(TrackError::IdentifierMismatch {
                    node_id: node.id.to_string(),
                    reason: format!(
                        "reconciled node is a {}, expected {}",
                        other.data.type_name(),
                        node.data.type_name()
                    ),
                    candidates: vec![other.id.to_string()],
                });
            }
            return Ok(Some(other.id.clone()));
        }

        let (Some(key), Some(scope)) = (node.data.key(), scope) else {
            return Ok(None);
        };
        let candidates: Vec<NodeId> = scope
            .iter()
            .filter(|id| !self.claimed.contains(*id) && !self.original.contains(id))
            .filter_map(|id| self.reconciled.nodes.get(id))
            .filter(|other| {
                other.data.type_name() == node.data.type_name()
                    && other.data.key().as_ref() == Some(&key)
            })
            .map(|other| other.id.clone())
            .collect();

        match candidates.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single.clone())),
            _ => Err(TrackError::IdentifierMismatch {
                node_id: node.id.to_string(),
                reason: format!("{} reconciled nodes share key {}", candidates.len(), key),
                candidates: candidates.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    /// Reconciled nodes in the counterpart slot; the root collection when
    /// `owner` is `None`
    fn scope_of(&self, owner: Option<&NodeId>, link: Option<&ParentLink>) -> Option<Vec<NodeId>> {
        match (owner, link) {
            (None, _) => {
                let root = &self.reconciled.root;
                Some(root.members.iter().chain(root.deleted.iter()).cloned().collect())
            }
            (Some(owner), Some(link)) => self
                .reconciled
                .nodes
                .get(owner)
                .and_then(|n| n.relation(link.relation))
                .map(Relation::node_ids),
            (Some(_), None) => None,
        }
    }

    fn plan(&mut self, id: &NodeId, owner_counterpart: Option<&NodeId>, is_root: bool) -> Result<()> {
        if !self.visited.insert(id.clone()) {
            return Ok(());
        }
        let original = self.original;
        let node = original.node(id)?;

        let scope = if is_root {
            self.scope_of(None, None)
        } else {
            owner_counterpart.and_then(|owner| self.scope_of(Some(owner), node.parent.as_ref()))
        };
        let counterpart = self.correlate(node, scope.as_deref())?;
        if let Some(found) = &counterpart {
            self.claimed.insert(found.clone());
        }

        match (node.state, counterpart) {
            (TrackingState::Deleted, None) => {
                self.steps.push(Step::Detach { id: id.clone() });
                Ok(())
            }
            (TrackingState::Deleted, Some(found)) => {
                let reported = self.reconciled.node(&found)?.state;
                if reported == TrackingState::Deleted {
                    self.steps.push(Step::Detach { id: id.clone() });
                    return Ok(());
                }
                self.steps.push(Step::Restore {
                    id: id.clone(),
                    counterpart: found.clone(),
                });
                self.plan_children(id, Some(&found))
            }
            (state, None) => {
                if state.is_changed() {
                    if self.options.strict_identifiers {
                        return Err(TrackError::IdentifierMismatch {
                            node_id: id.to_string(),
                            reason: format!("{} node has no reconciled counterpart", state),
                            candidates: Vec::new(),
                        });
                    }
                    self.unmatched += 1;
                }
                self.plan_children(id, None)
            }
            (_, Some(found)) => {
                let sync_from_parent = !is_root && owner_counterpart.is_some();
                self.steps.push(Step::Merge {
                    id: id.clone(),
                    counterpart: found.clone(),
                    sync_from_parent,
                });
                self.plan_children(id, Some(&found))
            }
        }
    }

    fn plan_children(&mut self, id: &NodeId, counterpart: Option<&NodeId>) -> Result<()> {
        let original = self.original;
        for (_, child) in original.owned_children(id) {
            self.plan(&child, counterpart, false)?;
        }
        Ok(())
    }
}

/// Merge the authoritative `reconciled` graph into `original`
///
/// Nodes are correlated by identifier, falling back to [`Entity::key`]
/// among the reconciled nodes in the matching slot. Matched nodes copy the
/// fields the store is authoritative for and reset to `Unchanged`, unless
/// they carry local edits outside those fields, in which case they stay
/// `Modified` with just the remaining fields. `Deleted` nodes the store no
/// longer reports are detached with their owned subtree.
///
/// # Errors
///
/// `IdentifierMismatch` when a node correlates ambiguously, or not at all
/// under `strict_identifiers`; `UnsupportedGraphShape` when the reconciled
/// graph is malformed. On error `original` is untouched.
pub fn merge_changes<E: Entity>(
    original: &mut Graph<E>,
    reconciled: &Graph<E>,
    options: &MergeOptions,
) -> Result<MergeReport> {
    validate_graph(reconciled)?;

    let mut planner = Planner {
        original,
        reconciled,
        options,
        visited: HashSet::new(),
        claimed: HashSet::new(),
        steps: Vec::new(),
        unmatched: 0,
    };
    let roots: Vec<NodeId> = original
        .root
        .members
        .iter()
        .chain(original.root.deleted.iter())
        .cloned()
        .collect();
    for root in &roots {
        planner.plan(root, None, true)?;
    }
    let Planner {
        steps, unmatched, ..
    } = planner;

    let mut report = MergeReport {
        unmatched,
        ..MergeReport::default()
    };
    for step in steps {
        match step {
            Step::Merge {
                id,
                counterpart,
                sync_from_parent,
            } => {
                if sync_from_parent {
                    sync_with_parent(original, &id);
                }
                let source = reconciled.node(&counterpart)?;
                let authority = authoritative_fields(source);
                let node = original.node_mut(&id)?;
                node.data.merge_fields(&source.data, authority);

                let remaining = node.modified.difference(authority);
                if node.state == TrackingState::Modified && !remaining.is_empty() {
                    node.modified = remaining;
                    report.still_modified += 1;
                } else {
                    node.reset_tracking();
                }
                report.merged += 1;
            }
            Step::Restore { id, counterpart } => {
                sync_with_parent(original, &id);
                let source = reconciled.node(&counterpart)?;
                let node = original.node_mut(&id)?;
                node.data.merge_fields(&source.data, source.data.schema().all_fields());
                node.reset_tracking();
                let parent = node.parent.clone();
                if let Ok(coll) = original.collection_at_mut(parent.as_ref()) {
                    coll.deleted.retain(|d| d != &id);
                    coll.members.push(id.clone());
                }
                report.restored += 1;
            }
            Step::Detach { id } => {
                let parent = original.node(&id)?.parent.clone();
                report.detached += original.owned_subtree(&id).len();
                detach(original, &id, parent.as_ref());
            }
        }
    }

    tracing::debug!(
        merged = report.merged,
        detached = report.detached,
        restored = report.restored,
        still_modified = report.still_modified,
        unmatched = report.unmatched,
        "merged reconciled graph"
    );
    Ok(report)
}

/// Let `id` pick up keys its owner may just have received
fn sync_with_parent<E: Entity>(graph: &mut Graph<E>, id: &NodeId) {
    let Some(link) = graph.parent_of(id).cloned() else {
        return;
    };
    let Some(parent) = graph.nodes.get(&link.owner).map(|p| p.data.clone()) else {
        return;
    };
    if let Some(node) = graph.nodes.get_mut(id) {
        node.data.sync_foreign_keys(link.relation, &parent);
    }
}

/// Remove a `Deleted` node from its owning slot and drop its subtree
fn detach<E: Entity>(graph: &mut Graph<E>, id: &NodeId, parent: Option<&ParentLink>) {
    let single_owner = parent.and_then(|link| {
        graph
            .nodes
            .get(&link.owner)
            .and_then(|n| n.relation(link.relation))
            .map(|rel| matches!(rel, Relation::Single(_)))
    });
    match (parent, single_owner) {
        (Some(link), Some(true)) => {
            if let Some(Relation::Single(single)) = graph
                .nodes
                .get_mut(&link.owner)
                .and_then(|n| n.relation_mut(link.relation))
            {
                single.target = None;
                single.owned = false;
            }
        }
        _ => {
            if let Ok(coll) = graph.collection_at_mut(parent) {
                coll.deleted.retain(|d| d != id);
                coll.members.retain(|m| m != id);
            }
        }
    }
    graph.discard_subtree(id);
}

impl<E: Entity> Graph<E> {
    /// [`merge_changes`] with default options
    ///
    /// # Errors
    ///
    /// As [`merge_changes`].
    pub fn merge_changes(&mut self, reconciled: &Graph<E>) -> Result<MergeReport> {
        merge_changes(self, reconciled, &MergeOptions::default())
    }
}
