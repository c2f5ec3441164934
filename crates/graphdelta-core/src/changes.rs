//! Change extraction
//!
//! [`get_changes`] prunes a graph to the minimal subgraph that still holds
//! every pending change. A node is kept when it, or anything reachable from
//! it through forward relations, is not `Unchanged`. `Deleted` nodes keep
//! their whole owned subtree so the persistence adapter can order the
//! cascade; `Added` subtrees are new throughout and are kept whole anyway.
//!
//! Inclusion is computed by walking back-edges from every changed node with
//! a visited set, so reference cycles terminate and each id is visited once.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::Serialize;

use crate::graph::{Graph, TrackingCollection};
use crate::model::{Entity, NodeId, Relation, SingleRef, TrackingState};

/// Node counts per tracking state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    pub fn changed(&self) -> usize {
        self.added + self.modified + self.deleted
    }

    pub fn is_clean(&self) -> bool {
        self.changed() == 0
    }
}

pub fn summarize_changes<E>(graph: &Graph<E>) -> ChangeSummary {
    graph
        .nodes
        .values()
        .fold(ChangeSummary::default(), |mut acc, node| {
            match node.state {
                TrackingState::Added => acc.added += 1,
                TrackingState::Modified => acc.modified += 1,
                TrackingState::Deleted => acc.deleted += 1,
                TrackingState::Unchanged => acc.unchanged += 1,
            }
            acc
        })
}

/// Cheap form of `get_changes(graph).is_some()`
pub fn has_changes<E>(graph: &Graph<E>) -> bool {
    graph.nodes.values().any(|n| n.state.is_changed())
}

/// Ids that belong in the delta
fn included_ids<E>(graph: &Graph<E>) -> BTreeSet<NodeId> {
    let mut back_edges: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for (id, node) in &graph.nodes {
        for rel in &node.relations {
            let targets: Vec<&NodeId> = match rel {
                Relation::Single(single) => single.target.iter().collect(),
                Relation::Collection(coll) => coll.members.iter().chain(coll.deleted.iter()).collect(),
            };
            for target in targets {
                back_edges.entry(target).or_default().push(id);
            }
        }
    }

    let mut included = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = VecDeque::new();

    for (id, node) in &graph.nodes {
        if node.state.is_changed() && included.insert(id.clone()) {
            queue.push_back(id);
        }
        if node.state == TrackingState::Deleted {
            for owned in graph.owned_subtree(id) {
                included.insert(owned);
            }
        }
    }

    while let Some(id) = queue.pop_front() {
        for &owner in back_edges.get(id).into_iter().flatten() {
            if included.insert(owner.clone()) {
                queue.push_back(owner);
            }
        }
    }
    included
}

fn filter_collection(coll: &TrackingCollection, keep: &BTreeSet<NodeId>) -> TrackingCollection {
    TrackingCollection {
        members: coll.members.iter().filter(|m| keep.contains(*m)).cloned().collect(),
        deleted: coll.deleted.iter().filter(|m| keep.contains(*m)).cloned().collect(),
        observing: false,
    }
}

/// Minimal subgraph holding every change, or `None` when the graph is clean
///
/// The copy is detached: it is not observed, and single references are kept
/// only when their target is part of the copy.
pub fn get_changes<E: Entity>(graph: &Graph<E>) -> Option<Graph<E>> {
    if !has_changes(graph) {
        tracing::debug!("no pending changes");
        return None;
    }

    let keep = included_ids(graph);
    let mut nodes = BTreeMap::new();
    for id in &keep {
        let Some(node) = graph.nodes.get(id) else {
            continue;
        };
        let mut copy = node.shallow_copy();
        for (slot, rel) in copy.relations.iter_mut().zip(node.relations.iter()) {
            *slot = match rel {
                Relation::Collection(coll) => Relation::Collection(filter_collection(coll, &keep)),
                Relation::Single(single) => match &single.target {
                    Some(target) if keep.contains(target) => Relation::Single(single.clone()),
                    _ => Relation::Single(SingleRef::default()),
                },
            };
        }
        nodes.insert(id.clone(), copy);
    }

    let delta = Graph {
        nodes,
        root: filter_collection(&graph.root, &keep),
    };

    let summary = summarize_changes(&delta);
    tracing::debug!(
        delta_len = delta.len(),
        added = summary.added,
        modified = summary.modified,
        deleted = summary.deleted,
        "extracted changes"
    );
    Some(delta)
}
