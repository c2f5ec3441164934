//! Translation of tracking state into store operation flags
//!
//! [`apply_changes`] walks a graph (usually the delta returned by
//! [`get_changes`](crate::changes::get_changes)) and assigns one store
//! operation per node:
//!
//! - `Added`: the node is flagged for insertion once; the insert cascades
//!   through its subtree, so descendants are not flagged on their own.
//! - `Deleted`: two phases. Every owned descendant is first neutralized,
//!   then descendants are flagged for deletion bottom-up and the node
//!   itself last, so stores enforcing referential constraints never see a
//!   parent delete before its children's.
//! - `Modified`: with named fields the node is marked unchanged and only
//!   those fields are flagged dirty; with none the whole node is updated.
//! - `Unchanged`: nothing for the node; its relations are walked.
//!
//! Collections are walked in reverse index order. Each id is visited once
//! per pass. Nothing is committed here.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::graph::Graph;
use crate::model::{Entity, NodeId, Relation, TrackingState};
use crate::rules::validation::validate_graph;
use crate::store::{StoreHandle, StoreState};

/// Apply options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    /// Validate the graph before any flag is assigned
    pub validate_shape: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            validate_shape: true,
        }
    }
}

/// Flags assigned by one apply pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Descendants of deleted nodes whose own flags were reset
    pub neutralized: usize,
    pub dirty_fields: usize,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.inserted + self.updated + self.deleted == 0
    }
}

struct Applier<'a, E, S: ?Sized> {
    graph: &'a Graph<E>,
    store: &'a mut S,
    visited: HashSet<NodeId>,
    report: ApplyReport,
}

impl<E: Entity, S: StoreHandle<E> + ?Sized> Applier<'_, E, S> {
    fn visit(&mut self, id: &NodeId) -> Result<()> {
        if !self.visited.insert(id.clone()) {
            return Ok(());
        }
        let graph = self.graph;
        let node = graph.node(id)?;

        match node.state() {
            TrackingState::Added => {
                self.store.set_state(graph, id, StoreState::Insert);
                self.report.inserted += 1;
                for member in graph.owned_subtree(id) {
                    self.visited.insert(member);
                }
                return Ok(());
            }
            TrackingState::Deleted => {
                self.delete(id);
                return Ok(());
            }
            TrackingState::Modified if node.modified().is_empty() => {
                self.store.set_state(graph, id, StoreState::Update);
                self.report.updated += 1;
            }
            TrackingState::Modified => {
                self.store.set_state(graph, id, StoreState::Unchanged);
                for field in node.modified().iter() {
                    self.store.set_field_dirty(graph, id, field);
                    self.report.dirty_fields += 1;
                }
                self.report.updated += 1;
            }
            TrackingState::Unchanged => {}
        }

        for rel in node.relations() {
            match rel {
                Relation::Collection(coll) => {
                    let held: Vec<&NodeId> = coll.members().iter().chain(coll.deleted().iter()).collect();
                    for child in held.into_iter().rev() {
                        self.visit(child)?;
                    }
                }
                Relation::Single(single) => {
                    if let Some(target) = single.target() {
                        self.visit(target)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Two-phase cascade delete rooted at `id`
    fn delete(&mut self, id: &NodeId) {
        let graph = self.graph;
        let subtree = graph.owned_subtree(id);

        for member in subtree.iter().skip(1) {
            if graph.node(member).is_ok_and(|n| n.state() != TrackingState::Added) {
                self.store.set_state(graph, member, StoreState::Unchanged);
                self.report.neutralized += 1;
            }
        }

        let mut seen = HashSet::new();
        self.delete_bottom_up(id, &mut seen);
        self.visited.extend(subtree);
    }

    fn delete_bottom_up(&mut self, id: &NodeId, seen: &mut HashSet<NodeId>) {
        if !seen.insert(id.clone()) {
            return;
        }
        let graph = self.graph;
        for (_, child) in graph.owned_children(id) {
            self.delete_bottom_up(&child, seen);
        }
        // Added descendants never reached the store
        if graph.node(id).is_ok_and(|n| n.state() != TrackingState::Added) {
            self.store.set_state(graph, id, StoreState::Delete);
            self.report.deleted += 1;
        }
    }
}

/// Assign store operation flags for every change in `graph`
///
/// # Errors
///
/// `UnsupportedGraphShape` (or another shape error) when validation is
/// enabled and the graph is malformed. Validation runs before the first
/// flag, so a rejected graph never touches the store.
pub fn apply_changes<E, S>(graph: &Graph<E>, store: &mut S, options: &ApplyOptions) -> Result<ApplyReport>
where
    E: Entity,
    S: StoreHandle<E> + ?Sized,
{
    if options.validate_shape {
        validate_graph(graph)?;
    }

    let mut applier = Applier {
        graph,
        store,
        visited: HashSet::new(),
        report: ApplyReport::default(),
    };
    let roots: Vec<&NodeId> = graph.root.members().iter().chain(graph.root.deleted().iter()).collect();
    for root in roots.into_iter().rev() {
        applier.visit(root)?;
    }

    let report = applier.report;
    tracing::debug!(
        inserted = report.inserted,
        updated = report.updated,
        deleted = report.deleted,
        dirty_fields = report.dirty_fields,
        "assigned store flags"
    );
    Ok(report)
}
