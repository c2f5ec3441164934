//! Graph arena
//!
//! A [`Graph`] owns every node in an id-keyed map plus a root
//! [`TrackingCollection`]. Forward relations hold [`NodeId`]s; the owning
//! slot is recorded on the child as a [`ParentLink`] and is never followed
//! by traversals.
//!
//! Ownership forms a forest: a node is owned by exactly one collection (as a
//! live member or in its shadow list) or by one single relation it was
//! attached through. Single relations may also hold plain references to
//! nodes owned elsewhere, which is how cycles such as A→B→A arise.

pub mod collection;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

pub use collection::{CollectionMut, Removal, TrackingCollection};

use crate::errors::{Result, TrackError};
use crate::model::{
    Entity, FieldId, Node, NodeId, ParentLink, Relation, RelationId, RelationKind, SingleRef,
    Subtree, TrackingState,
};

/// Disconnected entity graph with change tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "GraphRepr<E>")]
pub struct Graph<E> {
    pub(crate) nodes: BTreeMap<NodeId, Node<E>>,
    pub(crate) root: TrackingCollection,
}

/// Wire form of a graph; parent links are rebuilt on the way in
#[derive(Deserialize)]
struct GraphRepr<E> {
    nodes: BTreeMap<NodeId, Node<E>>,
    #[serde(default)]
    root: TrackingCollection,
}

impl<E> From<GraphRepr<E>> for Graph<E> {
    fn from(repr: GraphRepr<E>) -> Self {
        let mut graph = Graph {
            nodes: repr.nodes,
            root: repr.root,
        };
        graph.relink_parents();
        graph
    }
}

impl<E> Default for Graph<E> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            root: TrackingCollection::default(),
        }
    }
}

impl<E> Graph<E> {
    /// Empty, non-observing graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Result<&Node<E>> {
        self.nodes.get(id).ok_or_else(|| TrackError::not_found(id))
    }

    /// Mutable node access; tracking headers stay read-only from outside
    pub fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node<E>> {
        self.nodes.get_mut(id).ok_or_else(|| TrackError::not_found(id))
    }

    pub fn data(&self, id: &NodeId) -> Result<&E> {
        self.node(id).map(Node::data)
    }

    /// Every node, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node<E>> {
        self.nodes.values()
    }

    /// Top-level collection (no owning node)
    pub fn root(&self) -> &TrackingCollection {
        &self.root
    }

    /// Live top-level nodes
    pub fn roots(&self) -> &[NodeId] {
        self.root.members()
    }

    pub fn parent_of(&self, id: &NodeId) -> Option<&ParentLink> {
        self.nodes.get(id).and_then(Node::parent)
    }

    /// Owners of `id`, nearest first, following back-links
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = self.parent_of(id);
        while let Some(link) = cursor {
            if !seen.insert(link.owner.clone()) {
                break;
            }
            out.push(link.owner.clone());
            cursor = self.parent_of(&link.owner);
        }
        out
    }

    /// Children owned by `id`, relation by relation, live members before
    /// shadow-list entries
    pub(crate) fn owned_children(&self, id: &NodeId) -> Vec<(RelationId, NodeId)> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        node.relations
            .iter()
            .enumerate()
            .filter_map(|(index, rel)| u8::try_from(index).ok().map(|i| (RelationId::new(i), rel)))
            .flat_map(|(rel_id, rel)| rel.owned_ids().into_iter().map(move |c| (rel_id, c)))
            .collect()
    }

    /// `id` and everything it owns, pre-order; each node once
    pub(crate) fn owned_subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !self.nodes.contains_key(&current) || !seen.insert(current.clone()) {
                continue;
            }
            let children = self.owned_children(&current);
            out.push(current);
            for (_, child) in children.into_iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Drop `id` and its owned subtree from the arena
    ///
    /// Plain references to the dropped nodes are cleared. The caller removes
    /// `id` from its owning slot.
    pub(crate) fn discard_subtree(&mut self, id: &NodeId) {
        let doomed: BTreeSet<NodeId> = self.owned_subtree(id).into_iter().collect();
        for gone in &doomed {
            self.nodes.remove(gone);
        }
        for node in self.nodes.values_mut() {
            for rel in &mut node.relations {
                if let Relation::Single(single) = rel {
                    if single.target.as_ref().is_some_and(|t| doomed.contains(t)) {
                        *single = SingleRef::default();
                    }
                }
            }
        }
    }

    /// Observation flag on a node, its collections and everything it owns
    pub(crate) fn set_subtree_observing(&mut self, id: &NodeId, observing: bool) {
        for member in self.owned_subtree(id) {
            if let Some(node) = self.nodes.get_mut(&member) {
                node.observing = observing;
                for rel in &mut node.relations {
                    if let Relation::Collection(coll) = rel {
                        coll.observing = observing;
                    }
                }
            }
        }
    }

    /// Switch observation on or off for the whole graph
    pub fn set_observing(&mut self, observing: bool) {
        self.root.observing = observing;
        for node in self.nodes.values_mut() {
            node.observing = observing;
            for rel in &mut node.relations {
                if let Relation::Collection(coll) = rel {
                    coll.observing = observing;
                }
            }
        }
    }

    pub fn is_observing(&self) -> bool {
        self.root.observing
    }

    /// Rebuild every parent link from the forward relations
    pub(crate) fn relink_parents(&mut self) {
        let mut links = Vec::new();
        for (owner, node) in &self.nodes {
            for (index, rel) in node.relations.iter().enumerate() {
                let Ok(ordinal) = u8::try_from(index) else {
                    continue;
                };
                for child in rel.owned_ids() {
                    links.push((
                        child,
                        ParentLink {
                            owner: owner.clone(),
                            relation: RelationId::new(ordinal),
                        },
                    ));
                }
            }
        }
        for node in self.nodes.values_mut() {
            node.parent = None;
        }
        for (child, link) in links {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent = Some(link);
            }
        }
    }

    /// Reset every node to `Unchanged` and forget pending deletions
    ///
    /// Shadow-list nodes and the subtrees they own leave the arena, as do
    /// `Deleted` children of single relations.
    pub fn accept_changes(&mut self) {
        let mut gone: Vec<NodeId> = std::mem::take(&mut self.root.deleted);
        for node in self.nodes.values_mut() {
            for rel in &mut node.relations {
                match rel {
                    Relation::Collection(coll) => gone.append(&mut coll.deleted),
                    Relation::Single(_) => {}
                }
            }
        }
        let deleted_singles: Vec<NodeId> = self
            .nodes
            .values()
            .flat_map(|n| n.relations.iter())
            .filter_map(|rel| match rel {
                Relation::Single(single) if single.owned => single.target.clone(),
                _ => None,
            })
            .filter(|target| {
                self.nodes
                    .get(target)
                    .is_some_and(|n| n.state == TrackingState::Deleted)
            })
            .collect();
        gone.extend(deleted_singles);

        for id in &gone {
            self.discard_subtree(id);
        }
        for node in self.nodes.values_mut() {
            node.reset_tracking();
        }
        tracing::debug!(discarded = gone.len(), "accepted changes");
    }
}

impl<E: Entity> Graph<E> {
    /// Build a graph from baseline content
    ///
    /// Every node starts `Unchanged`. With `observe`, observation is then
    /// cascaded into every nested relation so later edits are recorded.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids or relations the schema does not declare.
    pub fn wrap<I>(subtrees: I, observe: bool) -> Result<Self>
    where
        I: IntoIterator<Item = Subtree<E>>,
    {
        let mut graph = Self::new();
        {
            let mut root = graph.root_collection_mut();
            for subtree in subtrees {
                root.insert(subtree)?;
            }
        }
        if observe {
            graph.set_observing(true);
        }
        Ok(graph)
    }

    /// Live members of a collection relation
    pub fn children(&self, owner: &NodeId, relation: RelationId) -> Result<&[NodeId]> {
        Ok(self.collection_of(owner, relation)?.members())
    }

    /// Removed members of a collection relation awaiting the next apply pass
    pub fn deleted_children(&self, owner: &NodeId, relation: RelationId) -> Result<&[NodeId]> {
        Ok(self.collection_of(owner, relation)?.deleted())
    }

    /// Live target of a single relation
    pub fn reference(&self, owner: &NodeId, relation: RelationId) -> Result<Option<&NodeId>> {
        let single = self.single_of(owner, relation)?;
        Ok(single.target.as_ref().filter(|target| {
            self.nodes
                .get(*target)
                .is_some_and(|n| n.state != TrackingState::Deleted)
        }))
    }

    /// Raw slot of a single relation, including a `Deleted` owned child
    pub fn single_slot(&self, owner: &NodeId, relation: RelationId) -> Result<&SingleRef> {
        self.single_of(owner, relation)
    }

    /// Mutable view of the collection behind `owner.relation`
    pub fn collection_mut(
        &mut self,
        owner: &NodeId,
        relation: RelationId,
    ) -> Result<CollectionMut<'_, E>> {
        self.collection_of(owner, relation)?;
        Ok(CollectionMut {
            graph: self,
            slot: Some(ParentLink {
                owner: owner.clone(),
                relation,
            }),
        })
    }

    /// Mutable view of the top-level collection
    pub fn root_collection_mut(&mut self) -> CollectionMut<'_, E> {
        CollectionMut {
            graph: self,
            slot: None,
        }
    }

    /// Record that `field` changed on `id`
    ///
    /// Returns `true` when the notification changed tracking state. Repeat
    /// notifications, notifications on `Added` or `Deleted` nodes and
    /// notifications on unobserved nodes are no-ops.
    ///
    /// # Errors
    ///
    /// `NodeNotFound`, or `UnknownField` when the schema has no such field.
    pub fn on_field_changed(&mut self, id: &NodeId, field: FieldId) -> Result<bool> {
        let node = self.node_mut(id)?;
        let schema = node.data.schema();
        if !schema.has_field(field) {
            return Err(TrackError::UnknownField {
                entity: schema.name.to_string(),
                field: field.ordinal(),
            });
        }
        if !node.observing {
            return Ok(false);
        }
        let changed = match node.state {
            TrackingState::Unchanged => {
                node.state = TrackingState::Modified;
                node.modified.insert(field);
                true
            }
            TrackingState::Modified => node.modified.insert(field),
            TrackingState::Added | TrackingState::Deleted => false,
        };
        if changed {
            tracing::debug!(
                node_id = %id,
                field = schema.field_name(field).unwrap_or("?"),
                "field modified"
            );
        }
        Ok(changed)
    }

    /// Mutate the payload of `id` and record `field` as changed
    ///
    /// # Errors
    ///
    /// Same as [`Graph::on_field_changed`]; the closure does not run when
    /// the field is unknown.
    pub fn update<F>(&mut self, id: &NodeId, field: FieldId, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut E),
    {
        let node = self.node_mut(id)?;
        let schema = node.data.schema();
        if !schema.has_field(field) {
            return Err(TrackError::UnknownField {
                entity: schema.name.to_string(),
                field: field.ordinal(),
            });
        }
        edit(&mut node.data);
        self.on_field_changed(id, field)
    }

    /// Point a single relation at an existing node (or clear it)
    ///
    /// References carry no tracking state of their own; update the foreign
    /// key field through [`Graph::update`] when the store needs it.
    ///
    /// # Errors
    ///
    /// `RelationOccupied` when the slot owns an attached child.
    pub fn set_reference(
        &mut self,
        owner: &NodeId,
        relation: RelationId,
        target: Option<NodeId>,
    ) -> Result<()> {
        if let Some(target) = &target {
            if !self.contains(target) {
                return Err(TrackError::not_found(target));
            }
        }
        let label = self.relation_label(owner, relation);
        let single = self.single_of_mut(owner, relation)?;
        if let Some(child) = single.target.as_ref().filter(|_| single.owned) {
            return Err(TrackError::RelationOccupied {
                node_id: owner.to_string(),
                relation: label,
                child_id: child.to_string(),
            });
        }
        single.target = target;
        single.owned = false;
        Ok(())
    }

    /// Attach a new subtree through a single relation
    ///
    /// The subtree becomes `Added` when the owner is observed. A plain
    /// reference held by the slot is replaced.
    ///
    /// # Errors
    ///
    /// `RelationOccupied` when the slot already owns a child (including a
    /// `Deleted` one awaiting apply).
    pub fn attach_single(
        &mut self,
        owner: &NodeId,
        relation: RelationId,
        subtree: Subtree<E>,
    ) -> Result<NodeId> {
        let observing = self.node(owner)?.observing;
        let label = self.relation_label(owner, relation);
        let single = self.single_of(owner, relation)?;
        if let Some(child) = single.target.as_ref().filter(|_| single.owned) {
            return Err(TrackError::RelationOccupied {
                node_id: owner.to_string(),
                relation: label,
                child_id: child.to_string(),
            });
        }

        let state = if observing {
            TrackingState::Added
        } else {
            TrackingState::Unchanged
        };
        let link = ParentLink {
            owner: owner.clone(),
            relation,
        };
        let id = self.materialize(subtree, Some(link), state, observing)?;
        let single = self.single_of_mut(owner, relation)?;
        single.target = Some(id.clone());
        single.owned = true;
        tracing::debug!(node_id = %id, owner = %owner, state = %state, "attached single child");
        Ok(id)
    }

    /// Detach the child or reference held by a single relation
    ///
    /// An owned child follows the collection removal rules: `Added` (or
    /// unobserved) children are discarded, anything else stays in the slot
    /// as `Deleted`. Clearing a plain reference returns `None`.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` when `owner` is not in the graph; `UnknownRelation`
    /// or `RelationKindMismatch` when `relation` is not a single slot.
    pub fn detach_single(&mut self, owner: &NodeId, relation: RelationId) -> Result<Option<Removal>> {
        let observing = self.node(owner)?.observing;
        let single = self.single_of(owner, relation)?.clone();
        let Some(child) = single.target else {
            return Ok(None);
        };
        if !single.owned {
            self.single_of_mut(owner, relation)?.target = None;
            return Ok(None);
        }

        let state = self.node(&child)?.state;
        match state {
            TrackingState::Deleted => Ok(None),
            TrackingState::Added => {
                *self.single_of_mut(owner, relation)? = SingleRef::default();
                self.discard_subtree(&child);
                Ok(Some(Removal::Discarded))
            }
            _ if !observing => {
                *self.single_of_mut(owner, relation)? = SingleRef::default();
                self.discard_subtree(&child);
                Ok(Some(Removal::Discarded))
            }
            _ => {
                let node = self.node_mut(&child)?;
                node.state = TrackingState::Deleted;
                node.modified.clear();
                tracing::debug!(node_id = %child, owner = %owner, "single child marked deleted");
                Ok(Some(Removal::MarkedDeleted))
            }
        }
    }

    /// Whether any node carries a pending change
    pub fn has_changes(&self) -> bool {
        crate::changes::has_changes(self)
    }

    /// Minimal subgraph holding every change, or `None` when clean
    pub fn get_changes(&self) -> Option<Graph<E>> {
        crate::changes::get_changes(self)
    }

    // ---------- internal helpers ----------

    fn relation_label(&self, owner: &NodeId, relation: RelationId) -> String {
        self.nodes
            .get(owner)
            .map(|n| format!("{}.{}", n.data.type_name(), n.data.schema().relation_label(relation)))
            .unwrap_or_else(|| format!("#{}", relation.ordinal()))
    }

    pub(crate) fn slot_label(&self, slot: Option<&ParentLink>) -> String {
        match slot {
            None => "root".to_string(),
            Some(link) => self.relation_label(&link.owner, link.relation),
        }
    }

    fn collection_of(&self, owner: &NodeId, relation: RelationId) -> Result<&TrackingCollection> {
        let node = self.node(owner)?;
        ensure_kind(node, relation, RelationKind::Collection)?;
        match node.relation(relation) {
            Some(Relation::Collection(coll)) => Ok(coll),
            _ => Err(internal_slot_error()),
        }
    }

    fn single_of(&self, owner: &NodeId, relation: RelationId) -> Result<&SingleRef> {
        let node = self.node(owner)?;
        ensure_kind(node, relation, RelationKind::Single)?;
        match node.relation(relation) {
            Some(Relation::Single(single)) => Ok(single),
            _ => Err(internal_slot_error()),
        }
    }

    fn single_of_mut(&mut self, owner: &NodeId, relation: RelationId) -> Result<&mut SingleRef> {
        let node = self.node_mut(owner)?;
        ensure_kind(node, relation, RelationKind::Single)?;
        match node.relation_mut(relation) {
            Some(Relation::Single(single)) => Ok(single),
            _ => Err(internal_slot_error()),
        }
    }

    pub(crate) fn collection_at(&self, slot: Option<&ParentLink>) -> Result<&TrackingCollection> {
        match slot {
            None => Ok(&self.root),
            Some(link) => self.collection_of(&link.owner, link.relation),
        }
    }

    pub(crate) fn collection_at_mut(
        &mut self,
        slot: Option<&ParentLink>,
    ) -> Result<&mut TrackingCollection> {
        let Some(link) = slot else {
            return Ok(&mut self.root);
        };
        let node = self.node_mut(&link.owner)?;
        ensure_kind(node, link.relation, RelationKind::Collection)?;
        match node.relation_mut(link.relation) {
            Some(Relation::Collection(coll)) => Ok(coll),
            _ => Err(internal_slot_error()),
        }
    }

    /// Validate a subtree against the arena before anything is inserted
    fn check_subtree(&self, subtree: &Subtree<E>, seen: &mut HashSet<NodeId>) -> Result<()> {
        if self.nodes.contains_key(&subtree.id) || !seen.insert(subtree.id.clone()) {
            return Err(TrackError::DuplicateNode {
                node_id: subtree.id.to_string(),
            });
        }
        let schema = subtree.data.schema();
        let mut singles = HashSet::new();
        for (relation, child) in &subtree.children {
            let descriptor = schema.relation(*relation).ok_or_else(|| TrackError::UnknownRelation {
                entity: schema.name.to_string(),
                relation: relation.ordinal(),
            })?;
            if descriptor.kind == RelationKind::Single && !singles.insert(*relation) {
                return Err(TrackError::shape(format!(
                    "{}.{} holds more than one child",
                    schema.name, descriptor.name
                )));
            }
            self.check_subtree(child, seen)?;
        }
        Ok(())
    }

    /// Insert a checked subtree into the arena; returns its root id
    pub(crate) fn materialize(
        &mut self,
        subtree: Subtree<E>,
        parent: Option<ParentLink>,
        state: TrackingState,
        observing: bool,
    ) -> Result<NodeId> {
        self.check_subtree(&subtree, &mut HashSet::new())?;
        Ok(self.insert_unchecked(subtree, parent, state, observing))
    }

    fn insert_unchecked(
        &mut self,
        subtree: Subtree<E>,
        parent: Option<ParentLink>,
        state: TrackingState,
        observing: bool,
    ) -> NodeId {
        let Subtree { id, data, children } = subtree;
        let mut node = Node::detached(id.clone(), data, state);
        node.observing = observing;
        node.parent = parent;
        for rel in &mut node.relations {
            if let Relation::Collection(coll) = rel {
                coll.observing = observing;
            }
        }

        for (relation, child) in children {
            let link = ParentLink {
                owner: id.clone(),
                relation,
            };
            let child_id = self.insert_unchecked(child, Some(link), state, observing);
            match node.relation_mut(relation) {
                Some(Relation::Collection(coll)) => coll.members.push(child_id),
                Some(Relation::Single(single)) => {
                    single.target = Some(child_id);
                    single.owned = true;
                }
                None => {}
            }
        }

        self.nodes.insert(id.clone(), node);
        id
    }
}

fn ensure_kind<E: Entity>(node: &Node<E>, relation: RelationId, expected: RelationKind) -> Result<()> {
    let schema = node.data.schema();
    match node.relation(relation) {
        None => Err(TrackError::UnknownRelation {
            entity: schema.name.to_string(),
            relation: relation.ordinal(),
        }),
        Some(rel) if rel.kind() != expected => Err(TrackError::RelationKindMismatch {
            entity: schema.name.to_string(),
            relation: schema.relation_label(relation),
            expected,
        }),
        Some(_) => Ok(()),
    }
}

fn internal_slot_error() -> TrackError {
    TrackError::Internal {
        message: "relation slot changed kind during lookup".to_string(),
    }
}
