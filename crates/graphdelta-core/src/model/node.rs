use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::fields::FieldSet;
use super::id::NodeId;
use super::schema::{RelationDescriptor, RelationId, RelationKind};
use super::state::TrackingState;
use crate::graph::TrackingCollection;

/// Tracking capability exposed by every graph element
pub trait Trackable {
    fn id(&self) -> &NodeId;
    fn tracking_state(&self) -> TrackingState;
    fn set_tracking_state(&mut self, state: TrackingState);
    fn modified_fields(&self) -> FieldSet;
    fn set_modified_fields(&mut self, fields: FieldSet);
    fn relation_descriptors(&self) -> &'static [RelationDescriptor];
}

/// Non-owning link from a child to the slot that owns it
///
/// Consulted for lookup and upward notification only. Traversals never
/// follow it and it is not serialized; it is rebuilt from the forward
/// relations when a graph is deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentLink {
    pub owner: NodeId,
    pub relation: RelationId,
}

/// Target of a single relation
///
/// `owned` distinguishes a child attached through this slot (removed with
/// its owner) from a plain reference to a node owned elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleRef {
    pub(crate) target: Option<NodeId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) owned: bool,
}

impl SingleRef {
    pub fn target(&self) -> Option<&NodeId> {
        self.target.as_ref()
    }

    pub fn is_owned(&self) -> bool {
        self.owned && self.target.is_some()
    }
}

/// One relation slot on a node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Single(SingleRef),
    Collection(TrackingCollection),
}

impl Relation {
    pub(crate) fn empty(kind: RelationKind) -> Self {
        match kind {
            RelationKind::Single => Relation::Single(SingleRef::default()),
            RelationKind::Collection => Relation::Collection(TrackingCollection::default()),
        }
    }

    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::Single(_) => RelationKind::Single,
            Relation::Collection(_) => RelationKind::Collection,
        }
    }

    /// Every node id in this slot: live members first, then the shadow list
    pub fn node_ids(&self) -> Vec<NodeId> {
        match self {
            Relation::Single(single) => single.target.iter().cloned().collect(),
            Relation::Collection(coll) => coll
                .members()
                .iter()
                .chain(coll.deleted().iter())
                .cloned()
                .collect(),
        }
    }

    /// Node ids owned through this slot
    pub(crate) fn owned_ids(&self) -> Vec<NodeId> {
        match self {
            Relation::Single(single) if single.owned => single.target.iter().cloned().collect(),
            Relation::Single(_) => Vec::new(),
            Relation::Collection(_) => self.node_ids(),
        }
    }
}

/// A graph element: tracking header plus the caller's payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node<E> {
    pub(crate) id: NodeId,
    #[serde(default)]
    pub(crate) state: TrackingState,
    #[serde(default)]
    pub(crate) modified: FieldSet,
    #[serde(skip)]
    pub(crate) observing: bool,
    #[serde(skip)]
    pub(crate) parent: Option<ParentLink>,
    pub(crate) data: E,
    pub(crate) relations: Vec<Relation>,
}

impl<E: Entity> Node<E> {
    pub(crate) fn detached(id: NodeId, data: E, state: TrackingState) -> Self {
        let relations = data
            .relations()
            .iter()
            .map(|r| Relation::empty(r.kind))
            .collect();
        Self {
            id,
            state,
            modified: FieldSet::new(),
            observing: false,
            parent: None,
            data,
            relations,
        }
    }

    /// Header and payload only; relation slots empty
    pub(crate) fn shallow_copy(&self) -> Self {
        let mut copy = Self::detached(self.id.clone(), self.data.clone(), self.state);
        copy.modified = self.modified;
        copy.parent = self.parent.clone();
        copy
    }
}

impl<E> Node<E> {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn modified(&self) -> FieldSet {
        self.modified
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn data(&self) -> &E {
        &self.data
    }

    /// Mutable payload access that bypasses change notification
    ///
    /// Use [`Graph::update`](crate::graph::Graph::update) for tracked edits.
    pub fn data_mut_untracked(&mut self) -> &mut E {
        &mut self.data
    }

    pub fn relation(&self, relation: RelationId) -> Option<&Relation> {
        self.relations.get(relation.index())
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub(crate) fn relation_mut(&mut self, relation: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(relation.index())
    }

    pub(crate) fn reset_tracking(&mut self) {
        self.state = TrackingState::Unchanged;
        self.modified.clear();
    }
}

impl<E: Entity> Trackable for Node<E> {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn tracking_state(&self) -> TrackingState {
        self.state
    }

    fn set_tracking_state(&mut self, state: TrackingState) {
        self.state = state;
        if state != TrackingState::Modified {
            self.modified.clear();
        }
    }

    fn modified_fields(&self) -> FieldSet {
        self.modified
    }

    fn set_modified_fields(&mut self, fields: FieldSet) {
        self.modified = fields;
    }

    fn relation_descriptors(&self) -> &'static [RelationDescriptor] {
        self.data.relations()
    }
}

/// Detached tree of new nodes, used to build a graph or insert into one
///
/// The identifier is generated up front so callers can keep a handle to a
/// node before it is attached.
#[derive(Debug, Clone)]
pub struct Subtree<E> {
    pub(crate) id: NodeId,
    pub(crate) data: E,
    pub(crate) children: Vec<(RelationId, Subtree<E>)>,
}

impl<E> Subtree<E> {
    pub fn new(data: E) -> Self {
        Self::with_id(NodeId::new(), data)
    }

    /// Rehydrate a node whose identifier is already known
    pub fn with_id(id: NodeId, data: E) -> Self {
        Self {
            id,
            data,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn data(&self) -> &E {
        &self.data
    }

    /// Append one child under `relation`
    #[must_use]
    pub fn with_child(mut self, relation: RelationId, child: Subtree<E>) -> Self {
        self.children.push((relation, child));
        self
    }

    /// Append several children under `relation`, keeping their order
    #[must_use]
    pub fn with_children<I>(mut self, relation: RelationId, children: I) -> Self
    where
        I: IntoIterator<Item = Subtree<E>>,
    {
        self.children
            .extend(children.into_iter().map(|child| (relation, child)));
        self
    }

    /// Ids of this node and every descendant, pre-order
    pub fn ids(&self) -> Vec<NodeId> {
        let mut out = vec![self.id.clone()];
        for (_, child) in &self.children {
            out.extend(child.ids());
        }
        out
    }
}
