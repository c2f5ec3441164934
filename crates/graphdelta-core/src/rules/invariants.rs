use std::collections::HashMap;

use crate::graph::Graph;
use crate::model::{Entity, NodeId, ParentLink, Relation, RelationId, TrackingState};

/// Every slot that owns each node; `None` is the root collection
pub fn owners<E>(graph: &Graph<E>) -> HashMap<NodeId, Vec<Option<ParentLink>>> {
    let mut owners: HashMap<NodeId, Vec<Option<ParentLink>>> = HashMap::new();

    for id in graph.root.members.iter().chain(graph.root.deleted.iter()) {
        owners.entry(id.clone()).or_default().push(None);
    }
    for (owner, node) in &graph.nodes {
        for (index, rel) in node.relations.iter().enumerate() {
            let Ok(ordinal) = u8::try_from(index) else {
                continue;
            };
            for child in rel.owned_ids() {
                owners.entry(child).or_default().push(Some(ParentLink {
                    owner: owner.clone(),
                    relation: RelationId::new(ordinal),
                }));
            }
        }
    }

    owners
}

/// Nodes whose relation slots disagree with their schema
///
/// Returns list of (node_id, reason) tuples
pub fn find_schema_mismatches<E: Entity>(graph: &Graph<E>) -> Vec<(NodeId, String)> {
    let mut mismatches = Vec::new();

    for (id, node) in &graph.nodes {
        let schema = node.data.schema();
        if node.relations.len() != schema.relations.len() {
            mismatches.push((
                id.clone(),
                format!(
                    "{} declares {} relations, node carries {}",
                    schema.name,
                    schema.relations.len(),
                    node.relations.len()
                ),
            ));
            continue;
        }
        for (descriptor, rel) in schema.relations.iter().zip(node.relations.iter()) {
            if descriptor.kind != rel.kind() {
                mismatches.push((
                    id.clone(),
                    format!("{}.{} is not a {:?} slot", schema.name, descriptor.name, descriptor.kind),
                ));
            }
        }
    }

    mismatches
}

/// Relation entries pointing at ids that are not in the arena
///
/// Returns list of (owner, missing_id) tuples; the owner is `None` for the
/// root collection
pub fn find_dangling_refs<E>(graph: &Graph<E>) -> Vec<(Option<NodeId>, NodeId)> {
    let mut dangling = Vec::new();

    for id in graph.root.members.iter().chain(graph.root.deleted.iter()) {
        if !graph.contains(id) {
            dangling.push((None, id.clone()));
        }
    }
    for (owner, node) in &graph.nodes {
        for rel in &node.relations {
            for target in rel.node_ids() {
                if !graph.contains(&target) {
                    dangling.push((Some(owner.clone()), target));
                }
            }
        }
    }

    dangling
}

/// Nodes owned by more than one slot
pub fn find_shared_ownership<E>(graph: &Graph<E>) -> Vec<NodeId> {
    owners(graph)
        .into_iter()
        .filter(|(_, slots)| slots.len() > 1)
        .map(|(id, _)| id)
        .collect()
}

/// Nodes in the arena that no slot owns
pub fn find_orphans<E>(graph: &Graph<E>) -> Vec<NodeId> {
    let owners = owners(graph);
    graph
        .nodes
        .keys()
        .filter(|id| !owners.contains_key(*id))
        .cloned()
        .collect()
}

/// Nodes whose parent link is not the slot that owns them
pub fn find_parent_link_mismatches<E>(graph: &Graph<E>) -> Vec<NodeId> {
    let owners = owners(graph);
    let mut mismatched = Vec::new();

    for (id, node) in &graph.nodes {
        match owners.get(id).map(Vec::as_slice) {
            Some([owner]) if owner.as_ref() == node.parent.as_ref() => {}
            Some([_]) => mismatched.push(id.clone()),
            // zero or several owners are reported by other checks
            _ => {}
        }
    }

    mismatched
}

/// Collection members whose state contradicts the list they sit in
///
/// Returns (live members that are `Deleted`, shadow entries that are not)
pub fn find_misplaced_deletions<E>(graph: &Graph<E>) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut live_deleted = Vec::new();
    let mut shadow_live = Vec::new();

    let collections = std::iter::once(&graph.root).chain(graph.nodes.values().flat_map(|n| {
        n.relations.iter().filter_map(|rel| match rel {
            Relation::Collection(coll) => Some(coll),
            Relation::Single(_) => None,
        })
    }));
    for coll in collections {
        for id in &coll.members {
            if graph.nodes.get(id).is_some_and(|n| n.state == TrackingState::Deleted) {
                live_deleted.push(id.clone());
            }
        }
        for id in &coll.deleted {
            if graph.nodes.get(id).is_some_and(|n| n.state != TrackingState::Deleted) {
                shadow_live.push(id.clone());
            }
        }
    }

    (live_deleted, shadow_live)
}

/// Nodes carrying modified fields while not `Modified`
pub fn find_stray_modified_sets<E>(graph: &Graph<E>) -> Vec<NodeId> {
    graph
        .nodes
        .values()
        .filter(|n| n.state != TrackingState::Modified && !n.modified.is_empty())
        .map(|n| n.id.clone())
        .collect()
}
