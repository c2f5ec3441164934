use crate::errors::{Result, TrackError};
use crate::graph::Graph;
use crate::model::Entity;

use super::invariants;

/// Validate the structure of a graph
///
/// Checks, in order:
///
/// 1. Relation slots match the schema in count and kind
/// 2. Every referenced id exists
/// 3. Each node is owned by exactly one slot (no sharing, no orphans)
/// 4. Parent links name the owning slot
/// 5. Shadow lists hold only `Deleted` nodes and live lists none
/// 6. Modified-field sets appear only on `Modified` nodes
///
/// # Errors
///
/// Returns `UnsupportedGraphShape` describing the first violation found.
pub fn validate_graph<E: Entity>(graph: &Graph<E>) -> Result<()> {
    if let Some((id, reason)) = invariants::find_schema_mismatches(graph).into_iter().next() {
        return Err(TrackError::shape(format!("node {}: {}", id, reason)));
    }

    if let Some((owner, missing)) = invariants::find_dangling_refs(graph).first() {
        let owner = owner.as_ref().map_or_else(|| "root".to_string(), ToString::to_string);
        return Err(TrackError::shape(format!(
            "{} refers to missing node {}",
            owner, missing
        )));
    }

    let mut shared = invariants::find_shared_ownership(graph);
    shared.sort();
    if let Some(id) = shared.first() {
        return Err(TrackError::shape(format!(
            "node {} is owned by more than one relation",
            id
        )));
    }

    if let Some(id) = invariants::find_orphans(graph).first() {
        return Err(TrackError::shape(format!(
            "node {} is not reachable from any relation",
            id
        )));
    }

    if let Some(id) = invariants::find_parent_link_mismatches(graph).first() {
        return Err(TrackError::shape(format!(
            "parent link of node {} does not name its owner",
            id
        )));
    }

    let (live_deleted, shadow_live) = invariants::find_misplaced_deletions(graph);
    if let Some(id) = live_deleted.first() {
        return Err(TrackError::shape(format!(
            "deleted node {} is still a live member",
            id
        )));
    }
    if let Some(id) = shadow_live.first() {
        return Err(TrackError::shape(format!(
            "node {} sits in a pending-deletion list but is not deleted",
            id
        )));
    }

    if let Some(id) = invariants::find_stray_modified_sets(graph).first() {
        return Err(TrackError::shape(format!(
            "node {} has modified fields but is not modified",
            id
        )));
    }

    Ok(())
}
