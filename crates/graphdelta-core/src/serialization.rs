//! JSON forms of a graph
//!
//! The arena form ([`to_json`]/[`from_json`]) stores each node once under
//! its id and relations as id lists, so shared references and cycles
//! survive a round trip. The nested form ([`to_nested_json`]) inlines
//! children under their owners for readers that expect a document tree; it
//! cannot express a node reached twice and rejects such graphs.

use std::collections::HashSet;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, TrackError};
use crate::graph::Graph;
use crate::model::{Entity, NodeId, Relation};
use crate::rules::validation::validate_graph;

/// Arena form, pretty-printed
pub fn to_json<E: Serialize>(graph: &Graph<E>) -> Result<String> {
    Ok(serde_json::to_string_pretty(graph)?)
}

/// Parse the arena form and validate the result
///
/// Parent links are rebuilt from the forward relations. The graph comes
/// back unobserved; call [`Graph::set_observing`] to resume tracking.
///
/// # Errors
///
/// `Serialization` for malformed JSON, `UnsupportedGraphShape` when the
/// arena violates a structural invariant.
pub fn from_json<E: Entity + DeserializeOwned>(json: &str) -> Result<Graph<E>> {
    let graph: Graph<E> = serde_json::from_str(json)?;
    validate_graph(&graph)?;
    Ok(graph)
}

/// Nested form: roots as an array, children inlined under relation names
///
/// Each node renders as `{ id, type, state, modified, data, <relation>... }`
/// where `modified` lists field names. Shadow-list entries of a collection
/// relation appear under `<relation>_deleted`.
///
/// # Errors
///
/// `UnsupportedGraphShape` when a node is reached twice (a cycle or a
/// shared reference).
pub fn to_nested_json<E: Entity + Serialize>(graph: &Graph<E>) -> Result<Value> {
    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    for id in graph.root().members().iter().chain(graph.root().deleted().iter()) {
        roots.push(nest(graph, id, &mut seen)?);
    }
    Ok(Value::Array(roots))
}

fn nest<E: Entity + Serialize>(graph: &Graph<E>, id: &NodeId, seen: &mut HashSet<NodeId>) -> Result<Value> {
    if !seen.insert(id.clone()) {
        return Err(TrackError::shape(format!(
            "node {} is reached twice; nested serialization needs a tree",
            id
        )));
    }
    let node = graph.node(id)?;
    let schema = node.data().schema();

    let mut object = Map::new();
    object.insert("id".to_string(), Value::String(id.to_string()));
    object.insert("type".to_string(), Value::String(schema.name.to_string()));
    object.insert("state".to_string(), Value::String(node.state().as_str().to_string()));
    object.insert(
        "modified".to_string(),
        Value::Array(
            schema
                .field_names(node.modified())
                .into_iter()
                .map(|name| Value::String(name.to_string()))
                .collect(),
        ),
    );
    object.insert("data".to_string(), serde_json::to_value(node.data())?);

    for (descriptor, rel) in schema.relations.iter().zip(node.relations()) {
        match rel {
            Relation::Single(single) => {
                let value = match single.target() {
                    Some(target) => nest(graph, target, seen)?,
                    None => Value::Null,
                };
                object.insert(descriptor.name.to_string(), value);
            }
            Relation::Collection(coll) => {
                let members = coll
                    .members()
                    .iter()
                    .map(|child| nest(graph, child, seen))
                    .collect::<Result<Vec<_>>>()?;
                object.insert(descriptor.name.to_string(), Value::Array(members));
                if !coll.deleted().is_empty() {
                    let deleted = coll
                        .deleted()
                        .iter()
                        .map(|child| nest(graph, child, seen))
                        .collect::<Result<Vec<_>>>()?;
                    object.insert(format!("{}_deleted", descriptor.name), Value::Array(deleted));
                }
            }
        }
    }

    Ok(Value::Object(object))
}
