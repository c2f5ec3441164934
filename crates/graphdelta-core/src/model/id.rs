use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable cross-boundary identifier of a graph node
///
/// Assigned once when the node is constructed and never reassigned, not
/// even when the reconciler copies store-generated keys into the node. It
/// serializes as a plain string so it survives any wire format, which is
/// what lets two snapshots of the same graph be correlated after object
/// identity is lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a new identifier (UUIDv7)
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an identifier received from a serialized graph
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-side primary key of an entity
///
/// Distinct from [`NodeId`]: the key belongs to the store and may be
/// unknown (store-generated) until the first commit. It is the fallback
/// correlation key when node identifiers differ between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKey::Int(v) => write!(f, "{}", v),
            EntityKey::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(v: i64) -> Self {
        EntityKey::Int(v)
    }
}

impl From<&str> for EntityKey {
    fn from(v: &str) -> Self {
        EntityKey::Text(v.to_string())
    }
}
