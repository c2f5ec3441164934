//! In-memory reference store
//!
//! Rows are keyed by entity type and primary key and carry a version stamp
//! for optimistic concurrency. Inserts generate keys from a shared sequence,
//! deletes refuse to remove a row that still has dependent rows, and a
//! failed commit leaves every row as it was.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use super::{StoreError, StoreHandle, StoreState};
use crate::graph::Graph;
use crate::model::{Entity, EntityKey, FieldId, FieldSet, NodeId, TrackingState};

/// Payload capability needed by [`MemoryStore`]
pub trait StoreRecord: Entity {
    /// Store the generated primary key
    fn assign_key(&mut self, key: i64);

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

/// Entity type name plus primary key
pub type RowKey = (&'static str, EntityKey);

#[derive(Debug, Clone)]
pub struct StoreRow<E> {
    pub data: E,
    pub version: u64,
    /// Row this one depends on (its owner in the graph it came from)
    pub parent_key: Option<RowKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    State(StoreState),
    FieldDirty(FieldId),
}

/// One flag assignment, in the order it was received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRecord {
    pub node_id: NodeId,
    pub op: FlagOp,
}

#[derive(Debug)]
pub struct MemoryStore<E> {
    rows: BTreeMap<RowKey, StoreRow<E>>,
    next_key: i64,
    pending: Vec<FlagRecord>,
    staged: Option<Graph<E>>,
    cancel_next: bool,
    commits: usize,
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_key: 1,
            pending: Vec::new(),
            staged: None,
            cancel_next: false,
            commits: 0,
        }
    }
}

impl<E: StoreRecord> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every keyed node of `graph` as an existing row
    pub fn seed(&mut self, graph: &Graph<E>) {
        for node in graph.nodes() {
            let Some(key) = node.data().key() else {
                continue;
            };
            if let EntityKey::Int(value) = key {
                self.next_key = self.next_key.max(value + 1);
            }
            let parent_key = graph
                .parent_of(node.id())
                .and_then(|link| graph.data(&link.owner).ok())
                .and_then(|owner| owner.key().map(|k| (owner.type_name(), k)));
            self.rows.insert(
                (node.data().type_name(), key),
                StoreRow {
                    data: node.data().clone(),
                    version: node.data().version(),
                    parent_key,
                },
            );
        }
    }

    pub fn row(&self, type_name: &'static str, key: impl Into<EntityKey>) -> Option<&StoreRow<E>> {
        self.rows.get(&(type_name, key.into()))
    }

    pub fn rows(&self) -> impl Iterator<Item = (&RowKey, &StoreRow<E>)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flags received since the last commit
    pub fn flags(&self) -> &[FlagRecord] {
        &self.pending
    }

    /// Successful commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Simulate a concurrent writer touching a row
    pub fn bump_version(&mut self, type_name: &'static str, key: impl Into<EntityKey>) -> bool {
        match self.rows.get_mut(&(type_name, key.into())) {
            Some(row) => {
                row.version += 1;
                row.data.set_version(row.version);
                true
            }
            None => false,
        }
    }

    /// Make the next commit fail with [`StoreError::Cancelled`]
    pub fn cancel_next_commit(&mut self) {
        self.cancel_next = true;
    }

    fn stage(&mut self, graph: &Graph<E>, record: FlagRecord) {
        if self.staged.is_none() {
            self.staged = Some(graph.clone());
        }
        tracing::debug!(node_id = %record.node_id, op = ?record.op, "store flag");
        self.pending.push(record);
    }
}

fn key_of<E: Entity>(id: &NodeId, data: &E) -> Result<RowKey, StoreError> {
    data.key()
        .map(|key| (data.type_name(), key))
        .ok_or_else(|| StoreError::ConstraintViolation {
            node_id: id.to_string(),
            reason: format!("{} row has no primary key", data.type_name()),
        })
}

fn missing(id: &NodeId) -> StoreError {
    StoreError::ConstraintViolation {
        node_id: id.to_string(),
        reason: "node is not part of the staged change set".to_string(),
    }
}

/// Working copy of the rows for one commit
struct Transaction<'a, E> {
    rows: BTreeMap<RowKey, StoreRow<E>>,
    next_key: i64,
    staged: &'a mut Graph<E>,
}

impl<E: StoreRecord> Transaction<'_, E> {
    fn owner_key(&self, id: &NodeId) -> Option<RowKey> {
        let link = self.staged.parent_of(id)?;
        let owner = self.staged.data(&link.owner).ok()?;
        owner.key().map(|k| (owner.type_name(), k))
    }

    /// Insert `id` and its owned subtree, owners first
    fn insert(&mut self, id: &NodeId) -> Result<(), StoreError> {
        for member in self.staged.owned_subtree(id) {
            let link = self.staged.parent_of(&member).cloned();
            let parent = link
                .as_ref()
                .and_then(|l| self.staged.data(&l.owner).ok())
                .cloned();
            let parent_key = self.owner_key(&member);

            let node = self.staged.node_mut(&member).map_err(|_| missing(&member))?;
            if node.state() != TrackingState::Added {
                continue;
            }
            let data = node.data_mut_untracked();
            if let (Some(link), Some(parent)) = (&link, &parent) {
                data.sync_foreign_keys(link.relation, parent);
            }
            if data.key().is_none() {
                data.assign_key(self.next_key);
                self.next_key += 1;
            } else if let Some(EntityKey::Int(value)) = data.key() {
                self.next_key = self.next_key.max(value + 1);
            }
            data.set_version(1);

            let key = key_of(&member, data)?;
            if self.rows.contains_key(&key) {
                return Err(StoreError::ConstraintViolation {
                    node_id: member.to_string(),
                    reason: format!("duplicate key {} for {}", key.1, key.0),
                });
            }
            self.rows.insert(
                key,
                StoreRow {
                    data: data.clone(),
                    version: 1,
                    parent_key,
                },
            );
        }
        Ok(())
    }

    /// Full update when `fields` is `None`, field-level otherwise
    fn update(&mut self, id: &NodeId, fields: Option<FieldSet>) -> Result<(), StoreError> {
        let node = self.staged.node_mut(id).map_err(|_| missing(id))?;
        let data = node.data_mut_untracked();
        let key = key_of(id, data)?;
        let row = self.rows.get_mut(&key).ok_or_else(|| StoreError::ConcurrencyConflict {
            node_id: id.to_string(),
        })?;
        if row.version != data.version() {
            return Err(StoreError::ConcurrencyConflict {
                node_id: id.to_string(),
            });
        }

        match fields {
            None => row.data = data.clone(),
            Some(fields) => row.data.merge_fields(data, fields),
        }
        row.version += 1;
        row.data.set_version(row.version);
        data.set_version(row.version);
        Ok(())
    }

    fn delete(&mut self, id: &NodeId) -> Result<(), StoreError> {
        let data = self.staged.data(id).map_err(|_| missing(id))?;
        let key = key_of(id, data)?;
        let row = self.rows.get(&key).ok_or_else(|| StoreError::ConcurrencyConflict {
            node_id: id.to_string(),
        })?;
        if row.version != data.version() {
            return Err(StoreError::ConcurrencyConflict {
                node_id: id.to_string(),
            });
        }
        if self.rows.values().any(|r| r.parent_key.as_ref() == Some(&key)) {
            return Err(StoreError::ConstraintViolation {
                node_id: id.to_string(),
                reason: format!("{} {} still has dependent rows", key.0, key.1),
            });
        }
        self.rows.remove(&key);
        Ok(())
    }
}

#[async_trait(?Send)]
impl<E: StoreRecord> StoreHandle<E> for MemoryStore<E> {
    fn set_state(&mut self, graph: &Graph<E>, id: &NodeId, state: StoreState) {
        self.stage(
            graph,
            FlagRecord {
                node_id: id.clone(),
                op: FlagOp::State(state),
            },
        );
    }

    fn set_field_dirty(&mut self, graph: &Graph<E>, id: &NodeId, field: FieldId) {
        self.stage(
            graph,
            FlagRecord {
                node_id: id.clone(),
                op: FlagOp::FieldDirty(field),
            },
        );
    }

    async fn commit(&mut self) -> Result<Graph<E>, StoreError> {
        let pending = std::mem::take(&mut self.pending);
        let staged = self.staged.take();
        if std::mem::take(&mut self.cancel_next) {
            tracing::debug!(flags = pending.len(), "commit cancelled");
            return Err(StoreError::Cancelled);
        }
        let Some(mut staged) = staged else {
            return Ok(Graph::new());
        };

        // Last state flag wins, and a node runs where that flag was given;
        // nodes with only dirty fields run at their first dirty flag.
        let mut states: HashMap<NodeId, (usize, StoreState)> = HashMap::new();
        let mut dirty: HashMap<NodeId, (usize, FieldSet)> = HashMap::new();
        for (position, record) in pending.iter().enumerate() {
            match record.op {
                FlagOp::State(state) => {
                    states.insert(record.node_id.clone(), (position, state));
                }
                FlagOp::FieldDirty(field) => {
                    dirty
                        .entry(record.node_id.clone())
                        .or_insert((position, FieldSet::EMPTY))
                        .1
                        .insert(field);
                }
            }
        }
        let mut order: Vec<(usize, NodeId)> = states
            .iter()
            .map(|(id, (position, _))| (*position, id.clone()))
            .chain(
                dirty
                    .iter()
                    .filter(|(id, _)| !states.contains_key(*id))
                    .map(|(id, (position, _))| (*position, id.clone())),
            )
            .collect();
        order.sort_unstable_by_key(|(position, _)| *position);

        let mut tx = Transaction {
            rows: self.rows.clone(),
            next_key: self.next_key,
            staged: &mut staged,
        };
        for (_, id) in &order {
            let state = states.get(id).map_or(StoreState::Unchanged, |(_, state)| *state);
            match state {
                StoreState::Insert => tx.insert(id)?,
                StoreState::Update => tx.update(id, None)?,
                StoreState::Delete => tx.delete(id)?,
                StoreState::Unchanged => {
                    if let Some((_, fields)) = dirty.get(id) {
                        tx.update(id, Some(*fields))?;
                    }
                }
            }
        }

        let Transaction { rows, next_key, .. } = tx;
        self.rows = rows;
        self.next_key = next_key;
        self.commits += 1;
        tracing::debug!(nodes = order.len(), rows = self.rows.len(), "commit applied");
        Ok(staged)
    }
}
