//! Board/Card model for engine tests

use graphdelta_core::model::{
    Entity, EntityKey, EntitySchema, FieldId, FieldSet, RelationDescriptor, RelationId, Subtree,
};
use graphdelta_core::{Graph, MemoryStore, NodeId, StoreRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kanban {
    Board {
        id: Option<i64>,
        title: String,
        version: u64,
    },
    Card {
        id: Option<i64>,
        board_id: Option<i64>,
        text: String,
        version: u64,
    },
}

pub const KEY: FieldId = FieldId::new(0);
pub const BOARD_TITLE: FieldId = FieldId::new(1);
pub const BOARD_VERSION: FieldId = FieldId::new(2);
pub const CARD_BOARD_ID: FieldId = FieldId::new(1);
pub const CARD_TEXT: FieldId = FieldId::new(2);
pub const CARD_VERSION: FieldId = FieldId::new(3);

pub const CARDS: RelationId = RelationId::new(0);

static BOARD_SCHEMA: EntitySchema = EntitySchema {
    name: "Board",
    fields: &["board_id", "title", "version"],
    relations: &[RelationDescriptor::collection("cards")],
    store_generated: FieldSet::of(&[KEY, BOARD_VERSION]),
};

static CARD_SCHEMA: EntitySchema = EntitySchema {
    name: "Card",
    fields: &["card_id", "board_id", "text", "version"],
    relations: &[],
    store_generated: FieldSet::of(&[KEY, CARD_VERSION]),
};

impl Entity for Kanban {
    fn schema(&self) -> &'static EntitySchema {
        match self {
            Kanban::Board { .. } => &BOARD_SCHEMA,
            Kanban::Card { .. } => &CARD_SCHEMA,
        }
    }

    fn key(&self) -> Option<EntityKey> {
        match self {
            Kanban::Board { id, .. } | Kanban::Card { id, .. } => id.map(EntityKey::Int),
        }
    }

    fn merge_fields(&mut self, from: &Self, fields: FieldSet) {
        match (self, from) {
            (
                Kanban::Board { id, title, version },
                Kanban::Board {
                    id: f_id,
                    title: f_title,
                    version: f_version,
                },
            ) => {
                if fields.contains(KEY) {
                    *id = *f_id;
                }
                if fields.contains(BOARD_TITLE) {
                    title.clone_from(f_title);
                }
                if fields.contains(BOARD_VERSION) {
                    *version = *f_version;
                }
            }
            (
                Kanban::Card {
                    id,
                    board_id,
                    text,
                    version,
                },
                Kanban::Card {
                    id: f_id,
                    board_id: f_board,
                    text: f_text,
                    version: f_version,
                },
            ) => {
                if fields.contains(KEY) {
                    *id = *f_id;
                }
                if fields.contains(CARD_BOARD_ID) {
                    *board_id = *f_board;
                }
                if fields.contains(CARD_TEXT) {
                    text.clone_from(f_text);
                }
                if fields.contains(CARD_VERSION) {
                    *version = *f_version;
                }
            }
            _ => {}
        }
    }

    fn sync_foreign_keys(&mut self, relation: RelationId, parent: &Self) {
        if let (Kanban::Card { board_id, .. }, Kanban::Board { id, .. }) = (self, parent) {
            if relation == CARDS {
                *board_id = *id;
            }
        }
    }
}

impl StoreRecord for Kanban {
    fn assign_key(&mut self, key: i64) {
        match self {
            Kanban::Board { id, .. } | Kanban::Card { id, .. } => *id = Some(key),
        }
    }

    fn version(&self) -> u64 {
        match self {
            Kanban::Board { version, .. } | Kanban::Card { version, .. } => *version,
        }
    }

    fn set_version(&mut self, v: u64) {
        match self {
            Kanban::Board { version, .. } | Kanban::Card { version, .. } => *version = v,
        }
    }
}

#[allow(dead_code)]
pub fn card(id: Option<i64>, text: &str) -> Subtree<Kanban> {
    Subtree::new(Kanban::Card {
        id,
        board_id: None,
        text: text.to_string(),
        version: 1,
    })
}

#[allow(dead_code)]
pub fn card_text(graph: &Graph<Kanban>, id: &NodeId) -> String {
    match graph.data(id).unwrap() {
        Kanban::Card { text, .. } => text.clone(),
        Kanban::Board { .. } => panic!("not a card"),
    }
}

#[allow(dead_code)]
pub fn set_text(graph: &mut Graph<Kanban>, id: &NodeId, value: &str) {
    graph
        .update(id, CARD_TEXT, |data| {
            if let Kanban::Card { text, .. } = data {
                *text = value.to_string();
            }
        })
        .unwrap();
}

/// Board 1 with cards 10 and 11, observed, plus a store holding the same rows
#[allow(dead_code)]
pub fn board() -> (Graph<Kanban>, NodeId, Vec<NodeId>, MemoryStore<Kanban>) {
    let cards = [card(Some(10), "write tests"), card(Some(11), "ship")];
    let card_ids = cards.iter().map(|c| c.id().clone()).collect();
    let root = Subtree::new(Kanban::Board {
        id: Some(1),
        title: "Sprint".to_string(),
        version: 1,
    })
    .with_children(CARDS, cards);
    let board_id = root.id().clone();
    let graph = Graph::wrap([root], true).unwrap();
    let mut store = MemoryStore::new();
    store.seed(&graph);
    (graph, board_id, card_ids, store)
}
