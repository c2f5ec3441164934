#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{detail, new_order, seeded_store, set_freight, shop, Customer, Order, Shop};
use graphdelta_core::store::{FlagOp, FlagRecord};
use graphdelta_core::{
    apply_changes, get_changes, ApplyOptions, Graph, MemoryStore, NodeId, StoreState, TrackError,
};

fn state_flags(flags: &[FlagRecord], wanted: StoreState) -> Vec<NodeId> {
    flags
        .iter()
        .filter(|f| f.op == FlagOp::State(wanted))
        .map(|f| f.node_id.clone())
        .collect()
}

#[test]
fn test_deleted_order_flags_children_before_parent() {
    let mut fx = shop();
    let o1 = fx.orders[0].clone();
    fx.graph
        .collection_mut(&fx.customer, Customer::ORDERS)
        .unwrap()
        .remove(&o1)
        .unwrap();
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = seeded_store(&fx.graph);

    let report = apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(
        state_flags(store.flags(), StoreState::Delete),
        vec![fx.details[0].clone(), fx.details[1].clone(), o1.clone()]
    );
    assert_eq!(report.deleted, 3);
    assert_eq!(report.neutralized, 2);

    // neutralization happens before any delete
    let first_delete = store
        .flags()
        .iter()
        .position(|f| f.op == FlagOp::State(StoreState::Delete))
        .unwrap();
    let neutralized = state_flags(&store.flags()[..first_delete], StoreState::Unchanged);
    assert_eq!(neutralized, fx.details);
}

#[test]
fn test_added_subtree_is_flagged_once() {
    let mut fx = shop();
    let fresh = new_order(30, &["plums", "figs"]);
    let order_id = fresh.id().clone();
    fx.graph
        .collection_mut(&fx.customer, Customer::ORDERS)
        .unwrap()
        .insert(fresh)
        .unwrap();
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    let report = apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(
        store.flags(),
        &[FlagRecord {
            node_id: order_id,
            op: FlagOp::State(StoreState::Insert),
        }]
    );
    assert_eq!(report.inserted, 1);
}

#[test]
fn test_modified_fields_are_flagged_dirty() {
    let mut fx = shop();
    let o2 = fx.orders[1].clone();
    set_freight(&mut fx.graph, &o2, 401);
    fx.graph.on_field_changed(&o2, Order::CUSTOMER_ID).unwrap();
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    let report = apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    let ops: Vec<FlagOp> = store.flags().iter().map(|f| f.op).collect();
    assert_eq!(
        ops,
        vec![
            FlagOp::State(StoreState::Unchanged),
            FlagOp::FieldDirty(Order::CUSTOMER_ID),
            FlagOp::FieldDirty(Order::FREIGHT),
        ]
    );
    assert_eq!(report.updated, 1);
    assert_eq!(report.dirty_fields, 2);
}

#[test]
fn test_modified_without_fields_is_full_update() {
    let mut fx = shop();
    let o2 = fx.orders[1].clone();
    {
        use graphdelta_core::Trackable;
        let node = fx.graph.node_mut(&o2).unwrap();
        node.set_tracking_state(graphdelta_core::TrackingState::Modified);
    }
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(state_flags(store.flags(), StoreState::Update), vec![o2]);
}

#[test]
fn test_collections_walk_in_reverse_index_order() {
    let mut fx = shop();
    let (o1, o2) = (fx.orders[0].clone(), fx.orders[1].clone());
    set_freight(&mut fx.graph, &o1, 1);
    set_freight(&mut fx.graph, &o2, 2);
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(state_flags(store.flags(), StoreState::Unchanged), vec![o2, o1]);
}

#[test]
fn test_unchanged_parent_recurses_into_children() {
    let mut fx = shop();
    let o1 = fx.orders[0].clone();
    let line = fx
        .graph
        .collection_mut(&o1, Order::DETAILS)
        .unwrap()
        .insert(detail(None, None, "kiwis", 2))
        .unwrap();
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(state_flags(store.flags(), StoreState::Insert), vec![line]);
    assert!(state_flags(store.flags(), StoreState::Update).is_empty());
}

#[test]
fn test_added_descendant_of_deleted_node_is_not_flagged() {
    let mut fx = shop();
    let o1 = fx.orders[0].clone();
    let line = fx
        .graph
        .collection_mut(&o1, Order::DETAILS)
        .unwrap()
        .insert(detail(None, None, "kiwis", 2))
        .unwrap();
    fx.graph
        .collection_mut(&fx.customer, Customer::ORDERS)
        .unwrap()
        .remove(&o1)
        .unwrap();
    let delta = get_changes(&fx.graph).unwrap();
    let mut store = MemoryStore::new();

    apply_changes(&delta, &mut store, &ApplyOptions::default()).unwrap();

    assert!(store.flags().iter().all(|f| f.node_id != line));
    assert_eq!(state_flags(store.flags(), StoreState::Delete).len(), 3);
}

#[test]
fn test_malformed_graph_fails_before_any_flag() {
    let fx = shop();
    let mut json: serde_json::Value = serde_json::to_value(&fx.graph).unwrap();
    // a modified-field set on an unchanged node
    json["nodes"][fx.orders[1].as_str()]["modified"] = serde_json::json!(4);
    let broken: Graph<Shop> = serde_json::from_value(json).unwrap();
    let mut store = MemoryStore::new();

    let err = apply_changes(&broken, &mut store, &ApplyOptions::default()).unwrap_err();

    assert!(matches!(err, TrackError::UnsupportedGraphShape { .. }));
    assert!(store.flags().is_empty());
}

#[test]
fn test_apply_accepts_whole_graph() {
    let mut fx = shop();
    set_freight(&mut fx.graph, &fx.orders[0].clone(), 3);
    let mut store = MemoryStore::new();

    let report = apply_changes(&fx.graph, &mut store, &ApplyOptions::default()).unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(store.flags().len(), 2);
}
