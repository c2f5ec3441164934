//! Shop model shared by the integration tests
//!
//! Customer -> orders (collection) -> details (collection), plus a single
//! `customer` relation on Order used for references and cycles.

use graphdelta_core::model::{
    Entity, EntityKey, EntitySchema, FieldId, FieldSet, NodeId, RelationDescriptor, RelationId,
    Subtree,
};
use graphdelta_core::{Graph, MemoryStore, StoreRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<i64>,
    pub name: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Option<i64>,
    pub customer_id: Option<i64>,
    pub freight: i64,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    pub id: Option<i64>,
    pub order_id: Option<i64>,
    pub product: String,
    pub quantity: u32,
    pub version: u64,
}

#[allow(dead_code)]
impl Customer {
    pub const KEY: FieldId = FieldId::new(0);
    pub const NAME: FieldId = FieldId::new(1);
    pub const VERSION: FieldId = FieldId::new(2);

    pub const ORDERS: RelationId = RelationId::new(0);
}

#[allow(dead_code)]
impl Order {
    pub const KEY: FieldId = FieldId::new(0);
    pub const CUSTOMER_ID: FieldId = FieldId::new(1);
    pub const FREIGHT: FieldId = FieldId::new(2);
    pub const VERSION: FieldId = FieldId::new(3);

    pub const DETAILS: RelationId = RelationId::new(0);
    pub const CUSTOMER: RelationId = RelationId::new(1);
}

#[allow(dead_code)]
impl Detail {
    pub const KEY: FieldId = FieldId::new(0);
    pub const ORDER_ID: FieldId = FieldId::new(1);
    pub const PRODUCT: FieldId = FieldId::new(2);
    pub const QUANTITY: FieldId = FieldId::new(3);
    pub const VERSION: FieldId = FieldId::new(4);
}

pub static CUSTOMER_SCHEMA: EntitySchema = EntitySchema {
    name: "Customer",
    fields: &["customer_id", "name", "version"],
    relations: &[RelationDescriptor::collection("orders")],
    store_generated: FieldSet::of(&[Customer::KEY, Customer::VERSION]),
};

pub static ORDER_SCHEMA: EntitySchema = EntitySchema {
    name: "Order",
    fields: &["order_id", "customer_id", "freight", "version"],
    relations: &[
        RelationDescriptor::collection("details"),
        RelationDescriptor::single("customer"),
    ],
    store_generated: FieldSet::of(&[Order::KEY, Order::VERSION]),
};

pub static DETAIL_SCHEMA: EntitySchema = EntitySchema {
    name: "Detail",
    fields: &["detail_id", "order_id", "product", "quantity", "version"],
    relations: &[],
    store_generated: FieldSet::of(&[Detail::KEY, Detail::VERSION]),
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shop {
    Customer(Customer),
    Order(Order),
    Detail(Detail),
}

#[allow(dead_code)]
impl Shop {
    pub fn as_order(&self) -> Option<&Order> {
        match self {
            Shop::Order(order) => Some(order),
            _ => None,
        }
    }

    pub fn as_customer(&self) -> Option<&Customer> {
        match self {
            Shop::Customer(customer) => Some(customer),
            _ => None,
        }
    }

    pub fn as_detail(&self) -> Option<&Detail> {
        match self {
            Shop::Detail(detail) => Some(detail),
            _ => None,
        }
    }

    fn id_mut(&mut self) -> &mut Option<i64> {
        match self {
            Shop::Customer(c) => &mut c.id,
            Shop::Order(o) => &mut o.id,
            Shop::Detail(d) => &mut d.id,
        }
    }
}

impl Entity for Shop {
    fn schema(&self) -> &'static EntitySchema {
        match self {
            Shop::Customer(_) => &CUSTOMER_SCHEMA,
            Shop::Order(_) => &ORDER_SCHEMA,
            Shop::Detail(_) => &DETAIL_SCHEMA,
        }
    }

    fn key(&self) -> Option<EntityKey> {
        let id = match self {
            Shop::Customer(c) => c.id,
            Shop::Order(o) => o.id,
            Shop::Detail(d) => d.id,
        };
        id.map(EntityKey::Int)
    }

    fn merge_fields(&mut self, from: &Self, fields: FieldSet) {
        match (self, from) {
            (Shop::Customer(to), Shop::Customer(from)) => {
                if fields.contains(Customer::KEY) {
                    to.id = from.id;
                }
                if fields.contains(Customer::NAME) {
                    to.name = from.name.clone();
                }
                if fields.contains(Customer::VERSION) {
                    to.version = from.version;
                }
            }
            (Shop::Order(to), Shop::Order(from)) => {
                if fields.contains(Order::KEY) {
                    to.id = from.id;
                }
                if fields.contains(Order::CUSTOMER_ID) {
                    to.customer_id = from.customer_id;
                }
                if fields.contains(Order::FREIGHT) {
                    to.freight = from.freight;
                }
                if fields.contains(Order::VERSION) {
                    to.version = from.version;
                }
            }
            (Shop::Detail(to), Shop::Detail(from)) => {
                if fields.contains(Detail::KEY) {
                    to.id = from.id;
                }
                if fields.contains(Detail::ORDER_ID) {
                    to.order_id = from.order_id;
                }
                if fields.contains(Detail::PRODUCT) {
                    to.product = from.product.clone();
                }
                if fields.contains(Detail::QUANTITY) {
                    to.quantity = from.quantity;
                }
                if fields.contains(Detail::VERSION) {
                    to.version = from.version;
                }
            }
            _ => {}
        }
    }

    fn sync_foreign_keys(&mut self, relation: RelationId, parent: &Self) {
        match (self, parent) {
            (Shop::Order(order), Shop::Customer(customer)) if relation == Customer::ORDERS => {
                order.customer_id = customer.id;
            }
            (Shop::Detail(detail), Shop::Order(order)) if relation == Order::DETAILS => {
                detail.order_id = order.id;
            }
            _ => {}
        }
    }
}

impl StoreRecord for Shop {
    fn assign_key(&mut self, key: i64) {
        *self.id_mut() = Some(key);
    }

    fn version(&self) -> u64 {
        match self {
            Shop::Customer(c) => c.version,
            Shop::Order(o) => o.version,
            Shop::Detail(d) => d.version,
        }
    }

    fn set_version(&mut self, version: u64) {
        match self {
            Shop::Customer(c) => c.version = version,
            Shop::Order(o) => o.version = version,
            Shop::Detail(d) => d.version = version,
        }
    }
}

// ---------- builders ----------

#[allow(dead_code)]
pub fn customer(id: Option<i64>, name: &str) -> Subtree<Shop> {
    Subtree::new(Shop::Customer(Customer {
        id,
        name: name.to_string(),
        version: 1,
    }))
}

#[allow(dead_code)]
pub fn order(id: Option<i64>, customer_id: Option<i64>, freight: i64) -> Subtree<Shop> {
    Subtree::new(Shop::Order(Order {
        id,
        customer_id,
        freight,
        version: 1,
    }))
}

#[allow(dead_code)]
pub fn detail(id: Option<i64>, order_id: Option<i64>, product: &str, quantity: u32) -> Subtree<Shop> {
    Subtree::new(Shop::Detail(Detail {
        id,
        order_id,
        product: product.to_string(),
        quantity,
        version: 1,
    }))
}

/// A new order (no keys yet) with new detail lines
#[allow(dead_code)]
pub fn new_order(freight: i64, products: &[&str]) -> Subtree<Shop> {
    order(None, None, freight).with_children(
        Order::DETAILS,
        products.iter().map(|p| detail(None, None, p, 1)),
    )
}

/// Ids of the persisted baseline built by [`shop`]
#[allow(dead_code)]
pub struct ShopFixture {
    pub graph: Graph<Shop>,
    pub customer: NodeId,
    /// O1 (key 10) and O2 (key 11)
    pub orders: Vec<NodeId>,
    /// Detail lines of O1 (keys 100, 101)
    pub details: Vec<NodeId>,
}

/// Customer 1 with orders O1 (two detail lines) and O2, observed
#[allow(dead_code)]
pub fn shop() -> ShopFixture {
    let d1 = detail(Some(100), Some(10), "apples", 3);
    let d2 = detail(Some(101), Some(10), "pears", 5);
    let details = vec![d1.id().clone(), d2.id().clone()];

    let o1 = order(Some(10), Some(1), 250).with_children(Order::DETAILS, [d1, d2]);
    let o2 = order(Some(11), Some(1), 400);
    let orders = vec![o1.id().clone(), o2.id().clone()];

    let root = customer(Some(1), "Alfreds").with_children(Customer::ORDERS, [o1, o2]);
    let customer = root.id().clone();

    let graph = Graph::wrap([root], true).unwrap();
    ShopFixture {
        graph,
        customer,
        orders,
        details,
    }
}

/// Store holding exactly the rows of `graph`
#[allow(dead_code)]
pub fn seeded_store(graph: &Graph<Shop>) -> MemoryStore<Shop> {
    let mut store = MemoryStore::new();
    store.seed(graph);
    store
}

#[allow(dead_code)]
pub fn freight(graph: &Graph<Shop>, id: &NodeId) -> i64 {
    graph.data(id).unwrap().as_order().unwrap().freight
}

#[allow(dead_code)]
pub fn set_freight(graph: &mut Graph<Shop>, id: &NodeId, value: i64) {
    graph
        .update(id, Order::FREIGHT, |data| {
            if let Shop::Order(order) = data {
                order.freight = value;
            }
        })
        .unwrap();
}
