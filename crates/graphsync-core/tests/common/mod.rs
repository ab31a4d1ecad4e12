use std::sync::Arc;

use graphsync_core::schema::{AssociationDescriptor, MemberFlags, SchemaRegistry};
use graphsync_core::{EntityContainer, EntityHandle, LoadBehavior, Value, Values};

/// Customer → Order → OrderLine schema used across the scenario tests
///
/// `Order.Lines` is a composition; `Customer.Orders` and `Order.Customer`
/// are plain associations over `Order.CustomerId`.
#[allow(dead_code)]
pub fn order_schema() -> Arc<SchemaRegistry> {
    let schema = SchemaRegistry::builder()
        .entity("Customer", |t| {
            t.key("Id").data("Name").association(
                AssociationDescriptor::to_many("Orders", "Order")
                    .keys(&["Id"], &["CustomerId"])
                    .reverse("Customer"),
            )
        })
        .entity("Order", |t| {
            t.key("Id")
                .data("CustomerId")
                .data("Total")
                .data_with("Version", MemberFlags::default().with_roundtrip())
                .association(
                    AssociationDescriptor::to_many("Lines", "OrderLine")
                        .keys(&["Id"], &["OrderId"])
                        .composition()
                        .reverse("Order"),
                )
                .association(
                    AssociationDescriptor::to_one("Customer", "Customer")
                        .keys(&["CustomerId"], &["Id"])
                        .foreign_key()
                        .reverse("Orders"),
                )
        })
        .entity("OrderLine", |t| {
            t.key("Id").data("OrderId").data("Quantity").association(
                AssociationDescriptor::to_one("Order", "Order")
                    .keys(&["OrderId"], &["Id"])
                    .foreign_key(),
            )
        })
        .build()
        .expect("fixture schema is valid");
    Arc::new(schema)
}

#[allow(dead_code)]
pub fn new_container() -> EntityContainer {
    EntityContainer::new(order_schema())
}

/// Build a `Values` map from name/value pairs
#[allow(dead_code)]
pub fn values(pairs: &[(&str, Value)]) -> Values {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[allow(dead_code)]
pub fn load_customer(container: &mut EntityContainer, id: i64, name: &str) -> EntityHandle {
    container
        .load(
            "Customer",
            values(&[("Id", Value::Int(id)), ("Name", Value::from(name))]),
            LoadBehavior::KeepCurrent,
        )
        .expect("customer loads")
}

#[allow(dead_code)]
pub fn load_order(container: &mut EntityContainer, id: i64, customer_id: i64) -> EntityHandle {
    container
        .load(
            "Order",
            values(&[
                ("Id", Value::Int(id)),
                ("CustomerId", Value::Int(customer_id)),
                ("Total", Value::Int(100)),
                ("Version", Value::Int(1)),
            ]),
            LoadBehavior::KeepCurrent,
        )
        .expect("order loads")
}

#[allow(dead_code)]
pub fn load_line(
    container: &mut EntityContainer,
    id: i64,
    order_id: i64,
    quantity: i64,
) -> EntityHandle {
    container
        .load(
            "OrderLine",
            values(&[
                ("Id", Value::Int(id)),
                ("OrderId", Value::Int(order_id)),
                ("Quantity", Value::Int(quantity)),
            ]),
            LoadBehavior::KeepCurrent,
        )
        .expect("line loads")
}

/// Order 1 with lines 11 and 12, all Unmodified
#[allow(dead_code)]
pub fn loaded_order_with_lines(container: &mut EntityContainer) -> (EntityHandle, Vec<EntityHandle>) {
    let order = load_order(container, 1, 5);
    let lines = vec![load_line(container, 11, 1, 2), load_line(container, 12, 1, 3)];
    (order, lines)
}

/// Order → Lines → Notes and Order → Detail → Attachments, all compositions
///
/// `Order.Detail` is a to-one composition whose key lives on the detail.
#[allow(dead_code)]
pub fn nested_schema() -> Arc<SchemaRegistry> {
    let schema = SchemaRegistry::builder()
        .entity("Order", |t| {
            t.key("Id")
                .data("Total")
                .association(
                    AssociationDescriptor::to_many("Lines", "OrderLine")
                        .keys(&["Id"], &["OrderId"])
                        .composition(),
                )
                .association(
                    AssociationDescriptor::to_one("Detail", "OrderDetail")
                        .keys(&["Id"], &["OrderId"])
                        .composition(),
                )
        })
        .entity("OrderLine", |t| {
            t.key("Id").data("OrderId").data("Quantity").association(
                AssociationDescriptor::to_many("Notes", "Note")
                    .keys(&["Id"], &["LineId"])
                    .composition(),
            )
        })
        .entity("Note", |t| t.key("Id").data("LineId").data("Text"))
        .entity("OrderDetail", |t| {
            t.key("Id").data("OrderId").association(
                AssociationDescriptor::to_many("Attachments", "Attachment")
                    .keys(&["Id"], &["DetailId"])
                    .composition(),
            )
        })
        .entity("Attachment", |t| t.key("Id").data("DetailId"))
        .build()
        .expect("nested fixture schema is valid");
    Arc::new(schema)
}

/// Handles of the graph loaded by `load_nested_order`
#[allow(dead_code)]
pub struct NestedOrder {
    pub order: EntityHandle,
    pub line: EntityHandle,
    pub notes: Vec<EntityHandle>,
    pub detail: EntityHandle,
    pub attachment: EntityHandle,
}

/// Order 1 with line 11 (notes 101, 102) and detail 50 (attachment 901),
/// all Unmodified
#[allow(dead_code)]
pub fn load_nested_order(container: &mut EntityContainer) -> NestedOrder {
    let mut load = |type_name: &str, pairs: &[(&str, Value)]| {
        container
            .load(type_name, values(pairs), LoadBehavior::KeepCurrent)
            .expect("nested row loads")
    };
    let order = load("Order", &[("Id", Value::Int(1)), ("Total", Value::Int(10))]);
    let line = load(
        "OrderLine",
        &[("Id", Value::Int(11)), ("OrderId", Value::Int(1)), ("Quantity", Value::Int(2))],
    );
    let notes = vec![
        load("Note", &[("Id", Value::Int(101)), ("LineId", Value::Int(11))]),
        load("Note", &[("Id", Value::Int(102)), ("LineId", Value::Int(11))]),
    ];
    let detail = load("OrderDetail", &[("Id", Value::Int(50)), ("OrderId", Value::Int(1))]);
    let attachment = load("Attachment", &[("Id", Value::Int(901)), ("DetailId", Value::Int(50))]);
    NestedOrder {
        order,
        line,
        notes,
        detail,
        attachment,
    }
}
