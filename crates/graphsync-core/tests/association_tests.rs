#![allow(clippy::unwrap_used, clippy::expect_used)]

/// Key-predicate association views and their maintenance
mod common;

use common::{load_customer, load_line, load_order, new_container, values};
use graphsync_core::{
    CollectionChangeAction, EntityState, GraphSyncError, Notification, Value,
};

#[test]
fn test_collection_loads_by_key_predicate() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let mine = load_order(&mut c, 1, 5);
    load_order(&mut c, 2, 6);

    assert_eq!(c.collection(customer, "Orders").unwrap(), vec![mine]);
}

#[test]
fn test_reference_resolves_by_foreign_key() {
    let mut c = new_container();
    let order = load_order(&mut c, 1, 5);
    let line = load_line(&mut c, 11, 1, 2);

    assert_eq!(c.get_ref(line, "Order").unwrap(), Some(order));
    assert_eq!(c.get_ref(order, "Customer").unwrap(), None);
}

#[test]
fn test_new_entity_joins_view_only_after_accept() {
    // GIVEN a customer whose orders were already read
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    assert!(c.collection(customer, "Orders").unwrap().is_empty());

    // WHEN a matching order is added on its own
    let order = c
        .create_with(
            "Order",
            values(&[("Id", Value::Int(3)), ("CustomerId", Value::Int(5))]),
        )
        .unwrap();
    c.add(order).unwrap();

    // THEN it stays out of the view until accepted
    assert!(c.collection(customer, "Orders").unwrap().is_empty());
    c.accept_changes().unwrap();
    assert_eq!(c.collection(customer, "Orders").unwrap(), vec![order]);
}

#[test]
fn test_new_reference_target_resolves_after_accept() {
    let mut c = new_container();
    let order = load_order(&mut c, 1, 7);
    assert_eq!(c.get_ref(order, "Customer").unwrap(), None);

    let customer = c
        .create_with("Customer", values(&[("Id", Value::Int(7))]))
        .unwrap();
    c.add(customer).unwrap();
    assert_eq!(c.get_ref(order, "Customer").unwrap(), None);

    c.accept_changes().unwrap();
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(customer));
}

#[test]
fn test_foreign_key_edit_moves_entity_between_views() {
    // GIVEN two customers with materialized order views
    let mut c = new_container();
    let first = load_customer(&mut c, 5, "Ada");
    let second = load_customer(&mut c, 6, "Bob");
    let order = load_order(&mut c, 1, 5);
    assert_eq!(c.collection(first, "Orders").unwrap(), vec![order]);
    assert!(c.collection(second, "Orders").unwrap().is_empty());
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(first));
    c.drain_notifications();

    // WHEN the order's foreign key changes
    c.set_value(order, "CustomerId", 6).unwrap();

    // THEN it leaves the first view and joins the second
    assert!(c.collection(first, "Orders").unwrap().is_empty());
    assert_eq!(c.collection(second, "Orders").unwrap(), vec![order]);
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(second));

    let notifications = c.drain_notifications();
    assert!(notifications.contains(&Notification::CollectionChanged {
        owner: first,
        member: "Orders".to_string(),
        action: CollectionChangeAction::Removed,
        entity: order,
    }));
    assert!(notifications.contains(&Notification::CollectionChanged {
        owner: second,
        member: "Orders".to_string(),
        action: CollectionChangeAction::Added,
        entity: order,
    }));
    assert!(notifications.contains(&Notification::PropertyChanged {
        entity: order,
        member: "Customer".to_string(),
    }));
}

#[test]
fn test_set_ref_writes_foreign_key_and_updates_reverse_view() {
    let mut c = new_container();
    let first = load_customer(&mut c, 5, "Ada");
    let second = load_customer(&mut c, 6, "Bob");
    let order = load_order(&mut c, 1, 5);
    c.collection(first, "Orders").unwrap();
    c.collection(second, "Orders").unwrap();

    c.set_ref(order, "Customer", Some(second)).unwrap();

    assert_eq!(c.value(order, "CustomerId").unwrap(), &Value::Int(6));
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(second));
    assert!(c.collection(first, "Orders").unwrap().is_empty());
    assert_eq!(c.collection(second, "Orders").unwrap(), vec![order]);
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Modified);
}

#[test]
fn test_set_ref_to_none_clears_foreign_key() {
    let mut c = new_container();
    load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 5);

    c.set_ref(order, "Customer", None).unwrap();

    assert_eq!(c.value(order, "CustomerId").unwrap(), &Value::Null);
    assert_eq!(c.get_ref(order, "Customer").unwrap(), None);
}

#[test]
fn test_set_ref_to_same_target_changes_nothing() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 5);

    c.set_ref(order, "Customer", Some(customer)).unwrap();

    assert_eq!(c.entity(order).unwrap().state(), EntityState::Unmodified);
}

#[test]
fn test_deleted_target_is_not_resolved() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 5);
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(customer));

    c.remove(customer).unwrap();

    assert_eq!(c.get_ref(order, "Customer").unwrap(), None);
}

#[test]
fn test_removing_from_plain_association_clears_foreign_key() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 5);

    assert!(c.collection_remove(customer, "Orders", order).unwrap());

    assert_eq!(c.value(order, "CustomerId").unwrap(), &Value::Null);
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Modified);
    assert!(c.collection(customer, "Orders").unwrap().is_empty());
    assert!(!c.collection_remove(customer, "Orders", order).unwrap());
}

#[test]
fn test_adding_to_plain_association_writes_foreign_key() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 9);

    c.collection_add(customer, "Orders", order).unwrap();

    assert_eq!(c.value(order, "CustomerId").unwrap(), &Value::Int(5));
    assert_eq!(c.collection(customer, "Orders").unwrap(), vec![order]);
    assert_eq!(c.get_ref(order, "Customer").unwrap(), Some(customer));
}

#[test]
fn test_detached_entity_leaves_views() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let order = load_order(&mut c, 1, 5);
    assert_eq!(c.collection(customer, "Orders").unwrap(), vec![order]);

    c.detach(order).unwrap();

    assert!(c.collection(customer, "Orders").unwrap().is_empty());
}

#[test]
fn test_detaching_owner_tears_down_observers() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    load_order(&mut c, 1, 5);
    c.collection(customer, "Orders").unwrap();
    assert_eq!(
        c.entity_set("Order").unwrap().observed_associations(),
        vec!["Customer.Orders".to_string()]
    );

    c.detach(customer).unwrap();

    assert!(c
        .entity_set("Order")
        .unwrap()
        .observed_associations()
        .is_empty());
}

#[test]
fn test_view_materialized_before_add_keeps_observing() {
    // GIVEN a detached customer whose collection was read before tracking
    let mut c = new_container();
    let customer = c
        .create_with("Customer", values(&[("Id", Value::Int(5))]))
        .unwrap();
    assert!(c.collection(customer, "Orders").unwrap().is_empty());
    c.attach(customer).unwrap();

    // WHEN a matching order is loaded
    let order = load_order(&mut c, 1, 5);

    // THEN the view picks it up
    assert_eq!(c.collection(customer, "Orders").unwrap(), vec![order]);
}

#[test]
fn test_cardinality_mismatch_is_not_supported() {
    let mut c = new_container();
    let order = load_order(&mut c, 1, 5);

    let err = c.collection(order, "Customer").unwrap_err();
    assert!(matches!(err, GraphSyncError::OperationNotSupported { .. }));

    let err = c.get_ref(order, "Lines").unwrap_err();
    assert!(matches!(err, GraphSyncError::OperationNotSupported { .. }));
}

#[test]
fn test_non_association_members_are_rejected() {
    let mut c = new_container();
    let order = load_order(&mut c, 1, 5);

    assert_eq!(
        c.collection(order, "Total").unwrap_err(),
        GraphSyncError::NotAnAssociation {
            type_name: "Order".to_string(),
            member: "Total".to_string(),
        }
    );
    assert!(matches!(
        c.get_ref(order, "Nope").unwrap_err(),
        GraphSyncError::UnknownMember { .. }
    ));
}

#[test]
fn test_wrong_target_type_is_rejected() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    let line = load_line(&mut c, 11, 1, 2);

    let err = c.collection_add(customer, "Orders", line).unwrap_err();

    assert!(matches!(err, GraphSyncError::TypeMismatch { .. }));
}
