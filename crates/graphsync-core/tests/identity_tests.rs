#![allow(clippy::unwrap_used, clippy::expect_used)]

/// Identity cache, attach/add/detach and set membership
mod common;

use common::{load_customer, load_order, new_container, values};
use graphsync_core::{EntityState, GraphSyncError, Identity, LoadBehavior, Value};

fn customer_identity(id: i64) -> Identity {
    Identity::from_values(vec![Value::Int(id)]).unwrap()
}

#[test]
fn test_reloading_same_identity_returns_same_entity() {
    let mut c = new_container();
    let first = load_customer(&mut c, 5, "Ada");
    let second = load_customer(&mut c, 5, "Ada");

    assert_eq!(first, second);
    assert_eq!(c.entity_set("Customer").unwrap().len(), 1);
}

#[test]
fn test_reload_with_refresh_current_updates_values() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");

    let again = c
        .load(
            "Customer",
            values(&[("Id", Value::Int(5)), ("Name", Value::from("Ada Lovelace"))]),
            LoadBehavior::RefreshCurrent,
        )
        .unwrap();

    assert_eq!(again, customer);
    assert_eq!(c.value(customer, "Name").unwrap(), &Value::from("Ada Lovelace"));
    assert_eq!(c.entity(customer).unwrap().state(), EntityState::Unmodified);
}

#[test]
fn test_reload_with_keep_current_ignores_server_values() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    load_customer(&mut c, 5, "Someone else");

    assert_eq!(c.value(customer, "Name").unwrap(), &Value::from("Ada"));
}

#[test]
fn test_load_without_key_fails() {
    let mut c = new_container();
    let err = c
        .load(
            "Customer",
            values(&[("Name", Value::from("Ada"))]),
            LoadBehavior::KeepCurrent,
        )
        .unwrap_err();

    assert_eq!(
        err,
        GraphSyncError::NullIdentity {
            type_name: "Customer".to_string()
        }
    );
}

#[test]
fn test_load_rejects_unknown_member() {
    let mut c = new_container();
    let err = c
        .load(
            "Customer",
            values(&[("Id", Value::Int(1)), ("Nickname", Value::from("A"))]),
            LoadBehavior::KeepCurrent,
        )
        .unwrap_err();

    assert!(matches!(err, GraphSyncError::UnknownMember { .. }));
}

#[test]
fn test_attach_requires_identity() {
    let mut c = new_container();
    let customer = c.create("Customer").unwrap();

    let err = c.attach(customer).unwrap_err();

    assert!(matches!(err, GraphSyncError::NullIdentity { .. }));
    assert_eq!(c.entity(customer).unwrap().state(), EntityState::Detached);
}

#[test]
fn test_attach_duplicate_identity_fails() {
    let mut c = new_container();
    load_customer(&mut c, 5, "Ada");
    let twin = c
        .create_with("Customer", values(&[("Id", Value::Int(5))]))
        .unwrap();

    let err = c.attach(twin).unwrap_err();

    assert!(matches!(err, GraphSyncError::DuplicateIdentity { .. }));
    assert_eq!(c.entity(twin).unwrap().state(), EntityState::Detached);
}

#[test]
fn test_add_duplicate_identity_fails() {
    let mut c = new_container();
    load_customer(&mut c, 5, "Ada");
    let twin = c
        .create_with("Customer", values(&[("Id", Value::Int(5))]))
        .unwrap();

    let err = c.add(twin).unwrap_err();

    assert!(matches!(err, GraphSyncError::DuplicateIdentity { .. }));
    assert!(!c.has_changes());
}

#[test]
fn test_new_entity_is_not_cached_until_accepted() {
    let mut c = new_container();
    let customer = c
        .create_with("Customer", values(&[("Id", Value::Int(8))]))
        .unwrap();
    c.add(customer).unwrap();

    assert_eq!(c.find("Customer", &customer_identity(8)).unwrap(), None);
    assert!(c.entity_set("Customer").unwrap().contains(customer));

    c.accept_changes().unwrap();

    assert_eq!(
        c.find("Customer", &customer_identity(8)).unwrap(),
        Some(customer)
    );
}

#[test]
fn test_adding_twice_fails() {
    let mut c = new_container();
    let customer = c.create("Customer").unwrap();
    c.add(customer).unwrap();

    let err = c.add(customer).unwrap_err();

    assert!(matches!(err, GraphSyncError::EntityAlreadyAttached { .. }));
}

#[test]
fn test_handles_do_not_cross_containers() {
    let mut a = new_container();
    let b = new_container();
    let customer = load_customer(&mut a, 5, "Ada");

    let err = b.entity(customer).unwrap_err();

    assert_eq!(err, GraphSyncError::CrossContainer { entity: customer });
}

#[test]
fn test_detach_stops_tracking_and_uncaches() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    c.set_value(customer, "Name", "Ada L.").unwrap();

    c.detach(customer).unwrap();

    let entity = c.entity(customer).unwrap();
    assert_eq!(entity.state(), EntityState::Detached);
    assert!(entity.entity_set().is_none());
    assert_eq!(entity.last_set(), Some("Customer"));
    assert_eq!(c.find("Customer", &customer_identity(5)).unwrap(), None);
    assert!(!c.has_changes());
}

#[test]
fn test_detach_untracked_entity_fails() {
    let mut c = new_container();
    let customer = c.create("Customer").unwrap();

    let err = c.detach(customer).unwrap_err();

    assert!(matches!(err, GraphSyncError::EntityNotInSet { .. }));
}

#[test]
fn test_clear_detaches_deleted_entities_too() {
    let mut c = new_container();
    let kept = load_order(&mut c, 1, 5);
    let deleted = load_order(&mut c, 2, 5);
    c.remove(deleted).unwrap();

    c.clear("Order").unwrap();

    assert!(c.entity_set("Order").unwrap().is_empty());
    assert_eq!(c.entity(kept).unwrap().state(), EntityState::Detached);
    assert_eq!(c.entity(deleted).unwrap().state(), EntityState::Detached);
    assert!(!c.has_changes());
}

#[test]
fn test_deleted_entity_keeps_identity_until_accepted() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    c.remove(customer).unwrap();

    let set = c.entity_set("Customer").unwrap();
    assert!(!set.contains(customer));
    assert_eq!(set.find(&customer_identity(5)), Some(customer));

    c.accept_changes().unwrap();

    assert_eq!(c.find("Customer", &customer_identity(5)).unwrap(), None);
    assert_eq!(c.entity(customer).unwrap().state(), EntityState::Detached);
}

#[test]
fn test_readding_deleted_entity_undoes_delete() {
    let mut c = new_container();
    let customer = load_customer(&mut c, 5, "Ada");
    c.remove(customer).unwrap();

    c.add(customer).unwrap();

    assert_eq!(c.entity(customer).unwrap().state(), EntityState::Unmodified);
    assert!(c.entity_set("Customer").unwrap().contains(customer));
    assert!(!c.has_changes());
}

#[test]
fn test_load_all_preserves_order() {
    let mut c = new_container();
    let rows = vec![
        values(&[("Id", Value::Int(3))]),
        values(&[("Id", Value::Int(1))]),
        values(&[("Id", Value::Int(2))]),
    ];

    let handles = c
        .load_all("Customer", rows, LoadBehavior::KeepCurrent)
        .unwrap();

    let ids: Vec<_> = handles
        .iter()
        .map(|h| c.value(*h, "Id").unwrap().as_int().unwrap())
        .collect();
    assert_eq!(ids, vec![3, 1, 2]);
}

#[test]
fn test_second_new_entity_with_same_key_is_rejected() {
    // GIVEN a New customer 7
    let mut c = new_container();
    let first = c
        .create_with("Customer", values(&[("Id", Value::Int(7))]))
        .unwrap();
    c.add(first).unwrap();
    let twin = c
        .create_with("Customer", values(&[("Id", Value::Int(7))]))
        .unwrap();

    // WHEN another customer 7 is added
    let err = c.add(twin).unwrap_err();

    // THEN it stays detached and accepting the first still succeeds
    assert!(matches!(err, GraphSyncError::DuplicateIdentity { .. }));
    assert_eq!(c.entity(twin).unwrap().state(), EntityState::Detached);
    c.accept_changes().unwrap();
    assert_eq!(c.find("Customer", &customer_identity(7)).unwrap(), Some(first));
    assert!(!c.has_changes());
}

#[test]
fn test_key_write_colliding_with_new_entity_fails() {
    let mut c = new_container();
    let first = c
        .create_with("Customer", values(&[("Id", Value::Int(7))]))
        .unwrap();
    c.add(first).unwrap();
    let second = c
        .create_with("Customer", values(&[("Id", Value::Int(8))]))
        .unwrap();
    c.add(second).unwrap();

    let err = c.set_value(second, "Id", 7).unwrap_err();

    assert!(matches!(err, GraphSyncError::DuplicateIdentity { .. }));
    assert_eq!(c.value(second, "Id").unwrap(), &Value::Int(8));
    c.accept_changes().unwrap();
    assert_eq!(c.entity_set("Customer").unwrap().len(), 2);
}

#[test]
fn test_loading_identity_held_by_new_entity_fails() {
    let mut c = new_container();
    let pending = c
        .create_with("Customer", values(&[("Id", Value::Int(7))]))
        .unwrap();
    c.add(pending).unwrap();

    let err = c
        .load(
            "Customer",
            values(&[("Id", Value::Int(7)), ("Name", Value::from("Server"))]),
            LoadBehavior::KeepCurrent,
        )
        .unwrap_err();

    assert!(matches!(err, GraphSyncError::DuplicateIdentity { .. }));
    assert_eq!(c.entity(pending).unwrap().state(), EntityState::New);
    assert_eq!(c.entity_set("Customer").unwrap().len(), 1);
}
