#![allow(clippy::unwrap_used, clippy::expect_used)]

/// Submit pipeline against an in-memory data service
mod common;

use std::sync::Arc;

use common::{
    line_row, new_context, order_row, order_schema, values, InMemoryService, SubmitScript,
};
use graphsync_core::{
    ChangeSetResultEntry, Entity, EntityConflict, EntityContainer, EntityOperation, EntityState,
    EntryOutcome, GraphSyncError, LoadBehavior, RemoteError, SubmitOutcome, ValidationViolation,
    Validator, Value,
};
use graphsync_engine::{ContextConfig, DomainContext};

struct PositiveQuantity;

impl Validator for PositiveQuantity {
    fn validate(&self, entity: &Entity, member: Option<&str>) -> Vec<ValidationViolation> {
        if entity.type_name() != "OrderLine" || !matches!(member, None | Some("Quantity")) {
            return Vec::new();
        }
        match entity.value("Quantity").and_then(Value::as_int) {
            Some(q) if q > 0 => Vec::new(),
            _ => vec![ValidationViolation::new(
                "Quantity must be positive",
                &["Quantity"],
            )],
        }
    }
}

fn validated_context(config: ContextConfig) -> DomainContext {
    let container =
        EntityContainer::new(order_schema()).with_validator(Arc::new(PositiveQuantity));
    DomainContext::with_container(container, config)
}

#[test]
fn test_submit_new_order_is_accepted_with_server_values() {
    // GIVEN a new order
    let mut ctx = new_context();
    let service = InMemoryService::new();
    let order = ctx
        .container_mut()
        .create_with("Order", values(&[("Id", Value::Int(10)), ("Total", Value::Int(0))]))
        .unwrap();
    ctx.container_mut().add(order).unwrap();

    // WHEN the changes are submitted
    let outcome = ctx.submit_changes(&service).unwrap();

    // THEN one insert was sent and accepted
    assert_eq!(outcome, SubmitOutcome::Accepted { accepted: 1 });
    let calls = service.submit_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0][0].operation, EntityOperation::Insert);

    // AND the server-generated version was merged before acceptance
    let c = ctx.container();
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Unmodified);
    assert_eq!(c.value(order, "Version").unwrap(), &Value::Int(1));
    assert!(!c.entity(order).unwrap().is_submitting());
    assert!(!ctx.has_changes());
    assert!(!ctx.is_submitting());
}

#[test]
fn test_submit_cascade_delete_detaches_whole_graph() {
    let mut ctx = new_context();
    let service = InMemoryService::new();
    let c = ctx.container_mut();
    let order = c.load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent).unwrap();
    let line = c.load("OrderLine", line_row(11, 1, 2), LoadBehavior::KeepCurrent).unwrap();
    c.remove(order).unwrap();

    let outcome = ctx.submit_changes(&service).unwrap();

    assert_eq!(outcome, SubmitOutcome::Accepted { accepted: 2 });
    let c = ctx.container();
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Detached);
    assert_eq!(c.entity(line).unwrap().state(), EntityState::Detached);
    assert!(!ctx.has_changes());
}

#[test]
fn test_empty_submit_does_not_call_service() {
    let mut ctx = new_context();
    let service = InMemoryService::new();

    let outcome = ctx.submit_changes(&service).unwrap();

    assert_eq!(outcome, SubmitOutcome::Accepted { accepted: 0 });
    assert!(service.submit_calls().is_empty());
    assert!(!ctx.is_submitting());
}

#[test]
fn test_conflict_fails_batch_and_keeps_changes() {
    // GIVEN a modified order and a new customer in the same batch
    let mut ctx = new_context();
    let service = InMemoryService::new();
    let c = ctx.container_mut();
    let order = c.load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent).unwrap();
    c.set_value(order, "Total", 150).unwrap();
    let customer = c
        .create_with("Customer", values(&[("Id", Value::Int(9))]))
        .unwrap();
    c.add(customer).unwrap();

    // WHEN the server reports a conflict on the order
    let conflict = EntityConflict {
        server_values: Some(order_row(1, 5, 120)),
        conflict_members: vec!["Total".to_string()],
        is_delete: false,
    };
    service.script(SubmitScript::FailType(
        "Order".to_string(),
        EntryOutcome::Conflict(conflict.clone()),
    ));
    let outcome = ctx.submit_changes(&service).unwrap();

    // THEN nothing was accepted and the conflict is on the order
    assert_eq!(
        outcome,
        SubmitOutcome::Failed {
            conflicts: vec![order],
            invalid: vec![],
        }
    );
    let c = ctx.container();
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Modified);
    assert_eq!(c.entity(customer).unwrap().state(), EntityState::New);
    assert_eq!(c.entity(order).unwrap().entity_conflict(), Some(&conflict));

    // AND the entities are writable again
    assert!(!c.entity(order).unwrap().is_submitting());
    assert!(!ctx.is_submitting());
    ctx.container_mut().set_value(order, "Total", 120).unwrap();
}

#[test]
fn test_remote_failure_unlocks_and_keeps_changes() {
    let mut ctx = new_context();
    let service = InMemoryService::new();
    let order = ctx
        .container_mut()
        .load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent)
        .unwrap();
    ctx.container_mut().set_value(order, "Total", 150).unwrap();
    service.script(SubmitScript::Error(RemoteError::Cancelled));

    let err = ctx.submit_changes(&service).unwrap_err();

    assert!(matches!(err, GraphSyncError::Remote { .. }));
    assert!(!ctx.is_submitting());
    assert!(ctx.has_changes());
    let c = ctx.container();
    assert_eq!(c.entity(order).unwrap().state(), EntityState::Modified);
    assert!(!c.entity(order).unwrap().is_submitting());
}

#[test]
fn test_pending_submit_locks_entities_and_context() {
    // GIVEN a begun submit
    let mut ctx = new_context();
    let order = ctx
        .container_mut()
        .load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent)
        .unwrap();
    ctx.container_mut().set_value(order, "Total", 150).unwrap();
    let pending = ctx.begin_submit().unwrap();
    assert_eq!(pending.entries().len(), 1);

    // THEN a second submit, a write and a reject are all refused
    assert!(matches!(
        ctx.begin_submit().unwrap_err(),
        GraphSyncError::SubmitInProgress
    ));
    assert!(matches!(
        ctx.container_mut().set_value(order, "Total", 1).unwrap_err(),
        GraphSyncError::EntityReadOnly { .. }
    ));
    assert!(matches!(
        ctx.reject_changes().unwrap_err(),
        GraphSyncError::SubmitInProgress
    ));

    // WHEN the caller completes it with the server's answer
    let results: Vec<_> = pending
        .entries()
        .iter()
        .map(|e| ChangeSetResultEntry::success(e.id))
        .collect();
    let outcome = ctx.complete_submit(pending, &results).unwrap();

    // THEN the change is accepted and the context is free again
    assert!(outcome.is_success());
    assert!(!ctx.is_submitting());
    assert_eq!(
        ctx.container().value(order, "Total").unwrap(),
        &Value::Int(150)
    );
    assert!(ctx.begin_submit().is_ok());
}

#[test]
fn test_cancel_submit_keeps_changes() {
    let mut ctx = new_context();
    let order = ctx
        .container_mut()
        .load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent)
        .unwrap();
    ctx.container_mut().set_value(order, "Total", 150).unwrap();
    let pending = ctx.begin_submit().unwrap();

    ctx.cancel_submit(pending).unwrap();

    assert!(!ctx.is_submitting());
    assert_eq!(
        ctx.container().entity(order).unwrap().state(),
        EntityState::Modified
    );
    ctx.container_mut().set_value(order, "Total", 175).unwrap();
}

#[test]
fn test_completing_foreign_submit_is_internal_error() {
    let mut owner = new_context();
    let mut other = new_context();
    let order = owner
        .container_mut()
        .load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent)
        .unwrap();
    owner.container_mut().set_value(order, "Total", 150).unwrap();
    let pending = owner.begin_submit().unwrap();

    let err = other.complete_submit(pending, &[]).unwrap_err();

    assert!(matches!(err, GraphSyncError::Internal { .. }));
    assert!(owner.is_submitting());
}

#[test]
fn test_invalid_changes_stop_submit_before_service() {
    // GIVEN a line edited to an invalid quantity
    let mut ctx = validated_context(ContextConfig::default());
    let service = InMemoryService::new();
    let c = ctx.container_mut();
    c.load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent).unwrap();
    let line = c.load("OrderLine", line_row(11, 1, 2), LoadBehavior::KeepCurrent).unwrap();
    c.set_value(line, "Quantity", 0).unwrap();

    // WHEN submitted
    let err = ctx.submit_changes(&service).unwrap_err();

    // THEN nothing reached the service and nothing is locked
    match err {
        GraphSyncError::ValidationFailed { entities } => assert!(entities.contains(&line)),
        other => panic!("expected ValidationFailed, got {other:?}"),
    }
    assert!(service.submit_calls().is_empty());
    assert!(!ctx.is_submitting());
    assert!(!ctx.container().entity(line).unwrap().is_submitting());
}

#[test]
fn test_disabled_validation_lets_server_decide() {
    let config = ContextConfig {
        validate_before_submit: false,
        ..ContextConfig::default()
    };
    let mut ctx = validated_context(config);
    let service = InMemoryService::new();
    let c = ctx.container_mut();
    c.load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent).unwrap();
    let line = c.load("OrderLine", line_row(11, 1, 2), LoadBehavior::KeepCurrent).unwrap();
    c.set_value(line, "Quantity", 0).unwrap();
    service.script(SubmitScript::FailType(
        "OrderLine".to_string(),
        EntryOutcome::ValidationFailed(vec![graphsync_core::remote::ServerValidationError {
            message: "Quantity out of range".to_string(),
            member_names: vec!["Quantity".to_string()],
        }]),
    ));

    let outcome = ctx.submit_changes(&service).unwrap();

    assert_eq!(service.submit_calls().len(), 1);
    match outcome {
        SubmitOutcome::Failed { conflicts, invalid } => {
            assert!(conflicts.is_empty());
            assert_eq!(invalid, vec![line]);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    let entity = ctx.container().entity(line).unwrap();
    assert!(entity
        .validation_errors()
        .iter()
        .any(|v| v.message == "Quantity out of range"));
}
