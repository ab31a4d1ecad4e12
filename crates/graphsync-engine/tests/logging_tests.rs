#![allow(clippy::unwrap_used, clippy::expect_used)]

/// Engine commands log one start and one end or end_error
mod common;

use common::{new_context, order_row, InMemoryService, SubmitScript};
use graphsync_core::logging_facility::test_capture::init_test_capture;
use graphsync_core::{LoadBehavior, QuerySpec, RemoteError};
use graphsync_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};

#[test]
fn test_load_query_logs_result_count() {
    let capture = init_test_capture();
    let mut ctx = new_context();
    let service = InMemoryService::new().with_rows("Customer", vec![]);

    ctx.load(&service, &QuerySpec::new("Customer"), None).unwrap();

    let starts = capture.count_events(|e| {
        e.op.as_deref() == Some("load_query")
            && e.event.as_deref() == Some(EVENT_START)
            && e.field("entity_type") == Some("Customer")
    });
    assert!(starts >= 1);
    let ends = capture.count_events(|e| {
        e.op.as_deref() == Some("load_query")
            && e.event.as_deref() == Some(EVENT_END)
            && e.field("result_count") == Some("0")
    });
    assert!(ends >= 1);
}

#[test]
fn test_failed_submit_logs_external_service_code() {
    let capture = init_test_capture();
    let mut ctx = new_context();
    let service = InMemoryService::new();
    let order = ctx
        .container_mut()
        .load("Order", order_row(1, 5, 100), LoadBehavior::KeepCurrent)
        .unwrap();
    ctx.container_mut().set_value(order, "Total", 150).unwrap();
    service.script(SubmitScript::Error(RemoteError::Transport(
        "connection reset".to_string(),
    )));

    ctx.submit_changes(&service).unwrap_err();

    let errors = capture.count_events(|e| {
        e.op.as_deref() == Some("submit_changes")
            && e.event.as_deref() == Some(EVENT_END_ERROR)
            && e.field("err.code") == Some("ERR_EXTERNAL_SERVICE")
    });
    assert_eq!(errors, 1);
}
