use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use graphsync_core::remote::IncludedEntity;
use graphsync_core::schema::{AssociationDescriptor, MemberFlags, SchemaRegistry};
use graphsync_core::{
    ChangeSetEntry, ChangeSetResultEntry, EntityOperation, QueryResult, QuerySpec, RemoteError,
    RemoteExecutor, Value, Values,
};
use graphsync_engine::{ContextConfig, DomainContext};

/// Customer → Order → OrderLine, with `Order.Lines` as a composition
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
pub fn new_context() -> DomainContext {
    DomainContext::new(order_schema(), ContextConfig::default())
}

#[allow(dead_code)]
pub fn values(pairs: &[(&str, Value)]) -> Values {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[allow(dead_code)]
pub fn order_row(id: i64, customer_id: i64, total: i64) -> Values {
    values(&[
        ("Id", Value::Int(id)),
        ("CustomerId", Value::Int(customer_id)),
        ("Total", Value::Int(total)),
        ("Version", Value::Int(1)),
    ])
}

#[allow(dead_code)]
pub fn line_row(id: i64, order_id: i64, quantity: i64) -> Values {
    values(&[
        ("Id", Value::Int(id)),
        ("OrderId", Value::Int(order_id)),
        ("Quantity", Value::Int(quantity)),
    ])
}

/// What the in-memory service answers to the next submit
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum SubmitScript {
    /// Every entry succeeds; inserts get `Version = 1` back
    Succeed,
    /// The entry for the given entity type fails with this outcome
    FailType(String, graphsync_core::EntryOutcome),
    Error(RemoteError),
}

/// In-memory data service: rows per type, filter and paging on query,
/// scripted answers on submit
#[allow(dead_code)]
pub struct InMemoryService {
    rows: BTreeMap<String, Vec<Values>>,
    includes: Vec<IncludedEntity>,
    script: Mutex<SubmitScript>,
    submitted: Mutex<Vec<Vec<ChangeSetEntry>>>,
}

#[allow(dead_code)]
impl InMemoryService {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            includes: Vec::new(),
            script: Mutex::new(SubmitScript::Succeed),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rows(mut self, entity_type: &str, rows: Vec<Values>) -> Self {
        self.rows.entry(entity_type.to_string()).or_default().extend(rows);
        self
    }

    /// Rows returned alongside every query
    pub fn with_include(mut self, entity_type: &str, values: Values) -> Self {
        self.includes.push(IncludedEntity {
            entity_type: entity_type.to_string(),
            values,
        });
        self
    }

    pub fn script(&self, script: SubmitScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn submit_calls(&self) -> Vec<Vec<ChangeSetEntry>> {
        self.submitted.lock().unwrap().clone()
    }
}

impl RemoteExecutor for InMemoryService {
    fn query(&self, spec: &QuerySpec) -> Result<QueryResult, RemoteError> {
        let rows = self
            .rows
            .get(&spec.entity_type)
            .ok_or_else(|| RemoteError::Rejected(format!("no such set: {}", spec.entity_type)))?;
        let matching: Vec<Values> = rows.iter().filter(|r| spec.matches(r)).cloned().collect();
        let total = matching.len() as u64;

        let skip = spec.skip.unwrap_or(0) as usize;
        let take = spec.take.map(|t| t as usize).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(skip).take(take).collect();

        Ok(QueryResult {
            entities: page,
            included: self.includes.clone(),
            total_count: spec.include_total_count.then_some(total),
        })
    }

    fn submit(&self, entries: &[ChangeSetEntry]) -> Result<Vec<ChangeSetResultEntry>, RemoteError> {
        self.submitted.lock().unwrap().push(entries.to_vec());
        let script = self.script.lock().unwrap().clone();
        match script {
            SubmitScript::Error(err) => Err(err),
            SubmitScript::Succeed => Ok(entries
                .iter()
                .map(|e| {
                    if e.operation == EntityOperation::Insert && e.entity_type == "Order" {
                        ChangeSetResultEntry::success_with(
                            e.id,
                            values(&[("Version", Value::Int(1))]),
                        )
                    } else {
                        ChangeSetResultEntry::success(e.id)
                    }
                })
                .collect()),
            SubmitScript::FailType(entity_type, outcome) => Ok(entries
                .iter()
                .map(|e| {
                    if e.entity_type == entity_type {
                        ChangeSetResultEntry {
                            id: e.id,
                            outcome: outcome.clone(),
                        }
                    } else {
                        ChangeSetResultEntry::success(e.id)
                    }
                })
                .collect()),
        }
    }
}
