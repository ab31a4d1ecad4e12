//! Query loading
//!
//! Steps:
//! 1. Run the query on the executor
//! 2. Load the primary rows with the requested (or configured) behavior
//! 3. Load included rows of other types with the same behavior

#![allow(clippy::result_large_err)]

use std::time::Instant;

use graphsync_core::{
    log_op_end, log_op_error, log_op_start, EntityHandle, LoadBehavior, QuerySpec, RemoteExecutor,
    Result,
};

use crate::context::DomainContext;

/// Handles materialized by one query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadResult {
    /// Primary results, in server order
    pub entities: Vec<EntityHandle>,
    pub included: Vec<EntityHandle>,
    /// Present when the query asked for it and the server supplied it
    pub total_count: Option<u64>,
}

impl DomainContext {
    /// Query `executor` and merge the results into the container
    ///
    /// `behavior` falls back to `ContextConfig::query_load_behavior`.
    ///
    /// # Errors
    ///
    /// * `Remote` - the executor failed or was cancelled; nothing is loaded
    /// * `UnknownEntityType` / `UnknownMember` / `NullIdentity` - a row does
    ///   not fit the schema; rows before it stay loaded
    pub fn load(
        &mut self,
        executor: &dyn RemoteExecutor,
        spec: &QuerySpec,
        behavior: Option<LoadBehavior>,
    ) -> Result<LoadResult> {
        log_op_start!("load_query", entity_type = spec.entity_type.as_str());
        let start = Instant::now();

        let result = self.load_impl(executor, spec, behavior).map_err(|e| {
            log_op_error!(
                "load_query",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "load_query",
            duration_ms = start.elapsed().as_millis() as u64,
            result_count = result.entities.len()
        );
        Ok(result)
    }

    fn load_impl(
        &mut self,
        executor: &dyn RemoteExecutor,
        spec: &QuerySpec,
        behavior: Option<LoadBehavior>,
    ) -> Result<LoadResult> {
        let behavior = behavior.unwrap_or(self.config.query_load_behavior);
        let response = executor.query(spec)?;

        let entities = self
            .container
            .load_all(&spec.entity_type, response.entities, behavior)?;
        let included = response
            .included
            .into_iter()
            .map(|row| self.container.load(&row.entity_type, row.values, behavior))
            .collect::<Result<Vec<_>>>()?;

        Ok(LoadResult {
            entities,
            included,
            total_count: response.total_count,
        })
    }
}
