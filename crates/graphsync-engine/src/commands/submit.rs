//! Submit pipeline
//!
//! Steps:
//! 1. Refuse if a submit is already in flight
//! 2. Optionally validate every New or Modified entity
//! 3. Build the changeset and mark its entities as submitting
//! 4. Hand the entries to the executor (or the caller, for the split form)
//! 5. Clear the submitting flags, then apply the per-entry results
//!
//! `begin_submit` / `complete_submit` / `cancel_submit` expose the pipeline
//! for callers that drive the remote call themselves. `submit_changes` runs
//! all of it against a `RemoteExecutor`.

#![allow(clippy::result_large_err)]

use std::time::Instant;

use graphsync_core::{
    log_op_end, log_op_error, log_op_start, BuiltChangeSet, ChangeSetBuilder, ChangeSetEntry,
    ChangeSetResultEntry, EntityHandle, EntityState, GraphSyncError, RemoteExecutor, Result,
    SubmitOutcome,
};
use graphsync_core_types::{RequestContext, RequestId};

use crate::context::DomainContext;

/// A built changeset whose entities are locked until completion
///
/// Returned by `begin_submit`. Consumed by exactly one of
/// `complete_submit` or `cancel_submit`.
#[derive(Debug)]
pub struct PendingSubmit {
    request: RequestContext,
    changeset: BuiltChangeSet,
}

impl PendingSubmit {
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn changeset(&self) -> &BuiltChangeSet {
        &self.changeset
    }

    /// Entries to send to the server
    pub fn entries(&self) -> &[ChangeSetEntry] {
        self.changeset.entries()
    }
}

impl DomainContext {
    /// Validate, build, and lock the pending changes
    ///
    /// # Errors
    ///
    /// * `SubmitInProgress` - another submit has not completed
    /// * `ValidationFailed` - listed entities failed whole-entity validation;
    ///   nothing is built or locked
    /// * any changeset build error, e.g. `IllegalReparent`
    pub fn begin_submit(&mut self) -> Result<PendingSubmit> {
        if self.in_flight.is_some() {
            return Err(GraphSyncError::SubmitInProgress);
        }

        if self.config.validate_before_submit {
            let invalid = self.invalid_changed_entities()?;
            if !invalid.is_empty() {
                return Err(GraphSyncError::ValidationFailed { entities: invalid });
            }
        }

        let changeset = ChangeSetBuilder::build(&mut self.container)?;
        self.container.set_submitting(changeset.handles(), true)?;

        let request = RequestContext::new();
        self.in_flight = Some(request.request_id.clone());
        Ok(PendingSubmit { request, changeset })
    }

    /// Unlock the entities and reconcile the server's answer
    ///
    /// # Errors
    ///
    /// * `Internal` - `pending` does not belong to the submit in flight
    /// * `UnknownChangeSetEntry` - a result id the changeset never issued
    pub fn complete_submit(
        &mut self,
        pending: PendingSubmit,
        results: &[ChangeSetResultEntry],
    ) -> Result<SubmitOutcome> {
        self.release(&pending)?;
        self.container.apply_submit_results(
            &pending.changeset,
            results,
            self.config.submit_load_behavior,
        )
    }

    /// Abandon a submit; pending changes stay as they were
    ///
    /// # Errors
    ///
    /// Returns `Internal` if `pending` does not belong to the submit in flight.
    pub fn cancel_submit(&mut self, pending: PendingSubmit) -> Result<()> {
        self.release(&pending)
    }

    /// Run the whole pipeline against `executor`
    ///
    /// An empty changeset completes as accepted without calling the
    /// executor. A failed remote call leaves every change pending.
    ///
    /// # Errors
    ///
    /// Any `begin_submit` or `complete_submit` error, or `Remote` when the
    /// executor fails or is cancelled.
    pub fn submit_changes(&mut self, executor: &dyn RemoteExecutor) -> Result<SubmitOutcome> {
        log_op_start!("submit_changes");
        let start = Instant::now();

        let (request_id, outcome) = self.submit_changes_impl(executor).map_err(|e| {
            log_op_error!(
                "submit_changes",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "submit_changes",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %request_id,
            success = outcome.is_success()
        );
        Ok(outcome)
    }

    fn submit_changes_impl(
        &mut self,
        executor: &dyn RemoteExecutor,
    ) -> Result<(RequestId, SubmitOutcome)> {
        let pending = self.begin_submit()?;
        let request_id = pending.request.request_id.clone();

        if pending.changeset.is_empty() {
            tracing::debug!(request_id = %request_id, "nothing to submit");
            let outcome = self.complete_submit(pending, &[])?;
            return Ok((request_id, outcome));
        }

        tracing::debug!(
            request_id = %request_id,
            entry_count = pending.changeset.len(),
            "submitting changeset"
        );

        match executor.submit(pending.entries()) {
            Ok(results) => {
                let outcome = self.complete_submit(pending, &results)?;
                Ok((request_id, outcome))
            }
            Err(remote) => {
                self.cancel_submit(pending)?;
                Err(remote.into())
            }
        }
    }

    fn release(&mut self, pending: &PendingSubmit) -> Result<()> {
        if self.in_flight.as_ref() != Some(&pending.request.request_id) {
            return Err(GraphSyncError::Internal {
                message: format!(
                    "submit {} is not in flight",
                    pending.request.request_id
                ),
            });
        }
        self.container
            .set_submitting(pending.changeset.handles(), false)?;
        self.in_flight = None;
        Ok(())
    }

    fn invalid_changed_entities(&mut self) -> Result<Vec<EntityHandle>> {
        let candidates: Vec<EntityHandle> = self
            .container
            .get_changes()
            .iter()
            .filter(|h| {
                self.container
                    .entity(*h)
                    .map(|e| e.state() != EntityState::Deleted)
                    .unwrap_or(false)
            })
            .collect();

        let mut invalid = Vec::new();
        for handle in candidates {
            if !self.container.validate_entity(handle)? {
                invalid.push(handle);
            }
        }
        Ok(invalid)
    }
}
