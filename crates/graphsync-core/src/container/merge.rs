//! Reconciling server state with local state

use std::time::Instant;

use super::EntityContainer;
use crate::changeset::{BuiltChangeSet, EntityOperation};
use crate::entity::Entity;
use crate::errors::{GraphSyncError, Result};
use crate::model::{EntityHandle, EntityState, LoadBehavior, Notification, Values};
use crate::remote::{ChangeSetResultEntry, EntryOutcome};
use crate::schema::EntitySchema;
use crate::{log_op_end, log_op_error, log_op_start};

/// What `apply_submit_results` did with a batch of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Every entry succeeded; the whole changeset was accepted
    Accepted { accepted: usize },
    /// At least one entry failed; nothing was accepted
    Failed {
        conflicts: Vec<EntityHandle>,
        invalid: Vec<EntityHandle>,
    },
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

/// Copy `member` from `values` when present and different
fn take_value(entity: &mut Entity, values: &Values, member: &str, changed: &mut Vec<String>) {
    if let Some(v) = values.get(member) {
        if entity.values.get(member) != Some(v) {
            entity.values.insert(member.to_string(), v.clone());
            changed.push(member.to_string());
        }
    }
}

impl EntityContainer {
    /// Write incoming server values according to `behavior`
    ///
    /// Writes bypass read-only and change-tracking guards. A Detached
    /// entity takes every value member; a tracked one only its mergeable
    /// members (plus keys when `include_keys`, for server-generated keys).
    pub(crate) fn merge_values(
        &mut self,
        handle: EntityHandle,
        values: &Values,
        behavior: LoadBehavior,
        include_keys: bool,
    ) -> Result<()> {
        let ty = self.type_of(handle)?;
        let mergeable = self.schema.mergeable_members(ty.name());
        let mut changed: Vec<String> = Vec::new();

        let entity = self.entity_mut(handle)?;
        let state = entity.state;

        if state == EntityState::Detached {
            for member in ty.value_members() {
                take_value(entity, values, &member.name, &mut changed);
            }
        } else {
            if include_keys {
                for key in ty.key_members() {
                    take_value(entity, values, key, &mut changed);
                }
            }
            match behavior {
                LoadBehavior::KeepCurrent => {}
                LoadBehavior::RefreshCurrent => {
                    for member in &mergeable {
                        take_value(entity, values, member, &mut changed);
                    }
                    entity.clear_tracking();
                }
                LoadBehavior::MergeIntoCurrent => {
                    for member in &mergeable {
                        let locally_changed = entity
                            .original_value(member)
                            .is_some_and(|orig| entity.values.get(member) != Some(orig));
                        if !locally_changed {
                            take_value(entity, values, member, &mut changed);
                        }
                        if let (Some(original), Some(v)) =
                            (entity.original_values.as_mut(), values.get(member))
                        {
                            original.insert(member.clone(), v.clone());
                        }
                    }
                }
            }
        }

        let reverts = behavior == LoadBehavior::RefreshCurrent
            && state == EntityState::Modified
            && !entity.has_own_changes();

        tracing::trace!(entity = %handle, ?behavior, changed = changed.len(), "merged server values");
        for member in &changed {
            self.notify(Notification::PropertyChanged {
                entity: handle,
                member: member.clone(),
            });
        }
        for member in &changed {
            self.process_member_change(handle, member)?;
        }
        if reverts && !self.has_child_changes(handle)? {
            self.change_state(handle, EntityState::Unmodified)?;
        }
        Ok(())
    }

    /// Apply the server's answer to a submitted changeset
    ///
    /// Any failed entry fails the whole batch: conflicts and server
    /// validation errors are attached to their entities and nothing is
    /// accepted. Otherwise successful non-delete results are merged with
    /// `behavior` and every entry is accepted, deletes first so a freed
    /// identity can be claimed by an insert of the same batch.
    ///
    /// # Errors
    ///
    /// Returns `UnknownChangeSetEntry` for a result id the changeset does not
    /// contain (before anything is applied), or `DuplicateIdentity` if an
    /// accepted insert collides with a cached entity.
    pub fn apply_submit_results(
        &mut self,
        changeset: &BuiltChangeSet,
        results: &[ChangeSetResultEntry],
        behavior: LoadBehavior,
    ) -> Result<SubmitOutcome> {
        log_op_start!("apply_submit_results", entry_count = results.len());
        let start = Instant::now();

        let outcome = self
            .apply_submit_results_impl(changeset, results, behavior)
            .map_err(|e| {
                log_op_error!(
                    "apply_submit_results",
                    e,
                    duration_ms = start.elapsed().as_millis() as u64
                );
                e
            })?;

        log_op_end!(
            "apply_submit_results",
            duration_ms = start.elapsed().as_millis() as u64,
            success = outcome.is_success()
        );
        Ok(outcome)
    }

    fn apply_submit_results_impl(
        &mut self,
        changeset: &BuiltChangeSet,
        results: &[ChangeSetResultEntry],
        behavior: LoadBehavior,
    ) -> Result<SubmitOutcome> {
        let mut resolved = Vec::with_capacity(results.len());
        for result in results {
            let handle = changeset
                .handle_of(result.id)
                .ok_or(GraphSyncError::UnknownChangeSetEntry { id: result.id })?;
            resolved.push((handle, result));
        }

        if resolved.iter().any(|(_, r)| r.is_error()) {
            let mut conflicts = Vec::new();
            let mut invalid = Vec::new();
            for (handle, result) in resolved {
                match &result.outcome {
                    EntryOutcome::Conflict(conflict) => {
                        self.entity_mut(handle)?.conflict = Some(conflict.clone());
                        conflicts.push(handle);
                    }
                    EntryOutcome::ValidationFailed(errors) => {
                        let violations = errors.iter().cloned().map(Into::into).collect();
                        self.apply_server_errors(handle, violations)?;
                        invalid.push(handle);
                    }
                    EntryOutcome::Success { .. } => {}
                }
            }
            tracing::debug!(
                conflicts = conflicts.len(),
                invalid = invalid.len(),
                "submit failed, nothing accepted"
            );
            return Ok(SubmitOutcome::Failed { conflicts, invalid });
        }

        for (handle, result) in &resolved {
            let EntryOutcome::Success {
                values: Some(values),
            } = &result.outcome
            else {
                continue;
            };
            let operation = changeset
                .lookup(result.id)
                .map(|e| e.operation)
                .unwrap_or(EntityOperation::None);
            if operation != EntityOperation::Delete {
                self.merge_values(*handle, values, behavior, operation == EntityOperation::Insert)?;
            }
        }

        let mut ordered: Vec<EntityHandle> = Vec::with_capacity(changeset.len());
        for pass_deletes in [true, false] {
            for entry in changeset.entries() {
                if (entry.operation == EntityOperation::Delete) != pass_deletes {
                    continue;
                }
                if let Some(handle) = changeset.handle_of(entry.id) {
                    ordered.push(handle);
                }
            }
        }
        self.check_accept_identities(&ordered)?;
        for handle in &ordered {
            self.accept_one(*handle)?;
        }
        Ok(SubmitOutcome::Accepted {
            accepted: ordered.len(),
        })
    }
}
