//! Remove, accept and reject

use std::collections::HashSet;
use std::time::Instant;

use super::EntityContainer;
use crate::errors::{GraphSyncError, Result};
use crate::graph_walk;
use crate::model::{EntityHandle, EntityState, Identity, Notification};
use crate::{log_op_end, log_op_error, log_op_start};

impl EntityContainer {
    /// Mark an entity for removal, cascading through its compositions
    ///
    /// Composed children are removed before their parent. New entities are
    /// detached outright; persisted ones become Deleted and stay cached
    /// until accepted.
    ///
    /// # Errors
    ///
    /// * `EntityNotInSet` - the entity is not attached or already Deleted
    /// * `OperationNotSupported` - a set in the cascade disallows removes
    ///
    /// On error nothing is removed.
    pub fn remove(&mut self, handle: EntityHandle) -> Result<()> {
        log_op_start!("remove", entity = %handle);
        let start = Instant::now();

        let removed = self.remove_impl(handle).map_err(|e| {
            log_op_error!("remove", e, duration_ms = start.elapsed().as_millis() as u64);
            e
        })?;

        log_op_end!(
            "remove",
            duration_ms = start.elapsed().as_millis() as u64,
            cascade_count = removed.saturating_sub(1)
        );
        Ok(())
    }

    pub(crate) fn remove_impl(&mut self, handle: EntityHandle) -> Result<usize> {
        let plan = self.plan_remove(handle)?;
        self.apply_remove_plan(handle, &plan)?;
        Ok(plan.len())
    }

    /// Cascade order for removing `handle`, children first
    ///
    /// Every set the cascade touches is checked for remove permission, so
    /// callers can plan before changing anything else.
    pub(crate) fn plan_remove(&mut self, handle: EntityHandle) -> Result<Vec<EntityHandle>> {
        let entity = self.entity(handle)?;
        if entity.entity_set.is_none() || entity.state == EntityState::Deleted {
            return Err(GraphSyncError::EntityNotInSet {
                entity: handle,
                type_name: entity.type_name().to_string(),
            });
        }

        let plan = graph_walk::post_order(handle, |h| self.composed_children(h))?;
        for &h in &plan {
            let type_name = self.type_of(h)?.name().to_string();
            if !self.entity_set(&type_name)?.operations().remove {
                return Err(GraphSyncError::OperationNotSupported {
                    type_name,
                    operation: "remove".to_string(),
                });
            }
        }
        Ok(plan)
    }

    pub(crate) fn apply_remove_plan(
        &mut self,
        root: EntityHandle,
        plan: &[EntityHandle],
    ) -> Result<()> {
        tracing::debug!(root = %root, planned = plan.len(), "removing entity graph");
        for &h in plan {
            self.remove_one(h)?;
        }
        Ok(())
    }

    fn remove_one(&mut self, handle: EntityHandle) -> Result<()> {
        self.leave_views(handle)?;
        let (type_name, state) = {
            let entity = self.entity_mut(handle)?;
            entity.custom_actions.clear();
            entity.edit_session = None;
            (entity.type_name().to_string(), entity.state)
        };
        self.set_mut(&type_name)?.unlist(handle);

        if state == EntityState::New {
            self.release_views(handle)?;
            let entity = self.entity_mut(handle)?;
            entity.entity_set = None;
            entity.clear_tracking();
            entity.parent = None;
            self.change_state(handle, EntityState::Detached)
        } else {
            self.change_state(handle, EntityState::Deleted)
        }
    }

    /// Accept every pending change in the container, deletes first
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentity` if an accepted New entity collides with a
    /// cached entity; nothing is accepted in that case.
    pub fn accept_changes(&mut self) -> Result<()> {
        log_op_start!("accept_changes");
        let start = Instant::now();

        let count = self.complete_all(true).map_err(|e| {
            log_op_error!(
                "accept_changes",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "accept_changes",
            duration_ms = start.elapsed().as_millis() as u64,
            entry_count = count
        );
        Ok(())
    }

    /// Revert every pending change in the container, deletes first
    ///
    /// # Errors
    ///
    /// Propagates arena lookups; rejecting never violates an invariant.
    pub fn reject_changes(&mut self) -> Result<()> {
        log_op_start!("reject_changes");
        let start = Instant::now();

        let count = self.complete_all(false).map_err(|e| {
            log_op_error!(
                "reject_changes",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "reject_changes",
            duration_ms = start.elapsed().as_millis() as u64,
            entry_count = count
        );
        Ok(())
    }

    fn complete_all(&mut self, accept: bool) -> Result<usize> {
        let changes = self.get_changes();
        let ordered: Vec<EntityHandle> = changes
            .removed
            .iter()
            .chain(changes.added.iter())
            .chain(changes.modified.iter())
            .copied()
            .collect();
        if accept {
            self.check_accept_identities(&ordered)?;
        }
        for &handle in &ordered {
            if accept {
                self.accept_one(handle)?;
            } else {
                self.reject_one(handle)?;
            }
        }
        Ok(ordered.len())
    }

    /// Accept one entity and, first, its dirty composed descendants
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentity` if an accepted New entity collides with a
    /// cached entity.
    pub fn accept_entity_changes(&mut self, handle: EntityHandle) -> Result<()> {
        self.complete_entity(handle, true)
    }

    /// Reject one entity and, first, its dirty composed descendants
    ///
    /// Rejecting an Unmodified entity without dirty children is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` / `CrossContainer` for a bad handle.
    pub fn reject_entity_changes(&mut self, handle: EntityHandle) -> Result<()> {
        self.complete_entity(handle, false)
    }

    fn complete_entity(&mut self, handle: EntityHandle, accept: bool) -> Result<()> {
        let order = graph_walk::post_order(handle, |h| self.dirty_children(h))?;
        if accept {
            self.check_accept_identities(&order)?;
        }
        // Parents in the walk must not re-derive their state from a child
        // that is halfway through.
        for &h in &order {
            self.entity_mut(h)?.suppress_child_updates = true;
        }
        let mut outcome = Ok(());
        for &h in &order {
            let step = if accept {
                self.accept_one(h)
            } else {
                self.reject_one(h)
            };
            if let Err(e) = step {
                outcome = Err(e);
                break;
            }
        }
        for &h in &order {
            self.entity_mut(h)?.suppress_child_updates = false;
        }
        outcome?;
        // Ancestors above the walk see the final state.
        self.on_child_update(handle)
    }

    /// Fail before accepting anything if two New entities of `handles`, or
    /// one of them and a cached entity, would share an identity
    pub(crate) fn check_accept_identities(&self, handles: &[EntityHandle]) -> Result<()> {
        let mut claimed: HashSet<(String, Identity)> = HashSet::new();
        for &handle in handles {
            let entity = self.entity(handle)?;
            if entity.state != EntityState::New {
                continue;
            }
            let Some(identity) = entity.identity() else {
                continue;
            };
            let type_name = entity.type_name().to_string();
            let cached = match self.entity_set(&type_name)?.find(&identity) {
                Some(existing) => {
                    existing != handle && self.entity(existing)?.state != EntityState::Deleted
                }
                None => false,
            };
            if cached || !claimed.insert((type_name.clone(), identity.clone())) {
                return Err(GraphSyncError::DuplicateIdentity {
                    type_name,
                    identity: identity.to_string(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn accept_one(&mut self, handle: EntityHandle) -> Result<()> {
        let (state, type_name, identity) = {
            let e = self.entity(handle)?;
            (e.state, e.type_name().to_string(), e.identity())
        };

        match state {
            EntityState::New => {
                if let Some(identity) = identity {
                    if let Some(existing) = self.entity_set(&type_name)?.find(&identity) {
                        if existing != handle
                            && self.entity(existing)?.state != EntityState::Deleted
                        {
                            return Err(GraphSyncError::DuplicateIdentity {
                                type_name,
                                identity: identity.to_string(),
                            });
                        }
                    }
                    self.set_mut(&type_name)?.cache(identity, handle);
                }
            }
            EntityState::Deleted => {
                self.set_mut(&type_name)?.uncache(handle);
                self.release_views(handle)?;
                let entity = self.entity_mut(handle)?;
                entity.entity_set = None;
                entity.parent = None;
            }
            _ => {}
        }

        {
            let entity = self.entity_mut(handle)?;
            entity.clear_tracking();
            entity.custom_actions.clear();
            entity.conflict = None;
            entity.edit_session = None;
        }

        match state {
            EntityState::New | EntityState::Modified => {
                self.change_state(handle, EntityState::Unmodified)?;
            }
            EntityState::Deleted => self.change_state(handle, EntityState::Detached)?,
            EntityState::Unmodified | EntityState::Detached => {}
        }
        if state == EntityState::New {
            self.refresh_observers(handle, None)?;
        }
        Ok(())
    }

    pub(crate) fn reject_one(&mut self, handle: EntityHandle) -> Result<()> {
        let (state, type_name) = {
            let e = self.entity(handle)?;
            (e.state, e.type_name().to_string())
        };
        if matches!(state, EntityState::Unmodified | EntityState::Detached) {
            return Ok(());
        }

        if state == EntityState::New {
            self.detach_one(handle)?;
            let entity = self.entity_mut(handle)?;
            entity.validation_errors.clear();
            entity.parent = None;
            return Ok(());
        }

        let restored: Vec<String> = {
            let entity = self.entity_mut(handle)?;
            let mut restored = Vec::new();
            if let Some(original) = entity.original_values.take() {
                for (member, value) in original {
                    if entity.values.get(&member) != Some(&value) {
                        entity.values.insert(member.clone(), value);
                        restored.push(member);
                    }
                }
            }
            entity.clear_tracking();
            entity.custom_actions.clear();
            entity.conflict = None;
            entity.edit_session = None;
            entity.validation_errors.retain(|v| v.origin.is_some());
            restored
        };
        for member in &restored {
            self.notify(Notification::PropertyChanged {
                entity: handle,
                member: member.clone(),
            });
        }

        if state == EntityState::Deleted {
            self.set_mut(&type_name)?.push(handle);
        }
        self.change_state(handle, EntityState::Unmodified)?;
        for member in &restored {
            self.process_member_change(handle, member)?;
        }
        if state == EntityState::Deleted {
            self.refresh_observers(handle, None)?;
        }
        self.mirror_errors(handle)
    }
}
