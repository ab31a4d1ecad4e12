//! Member writes, edit sessions, custom actions and validation routing

use super::{check_value_members, EntityContainer};
use crate::entity::EditSession;
use crate::errors::{GraphSyncError, Result};
use crate::model::{
    EntityAction, EntityHandle, EntityState, Identity, LoadBehavior, Notification, Value, Values,
};
use crate::validation::ValidationViolation;

impl EntityContainer {
    /// Write one value member
    ///
    /// Unmodified entities become Modified and snapshot their originals.
    /// Writing the current value again is a no-op.
    ///
    /// # Errors
    ///
    /// * `UnknownMember` / `NotADataMember` - not a value member
    /// * `ReadOnlyMember` - the member is declared read-only
    /// * `EntityReadOnly` - a submit is in progress
    /// * `EntityDeleted` - the entity is Deleted
    /// * `OperationNotSupported` - the set disallows edits
    /// * `KeyMemberModified` - a key of a persisted entity
    /// * `DuplicateIdentity` - a New entity's key would collide with another
    ///   tracked entity
    pub fn set_value(
        &mut self,
        handle: EntityHandle,
        member: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        self.check_writable(handle, member)?;
        if self.entity(handle)?.values.get(member) == Some(&value) {
            return Ok(());
        }
        self.check_new_key(handle, member, &value)?;
        self.write_tracked(handle, member, value)
    }

    /// A key write on a tracked New entity must not duplicate an identity
    fn check_new_key(&self, handle: EntityHandle, member: &str, value: &Value) -> Result<()> {
        let entity = self.entity(handle)?;
        let ty = &entity.entity_type;
        if entity.state != EntityState::New || !ty.is_key(member) {
            return Ok(());
        }
        let key = ty
            .key_members()
            .iter()
            .map(|k| {
                if k == member {
                    value.clone()
                } else {
                    entity.values.get(k).cloned().unwrap_or_default()
                }
            })
            .collect();
        let Some(identity) = Identity::from_values(key) else {
            return Ok(());
        };
        if self
            .identity_holder(entity.type_name(), &identity, Some(handle))?
            .is_some()
        {
            return Err(GraphSyncError::DuplicateIdentity {
                type_name: entity.type_name().to_string(),
                identity: identity.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_writable(&self, handle: EntityHandle, member: &str) -> Result<()> {
        let entity = self.entity(handle)?;
        let ty = &entity.entity_type;
        check_value_members(ty, std::iter::once(&member.to_string()))?;
        if ty.member(member).is_some_and(|m| m.flags.read_only) {
            return Err(GraphSyncError::ReadOnlyMember {
                entity: handle,
                member: member.to_string(),
            });
        }
        if entity.is_submitting {
            return Err(GraphSyncError::EntityReadOnly {
                entity: handle,
                reason: "a submit is in progress".to_string(),
            });
        }
        match entity.state {
            EntityState::Deleted => return Err(GraphSyncError::EntityDeleted { entity: handle }),
            EntityState::Unmodified | EntityState::Modified => {
                let set = self.entity_set(entity.type_name())?;
                if !set.operations().edit {
                    return Err(GraphSyncError::OperationNotSupported {
                        type_name: entity.type_name().to_string(),
                        operation: "edit".to_string(),
                    });
                }
                if ty.is_key(member) {
                    return Err(GraphSyncError::KeyMemberModified {
                        entity: handle,
                        member: member.to_string(),
                    });
                }
            }
            EntityState::New | EntityState::Detached => {}
        }
        Ok(())
    }

    /// Write a value that already passed `check_writable`
    pub(crate) fn write_tracked(
        &mut self,
        handle: EntityHandle,
        member: &str,
        value: Value,
    ) -> Result<()> {
        let (state, in_session) = {
            let entity = self.entity_mut(handle)?;
            entity.record_change(member);
            entity.values.insert(member.to_string(), value);
            (entity.state, entity.edit_session.is_some())
        };
        self.notify(Notification::PropertyChanged {
            entity: handle,
            member: member.to_string(),
        });
        if state == EntityState::Unmodified {
            self.change_state(handle, EntityState::Modified)?;
        }
        self.validate_member(handle, Some(member))?;

        if in_session {
            if let Some(session) = self.entity_mut(handle)?.edit_session.as_mut() {
                session.deferred_members.insert(member.to_string());
            }
            return Ok(());
        }
        self.process_member_change(handle, member)
    }

    /// Run the validator and route its result into the entity and ancestors
    pub(crate) fn validate_member(&mut self, handle: EntityHandle, member: Option<&str>) -> Result<()> {
        let validator = self.validator();
        let violations = validator.validate(self.entity(handle)?, member);
        self.entity_mut(handle)?.replace_own_errors(member, violations);
        self.mirror_errors(handle)
    }

    /// Run whole-entity validation and report whether the entity is valid
    ///
    /// Violations mirrored from composed children count against the entity.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` / `CrossContainer` for a bad handle.
    pub fn validate_entity(&mut self, handle: EntityHandle) -> Result<bool> {
        self.validate_member(handle, None)?;
        Ok(!self.entity(handle)?.has_validation_errors())
    }

    /// Copy an entity's own violations onto each composition ancestor
    ///
    /// Mirrored member names are prefixed with the association path from
    /// the ancestor down, e.g. `Lines.Quantity`.
    pub(crate) fn mirror_errors(&mut self, origin: EntityHandle) -> Result<()> {
        let own = self.entity(origin)?.own_errors();
        let mut path: Vec<String> = Vec::new();
        let mut current = origin;
        let mut visited = vec![origin];

        while let Some(parent) = self.resolve_parent(current)? {
            if visited.contains(&parent) {
                break;
            }
            visited.push(parent);
            let Some(link) = self.entity(current)?.parent.clone() else {
                break;
            };
            path.insert(0, link.association);
            let prefix = path.join(".");

            let entity = self.entity_mut(parent)?;
            entity.validation_errors.retain(|v| v.origin != Some(origin));
            entity
                .validation_errors
                .extend(own.iter().map(|v| v.mirrored(&prefix, origin)));
            current = parent;
        }
        Ok(())
    }

    /// Open a rollback point on an entity
    ///
    /// # Errors
    ///
    /// Returns `EditSessionActive` if one is already open.
    pub fn begin_edit(&mut self, handle: EntityHandle) -> Result<()> {
        let entity = self.entity_mut(handle)?;
        if entity.edit_session.is_some() {
            return Err(GraphSyncError::EditSessionActive { entity: handle });
        }
        entity.edit_session = Some(EditSession::begin(entity));
        Ok(())
    }

    /// Close the session, keeping changes, and validate the whole entity
    ///
    /// # Errors
    ///
    /// Returns `NoEditSession` if no session is open.
    pub fn end_edit(&mut self, handle: EntityHandle) -> Result<()> {
        let session = self
            .entity_mut(handle)?
            .edit_session
            .take()
            .ok_or(GraphSyncError::NoEditSession { entity: handle })?;
        self.validate_member(handle, None)?;
        for member in session.commit() {
            self.process_member_change(handle, &member)?;
        }
        Ok(())
    }

    /// Roll the entity back to where `begin_edit` found it
    ///
    /// Values, actions, validation errors and state are restored.
    ///
    /// # Errors
    ///
    /// Returns `NoEditSession` if no session is open.
    pub fn cancel_edit(&mut self, handle: EntityHandle) -> Result<()> {
        let rollback = {
            let entity = self.entity_mut(handle)?;
            let session = entity
                .edit_session
                .take()
                .ok_or(GraphSyncError::NoEditSession { entity: handle })?;
            session.rollback(entity)
        };
        tracing::debug!(
            entity = %handle,
            members = rollback.changed_members.len(),
            actions_undone = rollback.actions_undone.len(),
            actions_reinvoked = rollback.actions_reinvoked.len(),
            "edit session cancelled"
        );

        for member in &rollback.changed_members {
            self.notify(Notification::PropertyChanged {
                entity: handle,
                member: member.clone(),
            });
        }
        if let Some(state) = rollback.restored_state {
            self.change_state(handle, state)?;
        }
        self.mirror_errors(handle)?;
        for member in rollback.deferred_members {
            self.process_member_change(handle, &member)?;
        }
        Ok(())
    }

    /// Queue a named custom action for the next submit
    ///
    /// # Errors
    ///
    /// * `UnnamedAction` - the name is blank
    /// * `EntityNotInSet` - the entity is not attached
    /// * `EntityDeleted` / `EntityReadOnly` - the entity cannot change
    /// * `ActionAlreadyInvoked` - an action of that name is already queued
    pub fn invoke_action(&mut self, handle: EntityHandle, action: EntityAction) -> Result<()> {
        let entity = self.entity(handle)?;
        if !action.is_named() {
            return Err(GraphSyncError::UnnamedAction { entity: handle });
        }
        if entity.entity_set.is_none() {
            return Err(GraphSyncError::EntityNotInSet {
                entity: handle,
                type_name: entity.type_name().to_string(),
            });
        }
        if entity.state == EntityState::Deleted {
            return Err(GraphSyncError::EntityDeleted { entity: handle });
        }
        if entity.is_submitting {
            return Err(GraphSyncError::EntityReadOnly {
                entity: handle,
                reason: "a submit is in progress".to_string(),
            });
        }
        if entity.action_index(&action.name).is_some() {
            return Err(GraphSyncError::ActionAlreadyInvoked {
                entity: handle,
                action: action.name,
            });
        }

        let state = entity.state;
        self.entity_mut(handle)?.custom_actions.push(action);
        if state == EntityState::Unmodified {
            self.change_state(handle, EntityState::Modified)?;
        }
        Ok(())
    }

    /// Withdraw a queued action; returns `false` if none had that name
    ///
    /// # Errors
    ///
    /// Returns `EntityReadOnly` while a submit is in progress.
    pub fn cancel_action(&mut self, handle: EntityHandle, name: &str) -> Result<bool> {
        let entity = self.entity_mut(handle)?;
        if entity.is_submitting {
            return Err(GraphSyncError::EntityReadOnly {
                entity: handle,
                reason: "a submit is in progress".to_string(),
            });
        }
        let Some(index) = entity.action_index(name) else {
            return Ok(false);
        };
        entity.custom_actions.remove(index);
        let (state, own_changes) = (entity.state, entity.has_own_changes());

        if state == EntityState::Modified && !own_changes && !self.has_child_changes(handle)? {
            self.change_state(handle, EntityState::Unmodified)?;
        }
        Ok(true)
    }

    /// Snapshot of every value member
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` for an unknown handle.
    pub fn extract_state(&self, handle: EntityHandle) -> Result<Values> {
        Ok(self.entity(handle)?.values.clone())
    }

    /// Apply a state snapshot as if it came from the server
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember` / `NotADataMember` for names that are not
    /// value members of the entity's type.
    pub fn apply_state(
        &mut self,
        handle: EntityHandle,
        values: &Values,
        behavior: LoadBehavior,
    ) -> Result<()> {
        let ty = self.type_of(handle)?;
        check_value_members(&ty, values.keys())?;
        self.merge_values(handle, values, behavior, false)
    }

    /// Attach server validation errors to an entity
    pub(crate) fn apply_server_errors(
        &mut self,
        handle: EntityHandle,
        violations: Vec<ValidationViolation>,
    ) -> Result<()> {
        self.entity_mut(handle)?.replace_own_errors(None, violations);
        self.mirror_errors(handle)
    }

    /// Mark entities as in flight (or release them)
    ///
    /// In-flight entities reject member writes and action changes.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` / `CrossContainer` for a bad handle; no flag
    /// changes in that case.
    pub fn set_submitting(&mut self, handles: &[EntityHandle], submitting: bool) -> Result<()> {
        for &handle in handles {
            self.entity(handle)?;
        }
        for &handle in handles {
            self.entity_mut(handle)?.is_submitting = submitting;
        }
        Ok(())
    }
}
