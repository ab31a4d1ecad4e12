//! Entity records
//!
//! Entities live in the container's arena and are addressed by
//! [`EntityHandle`]. This type exposes the read surface; every mutation goes
//! through `EntityContainer` so that sets, parents and observers stay
//! consistent.

mod edit_session;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub(crate) use edit_session::{EditSession, Rollback};

use crate::model::{EntityAction, EntityHandle, EntityState, Identity, Value, Values};
use crate::schema::EntityType;
use crate::validation::ValidationViolation;

/// Non-owning link from a composed child to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub parent: EntityHandle,
    /// Composition member on the parent's type
    pub association: String,
}

/// Server-reported concurrency conflict for one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConflict {
    /// Server state at the time of the conflict; absent when the row is gone
    pub server_values: Option<Values>,
    pub conflict_members: Vec<String>,
    pub is_delete: bool,
}

/// Cached resolution of a to-one association
#[derive(Debug, Clone, Default)]
pub(crate) struct RefState {
    pub(crate) value: Option<EntityHandle>,
    /// Set explicitly through `set_ref`; survives a failed key match
    pub(crate) assigned: bool,
}

/// Materialized membership of a to-many association
#[derive(Debug, Clone, Default)]
pub(crate) struct CollectionState {
    pub(crate) entities: Vec<EntityHandle>,
    pub(crate) loaded: bool,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) handle: EntityHandle,
    pub(crate) entity_type: Arc<EntityType>,
    pub(crate) values: Values,
    pub(crate) state: EntityState,
    pub(crate) original_values: Option<Values>,
    pub(crate) modified_members: BTreeSet<String>,
    pub(crate) parent: Option<ParentLink>,
    pub(crate) custom_actions: Vec<EntityAction>,
    pub(crate) validation_errors: Vec<ValidationViolation>,
    pub(crate) edit_session: Option<EditSession>,
    pub(crate) entity_set: Option<String>,
    pub(crate) last_set: Option<String>,
    pub(crate) refs: BTreeMap<String, RefState>,
    pub(crate) collections: BTreeMap<String, CollectionState>,
    pub(crate) conflict: Option<EntityConflict>,
    pub(crate) is_submitting: bool,
    pub(crate) suppress_child_updates: bool,
}

impl Entity {
    /// A detached entity with every value member set to `Null`
    pub(crate) fn new(handle: EntityHandle, entity_type: Arc<EntityType>) -> Self {
        let values = entity_type
            .value_members()
            .map(|m| (m.name.clone(), Value::Null))
            .collect();
        Self {
            handle,
            entity_type,
            values,
            state: EntityState::Detached,
            original_values: None,
            modified_members: BTreeSet::new(),
            parent: None,
            custom_actions: Vec::new(),
            validation_errors: Vec::new(),
            edit_session: None,
            entity_set: None,
            last_set: None,
            refs: BTreeMap::new(),
            collections: BTreeMap::new(),
            conflict: None,
            is_submitting: false,
            suppress_child_updates: false,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    /// True while the entity would contribute an operation to a changeset
    ///
    /// Child changes are folded in: a parent with a dirty composed child is
    /// itself Modified.
    pub fn has_changes(&self) -> bool {
        self.state.has_changes()
    }

    pub fn value(&self, member: &str) -> Option<&Value> {
        self.values.get(member)
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Key values, or `None` while any key member is null
    pub fn identity(&self) -> Option<Identity> {
        Identity::from_values(self.key_values(self.entity_type.key_members()))
    }

    pub fn original_values(&self) -> Option<&Values> {
        self.original_values.as_ref()
    }

    pub fn original_value(&self, member: &str) -> Option<&Value> {
        self.original_values.as_ref().and_then(|o| o.get(member))
    }

    pub fn modified_members(&self) -> &BTreeSet<String> {
        &self.modified_members
    }

    pub fn has_member_changes(&self) -> bool {
        !self.modified_members.is_empty()
    }

    pub fn validation_errors(&self) -> &[ValidationViolation] {
        &self.validation_errors
    }

    pub fn has_validation_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    /// Deleted entities and entities in flight are read-only
    pub fn is_read_only(&self) -> bool {
        self.is_submitting || self.state == EntityState::Deleted
    }

    pub fn is_submitting(&self) -> bool {
        self.is_submitting
    }

    pub fn entity_conflict(&self) -> Option<&EntityConflict> {
        self.conflict.as_ref()
    }

    pub fn custom_actions(&self) -> &[EntityAction] {
        &self.custom_actions
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// Type name of the owning set, if attached
    pub fn entity_set(&self) -> Option<&str> {
        self.entity_set.as_deref()
    }

    /// Set the entity was last attached to, retained after detach
    pub fn last_set(&self) -> Option<&str> {
        self.last_set.as_deref()
    }

    pub fn is_editing(&self) -> bool {
        self.edit_session.is_some()
    }

    pub(crate) fn key_values(&self, members: &[String]) -> Vec<Value> {
        members
            .iter()
            .map(|m| self.values.get(m).cloned().unwrap_or_default())
            .collect()
    }

    /// Own member edits or pending actions, ignoring children
    pub(crate) fn has_own_changes(&self) -> bool {
        !self.modified_members.is_empty() || !self.custom_actions.is_empty()
    }

    /// Record a member change, snapshotting originals on the first one
    ///
    /// New entities have nothing to roll back to and track no originals.
    pub(crate) fn record_change(&mut self, member: &str) {
        if let Some(session) = self.edit_session.as_mut() {
            session.record_mutation(&self.values);
        }
        if matches!(self.state, EntityState::Unmodified | EntityState::Modified) {
            if self.original_values.is_none() {
                self.original_values = Some(self.values.clone());
            }
            self.modified_members.insert(member.to_string());
        }
    }

    /// Drop the change-tracking snapshot
    pub(crate) fn clear_tracking(&mut self) {
        self.original_values = None;
        self.modified_members.clear();
    }

    pub(crate) fn action_index(&self, name: &str) -> Option<usize> {
        self.custom_actions.iter().position(|a| a.name == name)
    }

    /// Replace own violations matching `member` (all own violations for `None`)
    pub(crate) fn replace_own_errors(
        &mut self,
        member: Option<&str>,
        violations: Vec<ValidationViolation>,
    ) {
        self.validation_errors.retain(|v| {
            v.origin.is_some()
                || match member {
                    Some(m) => !v.applies_to(m),
                    None => false,
                }
        });
        self.validation_errors.extend(violations);
    }

    pub(crate) fn own_errors(&self) -> Vec<ValidationViolation> {
        self.validation_errors
            .iter()
            .filter(|v| v.origin.is_none())
            .cloned()
            .collect()
    }
}
