use std::collections::BTreeSet;

use super::Entity;
use crate::model::{EntityAction, EntityState, Values};
use crate::validation::ValidationViolation;

/// Rollback point opened by `begin_edit`
///
/// Captures everything `cancel_edit` has to restore. The member snapshot is
/// taken lazily on the first mutation inside the session.
#[derive(Debug, Clone)]
pub(crate) struct EditSession {
    prior_state: EntityState,
    prior_actions: Vec<EntityAction>,
    prior_errors: Vec<ValidationViolation>,
    prior_original: Option<Values>,
    prior_modified: BTreeSet<String>,
    snapshot: Option<Values>,
    /// Members whose association side effects wait for the session to close
    pub(crate) deferred_members: BTreeSet<String>,
}

/// Result of rolling a session back
#[derive(Debug, Default)]
pub(crate) struct Rollback {
    pub(crate) restored_state: Option<EntityState>,
    pub(crate) changed_members: Vec<String>,
    pub(crate) actions_undone: Vec<EntityAction>,
    pub(crate) actions_reinvoked: Vec<EntityAction>,
    pub(crate) deferred_members: BTreeSet<String>,
}

impl EditSession {
    pub(crate) fn begin(entity: &Entity) -> Self {
        Self {
            prior_state: entity.state,
            prior_actions: entity.custom_actions.clone(),
            prior_errors: entity.validation_errors.clone(),
            prior_original: entity.original_values.clone(),
            prior_modified: entity.modified_members.clone(),
            snapshot: None,
            deferred_members: BTreeSet::new(),
        }
    }

    pub(crate) fn record_mutation(&mut self, current: &Values) {
        if self.snapshot.is_none() {
            self.snapshot = Some(current.clone());
        }
    }

    /// Close the session keeping every change; returns deferred members
    pub(crate) fn commit(self) -> BTreeSet<String> {
        self.deferred_members
    }

    /// Restore the entity to the session's starting point
    pub(crate) fn rollback(self, entity: &mut Entity) -> Rollback {
        let mut out = Rollback {
            deferred_members: self.deferred_members,
            ..Rollback::default()
        };

        if let Some(snapshot) = self.snapshot {
            for (member, value) in snapshot {
                if entity.values.get(&member) != Some(&value) {
                    out.changed_members.push(member.clone());
                    entity.values.insert(member, value);
                }
            }
        }

        out.actions_undone = entity
            .custom_actions
            .iter()
            .filter(|a| !self.prior_actions.contains(a))
            .cloned()
            .collect();
        out.actions_reinvoked = self
            .prior_actions
            .iter()
            .filter(|a| !entity.custom_actions.contains(a))
            .cloned()
            .collect();
        entity
            .custom_actions
            .retain(|a| !out.actions_undone.contains(a));
        entity
            .custom_actions
            .extend(out.actions_reinvoked.iter().cloned());

        entity.validation_errors = self.prior_errors;
        entity.original_values = self.prior_original;
        entity.modified_members = self.prior_modified;
        if entity.state != self.prior_state {
            out.restored_state = Some(self.prior_state);
        }
        out
    }
}
