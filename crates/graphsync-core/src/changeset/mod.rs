//! Changeset synthesis
//!
//! Turns the container's pending changes into the flat list of
//! [`ChangeSetEntry`] values a remote executor submits. Entries reference
//! each other by client-local integer ids that are stable for the life of
//! one [`BuiltChangeSet`].

mod builder;
mod check;
pub mod digest;

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::container::EntityContainer;
use crate::errors::Result;
use crate::model::{EntityAction, EntityHandle, Values};
use crate::{log_op_end, log_op_error, log_op_start};

/// Operation a changeset entry asks the server to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityOperation {
    /// Unmodified composed child, included so the server sees the full child set
    None,
    Insert,
    Update,
    Delete,
}

/// One entity's pending operation plus its association deltas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetEntry {
    pub id: u32,
    pub entity_type: String,
    pub operation: EntityOperation,
    pub values: Values,
    /// Key and roundtrip members as they were before the pending changes
    pub original_values: Option<Values>,
    /// Set for an update with edited members when no original is attached
    pub has_member_changes: bool,
    pub entity_actions: Vec<EntityAction>,
    /// Association member → ids linked after the submit
    pub associations: BTreeMap<String, Vec<u32>>,
    /// Composition member → ids linked before the pending changes
    pub original_associations: BTreeMap<String, Vec<u32>>,
}

/// Entries of one build, with the handle each id was assigned to
#[derive(Debug, Clone, Default)]
pub struct BuiltChangeSet {
    entries: Vec<ChangeSetEntry>,
    handles: Vec<EntityHandle>,
}

impl BuiltChangeSet {
    pub fn entries(&self) -> &[ChangeSetEntry] {
        &self.entries
    }

    pub fn handle_of(&self, id: u32) -> Option<EntityHandle> {
        self.handles.get(id as usize).copied()
    }

    pub fn lookup(&self, id: u32) -> Option<&ChangeSetEntry> {
        self.entries.get(id as usize)
    }

    pub fn entry_for(&self, handle: EntityHandle) -> Option<&ChangeSetEntry> {
        self.handles
            .iter()
            .position(|h| *h == handle)
            .and_then(|i| self.entries.get(i))
    }

    /// Handles of every entry, in id order
    pub fn handles(&self) -> &[EntityHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 of the entries with client ids normalised away
    ///
    /// Two builds over the same graph state yield the same digest even
    /// when ids were assigned in a different order.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if an entry cannot be encoded.
    pub fn structural_digest(&self) -> Result<String> {
        digest::compute_structural_digest(&self.entries)
    }
}

/// Pending changes bucketed by state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityChangeSet {
    pub added: Vec<EntityHandle>,
    pub modified: Vec<EntityHandle>,
    pub removed: Vec<EntityHandle>,
}

impl EntityChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    /// Added, then modified, then removed
    pub fn iter(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.removed.iter())
            .copied()
    }
}

/// Builds submit-ready changesets from a container
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeSetBuilder;

impl ChangeSetBuilder {
    /// Validate pending updates and synthesize the changeset
    ///
    /// Composition views are forced to load, which is why the container is
    /// borrowed mutably; no entity state changes.
    ///
    /// # Errors
    ///
    /// * `KeyMemberModified` - a Modified entity changed a key member
    /// * `IllegalReparent` - a composed child changed its parent's foreign key
    /// * `UnnamedAction` - a pending action has a blank name
    pub fn build(container: &mut EntityContainer) -> Result<BuiltChangeSet> {
        log_op_start!("build_changeset");
        let start = Instant::now();

        let built = builder::build(container).map_err(|e| {
            log_op_error!(
                "build_changeset",
                e,
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "build_changeset",
            duration_ms = start.elapsed().as_millis() as u64,
            entry_count = built.len()
        );
        Ok(built)
    }
}
