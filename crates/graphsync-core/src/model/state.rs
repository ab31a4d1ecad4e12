use serde::{Deserialize, Serialize};

use super::value::Value;

/// Lifecycle state of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityState {
    /// Not tracked by any set
    #[default]
    Detached,
    /// Added as a brand-new row, not yet persisted
    New,
    /// Tracked, matches the last known server state
    Unmodified,
    /// Tracked, with uncommitted member, action or child changes
    Modified,
    /// Marked for removal, still cached until accepted
    Deleted,
}

impl EntityState {
    /// True for every state in which a set owns the entity
    pub fn is_tracked(self) -> bool {
        !matches!(self, EntityState::Detached)
    }

    /// True for the states that produce a changeset operation
    pub fn has_changes(self) -> bool {
        matches!(
            self,
            EntityState::New | EntityState::Modified | EntityState::Deleted
        )
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityState::Detached => "Detached",
            EntityState::New => "New",
            EntityState::Unmodified => "Unmodified",
            EntityState::Modified => "Modified",
            EntityState::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// How incoming server state is reconciled with local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBehavior {
    /// Leave the local entity untouched
    #[default]
    KeepCurrent,
    /// Overwrite every mergeable member and drop the modification snapshot
    RefreshCurrent,
    /// Overwrite only members that were not changed locally
    MergeIntoCurrent,
}

/// Named custom action queued on an entity until the next submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAction {
    pub name: String,
    pub parameters: Vec<Value>,
}

impl EntityAction {
    pub fn new(name: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn is_named(&self) -> bool {
        !self.name.trim().is_empty()
    }
}
