//! Per-type entity set: membership list, identity cache and dirty index

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{EntityHandle, Identity};
use crate::schema::EntityType;

/// Operations callers may perform on a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySetOperations {
    pub add: bool,
    pub edit: bool,
    pub remove: bool,
}

impl Default for EntitySetOperations {
    fn default() -> Self {
        Self::all()
    }
}

impl EntitySetOperations {
    pub fn all() -> Self {
        Self {
            add: true,
            edit: true,
            remove: true,
        }
    }

    pub fn read_only() -> Self {
        Self {
            add: false,
            edit: false,
            remove: false,
        }
    }
}

/// Homogeneous collection of one entity type
///
/// `list` holds attached, non-deleted entities in attach order. The
/// identity cache additionally keeps Deleted entities until their deletion
/// is accepted; New entities join it only once accepted. `interesting` is
/// the dirty index the container consults instead of scanning `list`.
#[derive(Debug, Clone)]
pub struct EntitySet {
    entity_type: Arc<EntityType>,
    operations: EntitySetOperations,
    list: Vec<EntityHandle>,
    identity_cache: HashMap<Identity, EntityHandle>,
    interesting: HashSet<EntityHandle>,
    association_observers: HashMap<String, BTreeSet<EntityHandle>>,
}

impl EntitySet {
    pub(crate) fn new(entity_type: Arc<EntityType>, operations: EntitySetOperations) -> Self {
        Self {
            entity_type,
            operations,
            list: Vec::new(),
            identity_cache: HashMap::new(),
            interesting: HashSet::new(),
            association_observers: HashMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.entity_type.name()
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn operations(&self) -> EntitySetOperations {
        self.operations
    }

    pub(crate) fn set_operations(&mut self, operations: EntitySetOperations) {
        self.operations = operations;
    }

    /// Attached, non-deleted entities in attach order
    pub fn handles(&self) -> &[EntityHandle] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.list.contains(&handle)
    }

    /// Cached entity with this identity, Deleted ones included
    pub fn find(&self, identity: &Identity) -> Option<EntityHandle> {
        self.identity_cache.get(identity).copied()
    }

    pub fn has_changes(&self) -> bool {
        !self.interesting.is_empty()
    }

    /// Dirty entities, sorted by handle for deterministic iteration
    pub fn interesting_entities(&self) -> Vec<EntityHandle> {
        let mut out: Vec<EntityHandle> = self.interesting.iter().copied().collect();
        out.sort();
        out
    }

    pub fn is_interesting(&self, handle: EntityHandle) -> bool {
        self.interesting.contains(&handle)
    }

    pub(crate) fn push(&mut self, handle: EntityHandle) {
        if !self.list.contains(&handle) {
            self.list.push(handle);
        }
    }

    pub(crate) fn unlist(&mut self, handle: EntityHandle) -> bool {
        let before = self.list.len();
        self.list.retain(|h| *h != handle);
        before != self.list.len()
    }

    pub(crate) fn cache(&mut self, identity: Identity, handle: EntityHandle) {
        self.identity_cache.insert(identity, handle);
    }

    /// Remove every cache entry pointing at `handle`
    pub(crate) fn uncache(&mut self, handle: EntityHandle) {
        self.identity_cache.retain(|_, h| *h != handle);
    }

    pub(crate) fn cached_handles(&self) -> Vec<EntityHandle> {
        let mut out: Vec<EntityHandle> = self.identity_cache.values().copied().collect();
        out.sort();
        out
    }

    /// Update the dirty index
    ///
    /// Returns `Some(has_changes)` when the set crossed the empty/non-empty
    /// boundary, `None` otherwise.
    pub(crate) fn track(&mut self, handle: EntityHandle, interesting: bool) -> Option<bool> {
        let was_dirty = !self.interesting.is_empty();
        if interesting {
            self.interesting.insert(handle);
        } else {
            self.interesting.remove(&handle);
        }
        let is_dirty = !self.interesting.is_empty();
        (was_dirty != is_dirty).then_some(is_dirty)
    }

    pub(crate) fn observe(&mut self, association: &str, owner: EntityHandle) {
        self.association_observers
            .entry(association.to_string())
            .or_default()
            .insert(owner);
    }

    /// Drop one observer; the registration goes away with its last observer
    pub(crate) fn unobserve(&mut self, association: &str, owner: EntityHandle) {
        if let Some(owners) = self.association_observers.get_mut(association) {
            owners.remove(&owner);
            if owners.is_empty() {
                self.association_observers.remove(association);
            }
        }
    }

    pub(crate) fn observers(&self) -> Vec<(String, Vec<EntityHandle>)> {
        let mut out: Vec<(String, Vec<EntityHandle>)> = self
            .association_observers
            .iter()
            .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
            .collect();
        out.sort();
        out
    }

    pub fn observed_associations(&self) -> Vec<String> {
        let mut out: Vec<String> = self.association_observers.keys().cloned().collect();
        out.sort();
        out
    }
}
