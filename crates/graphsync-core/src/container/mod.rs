//! Entity container
//!
//! Owns every entity (as an arena addressed by [`EntityHandle`]) and one
//! [`EntitySet`] per schema type. All graph mutations are container methods:
//! the container is the only place that can keep set membership, parent
//! links, association views and dirty tracking in step.

mod associations;
mod attach;
mod lifecycle;
mod merge;
mod mutation;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub use merge::SubmitOutcome;

use crate::changeset::EntityChangeSet;
use crate::entity::{Entity, ParentLink};
use crate::entity_set::{EntitySet, EntitySetOperations};
use crate::errors::{GraphSyncError, Result};
use crate::model::{ContainerId, EntityHandle, EntityState, Identity, Notification, Value, Values};
use crate::schema::{EntitySchema, EntityType, MemberKind, SchemaRegistry};
use crate::validation::{NoopValidator, Validator};

pub struct EntityContainer {
    id: ContainerId,
    schema: Arc<SchemaRegistry>,
    validator: Arc<dyn Validator>,
    entities: HashMap<EntityHandle, Entity>,
    next_index: u64,
    sets: BTreeMap<String, EntitySet>,
    dirty_set_count: usize,
    notifications: Vec<Notification>,
}

impl std::fmt::Debug for EntityContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityContainer")
            .field("id", &self.id)
            .field("entities", &self.entities.len())
            .field("sets", &self.sets.keys().collect::<Vec<_>>())
            .field("dirty_set_count", &self.dirty_set_count)
            .finish()
    }
}

impl EntityContainer {
    /// Create a container with one set per schema type, all operations allowed
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        let sets = schema
            .type_names()
            .filter_map(|name| schema.get(name))
            .map(|ty| {
                (
                    ty.name().to_string(),
                    EntitySet::new(Arc::clone(ty), EntitySetOperations::default()),
                )
            })
            .collect();
        Self {
            id: ContainerId::next(),
            schema,
            validator: Arc::new(NoopValidator),
            entities: HashMap::new(),
            next_index: 1,
            sets,
            dirty_set_count: 0,
            notifications: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Restrict what callers may do with one set
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn with_set_operations(
        mut self,
        type_name: &str,
        operations: EntitySetOperations,
    ) -> Result<Self> {
        self.set_mut(type_name)?.set_operations(operations);
        Ok(self)
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// Create a detached entity with every value member `Null`
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn create(&mut self, type_name: &str) -> Result<EntityHandle> {
        let ty = Arc::clone(self.schema.entity_type(type_name)?);
        let handle = EntityHandle::new(self.id, self.next_index);
        self.next_index += 1;
        self.entities.insert(handle, Entity::new(handle, ty));
        Ok(handle)
    }

    /// Create a detached entity and populate its value members
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType`, `UnknownMember`, or `NotADataMember`
    /// for an association name in `values`.
    pub fn create_with(&mut self, type_name: &str, values: Values) -> Result<EntityHandle> {
        let ty = Arc::clone(self.schema.entity_type(type_name)?);
        check_value_members(&ty, values.keys())?;
        let handle = self.create(type_name)?;
        self.entity_mut(handle)?.values.extend(values);
        Ok(handle)
    }

    /// # Errors
    ///
    /// Returns `CrossContainer` for a handle minted by another container and
    /// `EntityNotFound` for an unknown handle.
    pub fn entity(&self, handle: EntityHandle) -> Result<&Entity> {
        self.check_handle(handle)?;
        self.entities
            .get(&handle)
            .ok_or(GraphSyncError::EntityNotFound { entity: handle })
    }

    pub(crate) fn entity_mut(&mut self, handle: EntityHandle) -> Result<&mut Entity> {
        self.check_handle(handle)?;
        self.entities
            .get_mut(&handle)
            .ok_or(GraphSyncError::EntityNotFound { entity: handle })
    }

    fn check_handle(&self, handle: EntityHandle) -> Result<()> {
        if handle.container() != self.id {
            return Err(GraphSyncError::CrossContainer { entity: handle });
        }
        Ok(())
    }

    /// Current value of a value member
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember` or `NotADataMember` for associations.
    pub fn value(&self, handle: EntityHandle, member: &str) -> Result<&Value> {
        let entity = self.entity(handle)?;
        check_value_members(&entity.entity_type, std::iter::once(&member.to_string()))?;
        entity.values.get(member).ok_or_else(|| GraphSyncError::Internal {
            message: format!("value member {} missing on {}", member, handle),
        })
    }

    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn entity_set(&self, type_name: &str) -> Result<&EntitySet> {
        self.sets
            .get(type_name)
            .ok_or_else(|| GraphSyncError::UnknownEntityType {
                type_name: type_name.to_string(),
            })
    }

    pub(crate) fn set_mut(&mut self, type_name: &str) -> Result<&mut EntitySet> {
        self.sets
            .get_mut(type_name)
            .ok_or_else(|| GraphSyncError::UnknownEntityType {
                type_name: type_name.to_string(),
            })
    }

    pub fn entity_sets(&self) -> impl Iterator<Item = &EntitySet> {
        self.sets.values()
    }

    /// Attached, non-deleted entities of one type in attach order
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn entities(&self, type_name: &str) -> Result<Vec<EntityHandle>> {
        Ok(self.entity_set(type_name)?.handles().to_vec())
    }

    /// Look up a cached entity by identity
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn find(&self, type_name: &str, identity: &Identity) -> Result<Option<EntityHandle>> {
        Ok(self.entity_set(type_name)?.find(identity))
    }

    /// True iff any set has a dirty entity
    pub fn has_changes(&self) -> bool {
        self.dirty_set_count > 0
    }

    /// Bucket every dirty entity by state
    ///
    /// Only each set's dirty index is consulted, never the full set.
    pub fn get_changes(&self) -> EntityChangeSet {
        let mut changes = EntityChangeSet::default();
        for set in self.sets.values() {
            for handle in set.interesting_entities() {
                let Some(entity) = self.entities.get(&handle) else {
                    continue;
                };
                match entity.state {
                    EntityState::New => changes.added.push(handle),
                    EntityState::Modified => changes.modified.push(handle),
                    EntityState::Deleted => changes.removed.push(handle),
                    EntityState::Unmodified | EntityState::Detached => {}
                }
            }
        }
        changes
    }

    /// Take every queued notification, oldest first
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn pending_notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub(crate) fn validator(&self) -> Arc<dyn Validator> {
        Arc::clone(&self.validator)
    }

    pub(crate) fn type_of(&self, handle: EntityHandle) -> Result<Arc<EntityType>> {
        Ok(Arc::clone(&self.entity(handle)?.entity_type))
    }

    /// Set the state and update the dirty index, without touching ancestors
    fn set_state_raw(&mut self, handle: EntityHandle, to: EntityState) -> Result<bool> {
        let entity = self.entity_mut(handle)?;
        let from = entity.state;
        if from == to {
            return Ok(false);
        }
        entity.state = to;
        self.notify(Notification::StateChanged {
            entity: handle,
            from,
            to,
        });
        self.track_interesting(handle)?;
        Ok(true)
    }

    /// Move an entity to `to` and let its composition ancestors react
    pub(crate) fn change_state(&mut self, handle: EntityHandle, to: EntityState) -> Result<()> {
        if self.set_state_raw(handle, to)? {
            self.on_child_update(handle)?;
        }
        Ok(())
    }

    /// Re-derive the dirty index entry of one entity
    pub(crate) fn track_interesting(&mut self, handle: EntityHandle) -> Result<()> {
        let (set_name, interesting) = {
            let entity = self.entity(handle)?;
            let Some(set_name) = entity.entity_set.clone().or_else(|| entity.last_set.clone())
            else {
                return Ok(());
            };
            (
                set_name,
                entity.entity_set.is_some() && entity.state.has_changes(),
            )
        };
        let Some(has_changes) = self.set_mut(&set_name)?.track(handle, interesting) else {
            return Ok(());
        };

        self.notify(Notification::HasChangesChanged {
            set: Some(set_name),
            has_changes,
        });
        let was_dirty = self.dirty_set_count > 0;
        if has_changes {
            self.dirty_set_count += 1;
        } else {
            self.dirty_set_count = self.dirty_set_count.saturating_sub(1);
        }
        let is_dirty = self.dirty_set_count > 0;
        if was_dirty != is_dirty {
            self.notify(Notification::HasChangesChanged {
                set: None,
                has_changes: is_dirty,
            });
        }
        Ok(())
    }

    /// Propagate a child's dirtiness up the composition chain
    ///
    /// An Unmodified parent becomes Modified when a child is dirty. A
    /// Modified parent with no own edits or actions reverts once no child is
    /// dirty. Parents in the middle of accept/reject are skipped.
    pub(crate) fn on_child_update(&mut self, child: EntityHandle) -> Result<()> {
        let mut visited = HashSet::new();
        visited.insert(child);
        let mut current = child;

        while let Some(parent) = self.resolve_parent(current)? {
            if !visited.insert(parent) {
                break;
            }
            let (state, own_changes, suppressed) = {
                let p = self.entity(parent)?;
                (p.state, p.has_own_changes(), p.suppress_child_updates)
            };
            if suppressed {
                break;
            }
            let next = match state {
                EntityState::Unmodified if self.has_child_changes(parent)? => {
                    EntityState::Modified
                }
                EntityState::Modified if !own_changes && !self.has_child_changes(parent)? => {
                    EntityState::Unmodified
                }
                _ => break,
            };
            self.set_state_raw(parent, next)?;
            current = parent;
        }
        Ok(())
    }

    /// Parent of a composed entity, resolving and caching the link by key
    pub(crate) fn resolve_parent(&mut self, child: EntityHandle) -> Result<Option<EntityHandle>> {
        let (link, ty, tracked) = {
            let e = self.entity(child)?;
            (
                e.parent.clone(),
                Arc::clone(&e.entity_type),
                e.state.is_tracked(),
            )
        };
        if let Some(link) = link {
            if self.entities.contains_key(&link.parent) {
                return Ok(Some(link.parent));
            }
        }
        if !tracked {
            return Ok(None);
        }

        for edge in self.schema.composition_parents(ty.name()).to_vec() {
            let parent_ty = Arc::clone(self.schema.entity_type(&edge.parent_type)?);
            let Some(assoc) = parent_ty.association(&edge.association) else {
                continue;
            };
            let child_values = self.entity(child)?.key_values(&assoc.other_key);
            if child_values.iter().any(Value::is_null) {
                continue;
            }
            if let Some(parent) =
                self.find_matching(&edge.parent_type, &assoc.this_key, &child_values)?
            {
                self.entity_mut(child)?.parent = Some(ParentLink {
                    parent,
                    association: edge.association.clone(),
                });
                return Ok(Some(parent));
            }
        }
        Ok(None)
    }

    /// First tracked entity of `type_name` whose `members` equal `values`
    ///
    /// Uses the identity cache when `members` is exactly the key.
    pub(crate) fn find_matching(
        &self,
        type_name: &str,
        members: &[String],
        values: &[Value],
    ) -> Result<Option<EntityHandle>> {
        let set = self.entity_set(type_name)?;
        if set.entity_type().key_members() == members {
            return Ok(Identity::from_values(values.to_vec()).and_then(|id| set.find(&id)));
        }
        let found = set
            .handles()
            .iter()
            .chain(set.cached_handles().iter())
            .copied()
            .find(|h| {
                self.entities
                    .get(h)
                    .is_some_and(|e| e.key_values(members) == values)
            });
        Ok(found)
    }

    /// Dirty composed children whose parent is `parent`
    pub(crate) fn dirty_children(&mut self, parent: EntityHandle) -> Result<Vec<EntityHandle>> {
        let type_name = self.type_of(parent)?.name().to_string();
        let mut out = Vec::new();
        for child_type in self.schema.child_types(&type_name) {
            for candidate in self.entity_set(&child_type)?.interesting_entities() {
                if self.entity(candidate)?.state == EntityState::Unmodified {
                    continue;
                }
                if self.resolve_parent(candidate)? == Some(parent) {
                    out.push(candidate);
                }
            }
        }
        Ok(out)
    }

    pub(crate) fn has_child_changes(&mut self, parent: EntityHandle) -> Result<bool> {
        Ok(!self.dirty_children(parent)?.is_empty())
    }
}

/// Reject names that are not value members of `ty`
pub(crate) fn check_value_members<'a>(
    ty: &EntityType,
    members: impl Iterator<Item = &'a String>,
) -> Result<()> {
    for member in members {
        match ty.member(member).map(|m| &m.kind) {
            None => {
                return Err(GraphSyncError::UnknownMember {
                    type_name: ty.name().to_string(),
                    member: member.clone(),
                })
            }
            Some(MemberKind::Association(_)) => {
                return Err(GraphSyncError::NotADataMember {
                    type_name: ty.name().to_string(),
                    member: member.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
