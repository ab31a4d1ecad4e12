//! Association views: to-one references and to-many collections
//!
//! Membership is the key predicate declared on the association, evaluated
//! lazily the first time a view is read and kept current afterwards
//! through observer registrations on the target set. New entities only
//! appear in a view once explicitly linked or once they are accepted.

use std::sync::Arc;

use super::EntityContainer;
use crate::entity::{Entity, ParentLink, RefState};
use crate::errors::{GraphSyncError, Result};
use crate::model::{CollectionChangeAction, EntityHandle, EntityState, Notification, Value};
use crate::schema::{AssociationDescriptor, EntitySchema, EntityType};

fn observer_key(owner_type: &str, association: &str) -> String {
    format!("{}.{}", owner_type, association)
}

/// True when `target` satisfies `target.other_key == owner.this_key`
fn linked_by_key(owner: &Entity, assoc: &AssociationDescriptor, target: &Entity) -> bool {
    let owner_values = owner.key_values(&assoc.this_key);
    !owner_values.iter().any(Value::is_null) && owner_values == target.key_values(&assoc.other_key)
}

impl EntityContainer {
    fn association_of(
        &self,
        owner: EntityHandle,
        member: &str,
    ) -> Result<(Arc<EntityType>, AssociationDescriptor)> {
        let ty = self.type_of(owner)?;
        let assoc = match ty.member(member) {
            None => {
                return Err(GraphSyncError::UnknownMember {
                    type_name: ty.name().to_string(),
                    member: member.to_string(),
                })
            }
            Some(m) => m.association().cloned().ok_or_else(|| {
                GraphSyncError::NotAnAssociation {
                    type_name: ty.name().to_string(),
                    member: member.to_string(),
                }
            })?,
        };
        Ok((ty, assoc))
    }

    fn expect_cardinality(
        ty: &EntityType,
        assoc: &AssociationDescriptor,
        to_many: bool,
    ) -> Result<()> {
        if assoc.to_many == to_many {
            return Ok(());
        }
        let operation = if to_many {
            format!("collection access on to-one member {}", assoc.name)
        } else {
            format!("reference access on to-many member {}", assoc.name)
        };
        Err(GraphSyncError::OperationNotSupported {
            type_name: ty.name().to_string(),
            operation,
        })
    }

    fn check_target_type(&self, target: EntityHandle, assoc: &AssociationDescriptor) -> Result<()> {
        let entity = self.entity(target)?;
        if entity.type_name() != assoc.target_type {
            return Err(GraphSyncError::TypeMismatch {
                entity: target,
                expected: assoc.target_type.clone(),
                actual: entity.type_name().to_string(),
            });
        }
        if entity.state == EntityState::Deleted {
            return Err(GraphSyncError::EntityDeleted { entity: target });
        }
        Ok(())
    }

    fn check_not_deleted(&self, handle: EntityHandle) -> Result<()> {
        if self.entity(handle)?.state == EntityState::Deleted {
            return Err(GraphSyncError::EntityDeleted { entity: handle });
        }
        Ok(())
    }

    /// Members of a to-many association, loading the view on first access
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember`, `NotAnAssociation`, or
    /// `OperationNotSupported` for a to-one member.
    pub fn collection(&mut self, owner: EntityHandle, member: &str) -> Result<Vec<EntityHandle>> {
        let (ty, assoc) = self.association_of(owner, member)?;
        Self::expect_cardinality(&ty, &assoc, true)?;
        self.ensure_collection(owner, &assoc)?;
        Ok(self.collection_entities(owner, &assoc.name))
    }

    fn collection_entities(&self, owner: EntityHandle, member: &str) -> Vec<EntityHandle> {
        self.entities
            .get(&owner)
            .and_then(|e| e.collections.get(member))
            .map(|c| c.entities.clone())
            .unwrap_or_default()
    }

    /// Evaluate the key predicate over the target set once
    pub(crate) fn ensure_collection(
        &mut self,
        owner: EntityHandle,
        assoc: &AssociationDescriptor,
    ) -> Result<()> {
        let owner_entity = self.entity(owner)?;
        if owner_entity
            .collections
            .get(&assoc.name)
            .is_some_and(|c| c.loaded)
        {
            return Ok(());
        }
        let owner_type = owner_entity.type_name().to_string();
        let tracked = owner_entity.state.is_tracked();

        let matches: Vec<EntityHandle> = self
            .entity_set(&assoc.target_type)?
            .handles()
            .iter()
            .copied()
            .filter(|h| {
                self.entities.get(h).is_some_and(|t| {
                    t.state != EntityState::New && linked_by_key(owner_entity, assoc, t)
                })
            })
            .collect();

        let state = self
            .entity_mut(owner)?
            .collections
            .entry(assoc.name.clone())
            .or_default();
        for h in &matches {
            if !state.entities.contains(h) {
                state.entities.push(*h);
            }
        }
        state.loaded = true;

        if assoc.composition {
            for h in &matches {
                let child = self.entity_mut(*h)?;
                if child.parent.is_none() {
                    child.parent = Some(ParentLink {
                        parent: owner,
                        association: assoc.name.clone(),
                    });
                }
            }
        }
        if tracked {
            self.set_mut(&assoc.target_type)?
                .observe(&observer_key(&owner_type, &assoc.name), owner);
        }
        tracing::trace!(owner = %owner, association = %assoc.name, count = matches.len(), "collection loaded");
        Ok(())
    }

    /// Link `child` into a to-many association
    ///
    /// Writes the foreign key on the child when the owner's key is known,
    /// sets the parent link for compositions, and adds a detached child to
    /// its set when the owner is tracked.
    ///
    /// # Errors
    ///
    /// * `TypeMismatch` - the child is not of the target type
    /// * `EntityDeleted` - owner or child is Deleted
    /// * `IllegalReparent` - a composed child already belongs to another parent
    /// * any error of `add` or `set_value` for the child
    pub fn collection_add(
        &mut self,
        owner: EntityHandle,
        member: &str,
        child: EntityHandle,
    ) -> Result<()> {
        let (ty, assoc) = self.association_of(owner, member)?;
        Self::expect_cardinality(&ty, &assoc, true)?;
        self.check_not_deleted(owner)?;
        self.check_target_type(child, &assoc)?;
        self.ensure_collection(owner, &assoc)?;

        if self.collection_entities(owner, &assoc.name).contains(&child) {
            return Ok(());
        }

        let (owner_tracked, owner_key) = {
            let o = self.entity(owner)?;
            (o.state.is_tracked(), o.key_values(&assoc.this_key))
        };
        let child_detached = self.entity(child)?.state == EntityState::Detached;

        if assoc.composition && !child_detached {
            if let Some(parent) = self.resolve_parent(child)? {
                if parent != owner {
                    return Err(GraphSyncError::IllegalReparent {
                        entity: child,
                        member: member.to_string(),
                    });
                }
            }
        }

        let writes = if assoc.is_foreign_key || owner_key.iter().any(Value::is_null) {
            Vec::new()
        } else {
            self.pending_writes(child, &assoc.other_key, &owner_key)?
        };

        if owner_tracked && child_detached {
            self.add_impl(child)?;
        }
        for (m, v) in writes {
            self.write_tracked(child, &m, v)?;
        }

        self.push_collection_member(owner, &assoc.name, child)?;
        if assoc.composition {
            self.entity_mut(child)?.parent = Some(ParentLink {
                parent: owner,
                association: assoc.name.clone(),
            });
        }
        if let Some(reverse) = &assoc.reverse {
            self.entity_mut(child)?.refs.insert(
                reverse.clone(),
                RefState {
                    value: Some(owner),
                    assigned: true,
                },
            );
        }
        if assoc.composition {
            self.on_child_update(child)?;
            self.mirror_errors(child)?;
        }
        Ok(())
    }

    /// Unlink `child` from a to-many association
    ///
    /// Removing from a composition deletes the child (and its own composed
    /// children). Removing from a plain association clears the child's
    /// foreign key. Returns `false` when the child was not a member.
    ///
    /// # Errors
    ///
    /// Returns the errors of `remove` for compositions and of `set_value`
    /// when clearing the foreign key.
    pub fn collection_remove(
        &mut self,
        owner: EntityHandle,
        member: &str,
        child: EntityHandle,
    ) -> Result<bool> {
        let (ty, assoc) = self.association_of(owner, member)?;
        Self::expect_cardinality(&ty, &assoc, true)?;
        self.ensure_collection(owner, &assoc)?;

        if !self.collection_entities(owner, &assoc.name).contains(&child) {
            return Ok(false);
        }

        let child_state = self.entity(child)?.state;
        let cascade = assoc.composition
            && child_state.is_tracked()
            && child_state != EntityState::Deleted;

        let writes = if !assoc.composition && !assoc.is_foreign_key {
            let key_of_child = self.type_of(child)?;
            let members: Vec<String> = assoc
                .other_key
                .iter()
                .filter(|m| !key_of_child.is_key(m))
                .cloned()
                .collect();
            let nulls = vec![Value::Null; members.len()];
            self.pending_writes(child, &members, &nulls)?
        } else {
            Vec::new()
        };
        // The whole cascade is checked before the child leaves the view.
        let plan = if cascade {
            self.plan_remove(child)?
        } else {
            Vec::new()
        };

        self.pop_collection_member(owner, &assoc.name, child)?;
        if let Some(reverse) = &assoc.reverse {
            self.entity_mut(child)?.refs.remove(reverse);
        }

        if cascade {
            self.apply_remove_plan(child, &plan)?;
        } else if assoc.composition {
            self.entity_mut(child)?.parent = None;
        }
        for (m, v) in writes {
            self.write_tracked(child, &m, v)?;
        }
        Ok(true)
    }

    fn push_collection_member(
        &mut self,
        owner: EntityHandle,
        member: &str,
        entity: EntityHandle,
    ) -> Result<()> {
        let state = self
            .entity_mut(owner)?
            .collections
            .entry(member.to_string())
            .or_default();
        if state.entities.contains(&entity) {
            return Ok(());
        }
        state.entities.push(entity);
        self.notify(Notification::CollectionChanged {
            owner,
            member: member.to_string(),
            action: CollectionChangeAction::Added,
            entity,
        });
        Ok(())
    }

    fn pop_collection_member(
        &mut self,
        owner: EntityHandle,
        member: &str,
        entity: EntityHandle,
    ) -> Result<bool> {
        let Some(state) = self.entity_mut(owner)?.collections.get_mut(member) else {
            return Ok(false);
        };
        let before = state.entities.len();
        state.entities.retain(|h| *h != entity);
        if before == state.entities.len() {
            return Ok(false);
        }
        self.notify(Notification::CollectionChanged {
            owner,
            member: member.to_string(),
            action: CollectionChangeAction::Removed,
            entity,
        });
        Ok(true)
    }

    /// Writes needed to make `members` of `target` equal `values`, checked
    /// for writability before anything changes
    fn pending_writes(
        &self,
        target: EntityHandle,
        members: &[String],
        values: &[Value],
    ) -> Result<Vec<(String, Value)>> {
        let entity = self.entity(target)?;
        let mut writes = Vec::new();
        for (m, v) in members.iter().zip(values) {
            if entity.values.get(m) != Some(v) {
                self.check_writable(target, m)?;
                writes.push((m.clone(), v.clone()));
            }
        }
        Ok(writes)
    }

    /// Target of a to-one association, resolving it by key on first access
    ///
    /// # Errors
    ///
    /// Returns `UnknownMember`, `NotAnAssociation`, or
    /// `OperationNotSupported` for a to-many member.
    pub fn get_ref(&mut self, owner: EntityHandle, member: &str) -> Result<Option<EntityHandle>> {
        let (ty, assoc) = self.association_of(owner, member)?;
        Self::expect_cardinality(&ty, &assoc, false)?;
        self.resolve_ref(owner, &assoc)
    }

    pub(crate) fn resolve_ref(
        &mut self,
        owner: EntityHandle,
        assoc: &AssociationDescriptor,
    ) -> Result<Option<EntityHandle>> {
        let owner_entity = self.entity(owner)?;
        if let Some(state) = owner_entity.refs.get(&assoc.name) {
            let live = state.value.filter(|t| {
                self.entities
                    .get(t)
                    .is_some_and(|e| e.state != EntityState::Deleted)
            });
            if live.is_some() || state.value.is_none() {
                return Ok(live);
            }
        }

        let owner_type = owner_entity.type_name().to_string();
        let tracked = owner_entity.state.is_tracked();
        let key = owner_entity.key_values(&assoc.this_key);
        let found = if key.iter().any(Value::is_null) {
            None
        } else {
            self.find_matching(&assoc.target_type, &assoc.other_key, &key)?
                .filter(|t| {
                    self.entities.get(t).is_some_and(|e| {
                        !matches!(e.state, EntityState::Deleted | EntityState::New)
                    })
                })
        };

        self.entity_mut(owner)?.refs.insert(
            assoc.name.clone(),
            RefState {
                value: found,
                assigned: false,
            },
        );
        if let (true, Some(child)) = (assoc.composition, found) {
            let child = self.entity_mut(child)?;
            if child.parent.is_none() {
                child.parent = Some(ParentLink {
                    parent: owner,
                    association: assoc.name.clone(),
                });
            }
        }
        if tracked {
            self.set_mut(&assoc.target_type)?
                .observe(&observer_key(&owner_type, &assoc.name), owner);
        }
        Ok(found)
    }

    /// Point a to-one association at `target` (or clear it)
    ///
    /// Keys are synchronized on whichever side holds the foreign key. For a
    /// composition the previous target is removed, and a detached target is
    /// added when the owner is tracked.
    ///
    /// # Errors
    ///
    /// * `TypeMismatch` - the target is not of the association's type
    /// * `EntityDeleted` - owner or target is Deleted
    /// * any error of `add`, `remove` or `set_value` implied by the change
    pub fn set_ref(
        &mut self,
        owner: EntityHandle,
        member: &str,
        target: Option<EntityHandle>,
    ) -> Result<()> {
        let (ty, assoc) = self.association_of(owner, member)?;
        Self::expect_cardinality(&ty, &assoc, false)?;
        self.check_not_deleted(owner)?;
        if let Some(t) = target {
            self.check_target_type(t, &assoc)?;
        }

        let previous = self.resolve_ref(owner, &assoc)?;
        if previous == target {
            if let Some(state) = self.entity_mut(owner)?.refs.get_mut(&assoc.name) {
                state.assigned = true;
            }
            return Ok(());
        }

        // Plan every key write and check it before changing anything.
        let mut writes: Vec<(EntityHandle, String, Value)> = Vec::new();
        if assoc.is_foreign_key {
            let values = match target {
                Some(t) => self.entity(t)?.key_values(&assoc.other_key),
                None => vec![Value::Null; assoc.this_key.len()],
            };
            for (m, v) in self.pending_writes(owner, &assoc.this_key, &values)? {
                writes.push((owner, m, v));
            }
        } else {
            let owner_key = self.entity(owner)?.key_values(&assoc.this_key);
            if let Some(t) = target {
                if !owner_key.iter().any(Value::is_null) {
                    for (m, v) in self.pending_writes(t, &assoc.other_key, &owner_key)? {
                        writes.push((t, m, v));
                    }
                }
            }
            if let (Some(p), false) = (previous, assoc.composition) {
                let nulls = vec![Value::Null; assoc.other_key.len()];
                for (m, v) in self.pending_writes(p, &assoc.other_key, &nulls)? {
                    writes.push((p, m, v));
                }
            }
        }

        let owner_tracked = self.entity(owner)?.state.is_tracked();
        let cascade_previous = match previous {
            Some(p) if assoc.composition => {
                let state = self.entity(p)?.state;
                state.is_tracked() && state != EntityState::Deleted
            }
            _ => false,
        };
        let previous_plan = match previous {
            Some(p) if cascade_previous => self.plan_remove(p)?,
            _ => Vec::new(),
        };

        if let Some(t) = target {
            if owner_tracked && self.entity(t)?.state == EntityState::Detached {
                self.add_impl(t)?;
            }
        }
        if let (true, Some(p)) = (cascade_previous, previous) {
            self.apply_remove_plan(p, &previous_plan)?;
        }
        for (h, m, v) in writes {
            self.write_tracked(h, &m, v)?;
        }

        self.entity_mut(owner)?.refs.insert(
            assoc.name.clone(),
            RefState {
                value: target,
                assigned: true,
            },
        );

        if let Some(reverse) = &assoc.reverse {
            if let Some(p) = previous {
                self.unlink_reverse(p, reverse, owner)?;
            }
            if let Some(t) = target {
                self.link_reverse(t, reverse, owner)?;
            }
        }
        if let (true, Some(t)) = (assoc.composition, target) {
            self.entity_mut(t)?.parent = Some(ParentLink {
                parent: owner,
                association: assoc.name.clone(),
            });
            self.on_child_update(t)?;
            self.mirror_errors(t)?;
        }

        self.notify(Notification::PropertyChanged {
            entity: owner,
            member: assoc.name.clone(),
        });
        Ok(())
    }

    fn link_reverse(&mut self, target: EntityHandle, reverse: &str, owner: EntityHandle) -> Result<()> {
        let ty = self.type_of(target)?;
        let Some(assoc) = ty.association(reverse) else {
            return Ok(());
        };
        if assoc.to_many {
            let materialized = self.entity(target)?.collections.contains_key(reverse);
            if materialized {
                self.push_collection_member(target, reverse, owner)?;
            }
        } else {
            self.entity_mut(target)?.refs.insert(
                reverse.to_string(),
                RefState {
                    value: Some(owner),
                    assigned: true,
                },
            );
        }
        Ok(())
    }

    fn unlink_reverse(&mut self, target: EntityHandle, reverse: &str, owner: EntityHandle) -> Result<()> {
        let ty = self.type_of(target)?;
        let Some(assoc) = ty.association(reverse) else {
            return Ok(());
        };
        if assoc.to_many {
            self.pop_collection_member(target, reverse, owner)?;
        } else {
            let entity = self.entity_mut(target)?;
            if entity.refs.get(reverse).and_then(|r| r.value) == Some(owner) {
                entity.refs.remove(reverse);
            }
        }
        Ok(())
    }

    /// Linked entities of one association; `force` loads unresolved views
    pub(crate) fn associated(
        &mut self,
        owner: EntityHandle,
        assoc: &AssociationDescriptor,
        force: bool,
    ) -> Result<Vec<EntityHandle>> {
        if assoc.to_many {
            if force {
                self.ensure_collection(owner, assoc)?;
            }
            return Ok(self.collection_entities(owner, &assoc.name));
        }
        if force {
            return Ok(self.resolve_ref(owner, assoc)?.into_iter().collect());
        }
        Ok(self
            .entity(owner)?
            .refs
            .get(&assoc.name)
            .and_then(|r| r.value)
            .into_iter()
            .collect())
    }

    /// Live composed children, forcing composition views to load
    pub(crate) fn composed_children(&mut self, owner: EntityHandle) -> Result<Vec<EntityHandle>> {
        let ty = self.type_of(owner)?;
        let mut out = Vec::new();
        for assoc in ty.compositions() {
            for child in self.associated(owner, assoc, true)? {
                let live = self
                    .entities
                    .get(&child)
                    .is_some_and(|e| e.state.is_tracked() && e.state != EntityState::Deleted);
                if live && !out.contains(&child) {
                    out.push(child);
                }
            }
        }
        Ok(out)
    }

    /// React to a value change on `handle`
    ///
    /// The entity's own foreign-key references go stale, and views
    /// observing its set re-evaluate it.
    pub(crate) fn process_member_change(&mut self, handle: EntityHandle, member: &str) -> Result<()> {
        let ty = self.type_of(handle)?;
        for assoc in ty.associations() {
            if assoc.to_many || !assoc.is_foreign_key || !assoc.this_key.iter().any(|k| k == member)
            {
                continue;
            }
            let entity = self.entity(handle)?;
            let Some(state) = entity.refs.get(&assoc.name) else {
                continue;
            };
            let still_valid = state.assigned
                && match state.value {
                    Some(t) => self.entities.get(&t).is_some_and(|target| {
                        target.key_values(&assoc.other_key) == entity.key_values(&assoc.this_key)
                    }),
                    None => entity.key_values(&assoc.this_key).iter().all(Value::is_null),
                };
            if !still_valid {
                self.entity_mut(handle)?.refs.remove(&assoc.name);
                self.notify(Notification::PropertyChanged {
                    entity: handle,
                    member: assoc.name.clone(),
                });
            }
        }
        self.refresh_observers(handle, Some(member))
    }

    /// Re-evaluate `handle` in every view observing its set
    ///
    /// With `member` set only views keyed on that member are touched and
    /// entities may leave a view; with `None` (the entity just became
    /// Unmodified) entities can only join.
    pub(crate) fn refresh_observers(&mut self, handle: EntityHandle, member: Option<&str>) -> Result<()> {
        let (set_name, visible) = {
            let e = self.entity(handle)?;
            let Some(set_name) = e.entity_set.clone() else {
                return Ok(());
            };
            (
                set_name,
                !matches!(e.state, EntityState::New | EntityState::Deleted),
            )
        };

        let observers = self.entity_set(&set_name)?.observers();
        for (key, owners) in observers {
            let Some((owner_type, assoc_name)) = key.split_once('.') else {
                continue;
            };
            let Some(assoc) = self
                .schema
                .entity_type(owner_type)?
                .association(assoc_name)
                .cloned()
            else {
                continue;
            };
            if let Some(m) = member {
                if !assoc.other_key.iter().any(|k| k == m) {
                    continue;
                }
            }

            for owner in owners {
                let matches = visible
                    && match (self.entities.get(&owner), self.entities.get(&handle)) {
                        (Some(o), Some(t)) => linked_by_key(o, &assoc, t),
                        _ => false,
                    };
                if assoc.to_many {
                    let contained = self.collection_entities(owner, &assoc.name).contains(&handle);
                    if matches && !contained {
                        self.push_collection_member(owner, &assoc.name, handle)?;
                        if assoc.composition {
                            let child = self.entity_mut(handle)?;
                            if child.parent.is_none() {
                                child.parent = Some(ParentLink {
                                    parent: owner,
                                    association: assoc.name.clone(),
                                });
                            }
                        }
                    } else if !matches && contained && member.is_some() {
                        self.pop_collection_member(owner, &assoc.name, handle)?;
                    }
                } else {
                    let stale = self
                        .entity(owner)?
                        .refs
                        .get(&assoc.name)
                        .is_some_and(|r| !r.assigned && (r.value == Some(handle) || r.value.is_none()));
                    if stale {
                        self.entity_mut(owner)?.refs.remove(&assoc.name);
                        self.notify(Notification::PropertyChanged {
                            entity: owner,
                            member: assoc.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop `handle` from every view that currently shows it
    pub(crate) fn leave_views(&mut self, handle: EntityHandle) -> Result<()> {
        let (set_name, parent) = {
            let e = self.entity(handle)?;
            (
                e.entity_set.clone().or_else(|| e.last_set.clone()),
                e.parent.clone(),
            )
        };

        if let Some(link) = parent {
            if self.entities.contains_key(&link.parent) {
                self.pop_collection_member(link.parent, &link.association, handle)?;
            }
        }
        let Some(set_name) = set_name else {
            return Ok(());
        };

        let observers = self.entity_set(&set_name)?.observers();
        for (key, owners) in observers {
            let Some((_, assoc_name)) = key.split_once('.') else {
                continue;
            };
            for owner in owners {
                self.pop_collection_member(owner, assoc_name, handle)?;
                let entity = self.entity_mut(owner)?;
                let stale = entity
                    .refs
                    .get(assoc_name)
                    .is_some_and(|r| r.value == Some(handle) && !r.assigned);
                if stale {
                    entity.refs.remove(assoc_name);
                }
            }
        }
        Ok(())
    }

    /// Register a newly tracked entity for the views it already materialized
    pub(crate) fn observe_materialized(&mut self, handle: EntityHandle) -> Result<()> {
        let ty = self.type_of(handle)?;
        let entity = self.entity(handle)?;
        let observed: Vec<(String, String)> = ty
            .associations()
            .filter(|a| {
                if a.to_many {
                    entity.collections.get(&a.name).is_some_and(|c| c.loaded)
                } else {
                    entity.refs.contains_key(&a.name)
                }
            })
            .map(|a| (a.target_type.clone(), observer_key(ty.name(), &a.name)))
            .collect();
        for (target_type, key) in observed {
            self.set_mut(&target_type)?.observe(&key, handle);
        }
        Ok(())
    }

    /// Unregister `handle` as an observer and forget unassigned resolutions,
    /// then drop it from other entities' views
    pub(crate) fn release_views(&mut self, handle: EntityHandle) -> Result<()> {
        let ty = self.type_of(handle)?;
        for assoc in ty.associations() {
            self.set_mut(&assoc.target_type)?
                .unobserve(&observer_key(ty.name(), &assoc.name), handle);
        }
        {
            let entity = self.entity_mut(handle)?;
            for state in entity.collections.values_mut() {
                state.loaded = false;
            }
            entity.refs.retain(|_, r| r.assigned);
        }
        self.leave_views(handle)
    }
}
