//! Attaching entities to sets: add, attach, load, detach

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::{check_value_members, EntityContainer};
use crate::errors::{GraphSyncError, Result};
use crate::graph_walk;
use crate::model::{EntityHandle, EntityState, Identity, LoadBehavior, Values};
use crate::schema::EntitySchema;
use crate::{log_op_end, log_op_error, log_op_start};

/// How a walk attaches the entities it reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachMode {
    /// Brand-new rows, tracked as New
    Add,
    /// Existing server rows, tracked as Unmodified
    Attach,
}

impl AttachMode {
    fn target_state(self) -> EntityState {
        match self {
            AttachMode::Add => EntityState::New,
            AttachMode::Attach => EntityState::Unmodified,
        }
    }
}

impl EntityContainer {
    /// Track a detached entity as New, along with every detached entity
    /// reachable from it through materialized associations
    ///
    /// Re-adding an entity this set holds as Deleted undoes the delete.
    ///
    /// # Errors
    ///
    /// * `EntityAlreadyAttached` - the entity is already tracked
    /// * `DuplicateIdentity` - a reached entity has the identity of another
    ///   tracked, non-deleted entity (New ones included)
    /// * `OperationNotSupported` - a reached entity's set disallows adds
    ///
    /// On error nothing is attached.
    pub fn add(&mut self, handle: EntityHandle) -> Result<()> {
        log_op_start!("add", entity = %handle);
        let start = Instant::now();

        let inferred = self.add_impl(handle).map_err(|e| {
            log_op_error!("add", e, duration_ms = start.elapsed().as_millis() as u64);
            e
        })?;

        log_op_end!(
            "add",
            duration_ms = start.elapsed().as_millis() as u64,
            inferred_count = inferred
        );
        Ok(())
    }

    pub(crate) fn add_impl(&mut self, handle: EntityHandle) -> Result<usize> {
        let entity = self.entity(handle)?;
        match (entity.state, entity.entity_set.is_some()) {
            (EntityState::Deleted, true) => {
                self.undo_delete(handle)?;
                return Ok(0);
            }
            (EntityState::Detached, _) => {}
            _ => {
                return Err(GraphSyncError::EntityAlreadyAttached {
                    entity: handle,
                    type_name: entity.type_name().to_string(),
                })
            }
        }
        self.attach_graph(handle, AttachMode::Add)
    }

    /// Track a detached entity as Unmodified, inferring the same for every
    /// detached entity reachable from it
    ///
    /// # Errors
    ///
    /// * `EntityAlreadyAttached` - the entity is already tracked
    /// * `NullIdentity` - a reached entity has a null key member
    /// * `DuplicateIdentity` - a reached identity is already cached
    ///
    /// On error nothing is attached.
    pub fn attach(&mut self, handle: EntityHandle) -> Result<()> {
        log_op_start!("attach", entity = %handle);
        let start = Instant::now();

        let inferred = self.attach_impl(handle).map_err(|e| {
            log_op_error!("attach", e, duration_ms = start.elapsed().as_millis() as u64);
            e
        })?;

        log_op_end!(
            "attach",
            duration_ms = start.elapsed().as_millis() as u64,
            inferred_count = inferred
        );
        Ok(())
    }

    fn attach_impl(&mut self, handle: EntityHandle) -> Result<usize> {
        let entity = self.entity(handle)?;
        if entity.state != EntityState::Detached {
            return Err(GraphSyncError::EntityAlreadyAttached {
                entity: handle,
                type_name: entity.type_name().to_string(),
            });
        }
        self.attach_graph(handle, AttachMode::Attach)
    }

    /// Plan the whole walk, check it, then attach; returns the inferred count
    fn attach_graph(&mut self, root: EntityHandle, mode: AttachMode) -> Result<usize> {
        let plan = graph_walk::reachable(&[root], |h| self.detached_neighbours(h))?;
        self.check_attach_plan(&plan, mode)?;

        tracing::debug!(
            root = %root,
            planned = plan.len(),
            ?mode,
            "attaching entity graph"
        );
        for &handle in &plan {
            self.attach_one(handle, mode.target_state())?;
        }
        Ok(plan.len().saturating_sub(1))
    }

    /// Detached entities directly reachable through materialized associations
    ///
    /// Unresolved references are not forced here; only what the caller has
    /// already assigned or loaded is followed.
    fn detached_neighbours(&self, handle: EntityHandle) -> Result<Vec<EntityHandle>> {
        let entity = self.entity(handle)?;
        let mut out = Vec::new();
        for assoc in entity.entity_type.associations() {
            if assoc.external_reference {
                continue;
            }
            let linked: Vec<EntityHandle> = if assoc.to_many {
                entity
                    .collections
                    .get(&assoc.name)
                    .map(|c| c.entities.clone())
                    .unwrap_or_default()
            } else {
                entity
                    .refs
                    .get(&assoc.name)
                    .and_then(|r| r.value)
                    .into_iter()
                    .collect()
            };
            for next in linked {
                let detached = self
                    .entities
                    .get(&next)
                    .is_some_and(|e| e.state == EntityState::Detached);
                if detached && !out.contains(&next) {
                    out.push(next);
                }
            }
        }
        Ok(out)
    }

    fn check_attach_plan(&self, plan: &[EntityHandle], mode: AttachMode) -> Result<()> {
        let mut claimed: HashSet<(String, Identity)> = HashSet::new();
        for &handle in plan {
            let entity = self.entity(handle)?;
            let type_name = entity.type_name().to_string();
            let set = self.entity_set(&type_name)?;
            let identity = entity.identity();

            match mode {
                AttachMode::Add => {
                    if !set.operations().add {
                        return Err(GraphSyncError::OperationNotSupported {
                            type_name,
                            operation: "add".to_string(),
                        });
                    }
                    let Some(identity) = identity else {
                        continue;
                    };
                    if self.identity_holder(&type_name, &identity, Some(handle))?.is_some()
                        || !claimed.insert((type_name.clone(), identity.clone()))
                    {
                        return Err(GraphSyncError::DuplicateIdentity {
                            type_name,
                            identity: identity.to_string(),
                        });
                    }
                }
                AttachMode::Attach => {
                    let identity = identity.ok_or_else(|| GraphSyncError::NullIdentity {
                        type_name: type_name.clone(),
                    })?;
                    if set.find(&identity).is_some()
                        || self.identity_holder(&type_name, &identity, Some(handle))?.is_some()
                        || !claimed.insert((type_name.clone(), identity.clone()))
                    {
                        return Err(GraphSyncError::DuplicateIdentity {
                            type_name,
                            identity: identity.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Tracked, non-deleted entity (other than `except`) that holds `identity`
    ///
    /// New entities are not in the identity cache, so the set's dirty index
    /// is scanned for them.
    pub(crate) fn identity_holder(
        &self,
        type_name: &str,
        identity: &Identity,
        except: Option<EntityHandle>,
    ) -> Result<Option<EntityHandle>> {
        let set = self.entity_set(type_name)?;
        if let Some(existing) = set.find(identity) {
            if Some(existing) != except && self.entity(existing)?.state != EntityState::Deleted {
                return Ok(Some(existing));
            }
        }
        for handle in set.interesting_entities() {
            if Some(handle) == except {
                continue;
            }
            let entity = self.entity(handle)?;
            if entity.state == EntityState::New && entity.identity().as_ref() == Some(identity) {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Put one detached entity into its set in `state`
    pub(crate) fn attach_one(&mut self, handle: EntityHandle, state: EntityState) -> Result<()> {
        let (type_name, identity) = {
            let entity = self.entity_mut(handle)?;
            let type_name = entity.type_name().to_string();
            entity.entity_set = Some(type_name.clone());
            entity.last_set = Some(type_name.clone());
            entity.conflict = None;
            (type_name, entity.identity())
        };

        let set = self.set_mut(&type_name)?;
        set.push(handle);
        if state == EntityState::Unmodified {
            if let Some(identity) = identity {
                set.cache(identity, handle);
            }
        }

        self.change_state(handle, state)?;
        self.observe_materialized(handle)?;
        if state == EntityState::Unmodified {
            self.refresh_observers(handle, None)?;
        }
        Ok(())
    }

    /// Bring a Deleted entity back into its set
    pub(crate) fn undo_delete(&mut self, handle: EntityHandle) -> Result<()> {
        let (type_name, has_originals) = {
            let entity = self.entity(handle)?;
            (
                entity.type_name().to_string(),
                entity.original_values.is_some(),
            )
        };
        self.set_mut(&type_name)?.push(handle);

        let restored = if has_originals || self.has_child_changes(handle)? {
            EntityState::Modified
        } else {
            EntityState::Unmodified
        };
        self.change_state(handle, restored)?;
        self.refresh_observers(handle, None)
    }

    /// Stop tracking an entity without recording a delete
    ///
    /// # Errors
    ///
    /// Returns `EntityNotInSet` if the entity is not attached.
    pub fn detach(&mut self, handle: EntityHandle) -> Result<()> {
        log_op_start!("detach", entity = %handle);
        let start = Instant::now();

        self.detach_impl(handle).map_err(|e| {
            log_op_error!("detach", e, duration_ms = start.elapsed().as_millis() as u64);
            e
        })?;

        log_op_end!("detach", duration_ms = start.elapsed().as_millis() as u64);
        Ok(())
    }

    fn detach_impl(&mut self, handle: EntityHandle) -> Result<()> {
        let entity = self.entity(handle)?;
        if entity.entity_set.is_none() {
            return Err(GraphSyncError::EntityNotInSet {
                entity: handle,
                type_name: entity.type_name().to_string(),
            });
        }
        self.detach_one(handle)
    }

    pub(crate) fn detach_one(&mut self, handle: EntityHandle) -> Result<()> {
        self.release_views(handle)?;
        let type_name = self.type_of(handle)?.name().to_string();

        let set = self.set_mut(&type_name)?;
        set.unlist(handle);
        set.uncache(handle);

        {
            let entity = self.entity_mut(handle)?;
            entity.entity_set = None;
            entity.last_set = Some(type_name);
            entity.clear_tracking();
            entity.custom_actions.clear();
            entity.edit_session = None;
            entity.conflict = None;
            entity.is_submitting = false;
        }
        self.change_state(handle, EntityState::Detached)
    }

    /// Detach every entity of one set, Deleted ones included
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the schema has no such type.
    pub fn clear(&mut self, type_name: &str) -> Result<()> {
        log_op_start!("clear", entity_type = type_name);
        let start = Instant::now();

        let set = self.entity_set(type_name)?;
        let mut handles = set.handles().to_vec();
        for cached in set.cached_handles() {
            if !handles.contains(&cached) {
                handles.push(cached);
            }
        }
        for handle in &handles {
            if self.entity(*handle)?.entity_set.is_some() {
                self.detach_one(*handle)?;
            }
        }

        log_op_end!(
            "clear",
            duration_ms = start.elapsed().as_millis() as u64,
            entry_count = handles.len()
        );
        Ok(())
    }

    /// Materialize server state for one entity
    ///
    /// An entity already cached under the same identity is reconciled with
    /// `behavior` and returned; otherwise a new Unmodified entity is attached.
    ///
    /// # Errors
    ///
    /// * `UnknownEntityType` / `UnknownMember` - the values do not fit the schema
    /// * `NullIdentity` - a key member is missing or null
    /// * `DuplicateIdentity` - a New entity already claims the identity
    pub fn load(
        &mut self,
        type_name: &str,
        values: Values,
        behavior: LoadBehavior,
    ) -> Result<EntityHandle> {
        log_op_start!("load", entity_type = type_name);
        let start = Instant::now();

        let handle = self.load_impl(type_name, values, behavior).map_err(|e| {
            log_op_error!("load", e, duration_ms = start.elapsed().as_millis() as u64);
            e
        })?;

        log_op_end!(
            "load",
            duration_ms = start.elapsed().as_millis() as u64,
            entity = %handle
        );
        Ok(handle)
    }

    /// Load several rows of one type, returning handles in input order
    ///
    /// # Errors
    ///
    /// Stops at the first row that fails to load.
    pub fn load_all(
        &mut self,
        type_name: &str,
        rows: Vec<Values>,
        behavior: LoadBehavior,
    ) -> Result<Vec<EntityHandle>> {
        rows.into_iter()
            .map(|values| self.load(type_name, values, behavior))
            .collect()
    }

    fn load_impl(
        &mut self,
        type_name: &str,
        values: Values,
        behavior: LoadBehavior,
    ) -> Result<EntityHandle> {
        let ty = Arc::clone(self.schema.entity_type(type_name)?);
        check_value_members(&ty, values.keys())?;

        let key = ty
            .key_members()
            .iter()
            .map(|k| values.get(k).cloned().unwrap_or_default())
            .collect();
        let identity = Identity::from_values(key).ok_or_else(|| GraphSyncError::NullIdentity {
            type_name: type_name.to_string(),
        })?;

        if let Some(existing) = self.entity_set(type_name)?.find(&identity) {
            self.merge_values(existing, &values, behavior, false)?;
            return Ok(existing);
        }
        if self
            .identity_holder(type_name, &identity, None)?
            .is_some()
        {
            return Err(GraphSyncError::DuplicateIdentity {
                type_name: type_name.to_string(),
                identity: identity.to_string(),
            });
        }

        let handle = self.create_with(type_name, values)?;
        self.attach_one(handle, EntityState::Unmodified)?;
        Ok(handle)
    }
}
