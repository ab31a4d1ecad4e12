//! The three builder passes
//!
//! 1. Assign an id and operation to every New, Modified and Deleted entity.
//! 2. Add a `None` entry for every Unmodified entity reachable through
//!    compositions from an entry, so association maps only reference ids
//!    that exist.
//! 3. Compute current and original association maps.

use std::collections::{BTreeMap, HashMap};

use super::{check, BuiltChangeSet, ChangeSetEntry, EntityOperation};
use crate::container::EntityContainer;
use crate::errors::{GraphSyncError, Result};
use crate::model::{EntityHandle, EntityState, Values};
use crate::schema::{AssociationDescriptor, EntitySchema};

#[derive(Default)]
struct Draft {
    entries: Vec<ChangeSetEntry>,
    handles: Vec<EntityHandle>,
    ids: HashMap<EntityHandle, u32>,
}

impl Draft {
    fn push(&mut self, handle: EntityHandle, mut entry: ChangeSetEntry) -> u32 {
        let id = self.entries.len() as u32;
        entry.id = id;
        self.entries.push(entry);
        self.handles.push(handle);
        self.ids.insert(handle, id);
        id
    }

    fn ids_of(&self, handles: &[EntityHandle]) -> Vec<u32> {
        let mut ids: Vec<u32> = handles
            .iter()
            .filter_map(|h| self.ids.get(h).copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

pub(crate) fn build(container: &mut EntityContainer) -> Result<BuiltChangeSet> {
    let changes = container.get_changes();
    check::check_for_invalid_updates(container, &changes)?;

    let mut draft = Draft::default();
    for handle in changes.iter() {
        if let Some(entry) = operation_entry(container, handle)? {
            draft.push(handle, entry);
        }
    }
    let operations = draft.entries.len();

    include_unmodified_children(container, &mut draft)?;
    tracing::debug!(
        operations,
        unmodified_children = draft.entries.len() - operations,
        "changeset entries assigned"
    );

    for index in 0..draft.entries.len() {
        let handle = draft.handles[index];
        let (current, original) = association_maps(container, &draft, handle)?;
        let entry = &mut draft.entries[index];
        entry.associations = current;
        entry.original_associations = original;
    }

    Ok(BuiltChangeSet {
        entries: draft.entries,
        handles: draft.handles,
    })
}

fn operation_entry(
    container: &EntityContainer,
    handle: EntityHandle,
) -> Result<Option<ChangeSetEntry>> {
    let entity = container.entity(handle)?;
    let operation = match entity.state() {
        EntityState::New => EntityOperation::Insert,
        EntityState::Modified => EntityOperation::Update,
        EntityState::Deleted => EntityOperation::Delete,
        EntityState::Unmodified | EntityState::Detached => return Ok(None),
    };
    if entity.custom_actions().iter().any(|a| !a.is_named()) {
        return Err(GraphSyncError::UnnamedAction { entity: handle });
    }

    let roundtrip = container.schema().roundtrip_members(entity.type_name());
    let original_values = if !roundtrip.is_empty()
        && matches!(operation, EntityOperation::Update | EntityOperation::Delete)
    {
        let source = entity.original_values().unwrap_or(entity.values());
        let original: Values = entity
            .entity_type()
            .key_members()
            .iter()
            .chain(roundtrip.iter())
            .filter_map(|m| source.get(m).map(|v| (m.clone(), v.clone())))
            .collect();
        Some(original)
    } else {
        None
    };

    Ok(Some(ChangeSetEntry {
        id: 0,
        entity_type: entity.type_name().to_string(),
        operation,
        values: entity.values().clone(),
        has_member_changes: operation == EntityOperation::Update
            && original_values.is_none()
            && entity.has_member_changes(),
        original_values,
        entity_actions: entity.custom_actions().to_vec(),
        associations: BTreeMap::new(),
        original_associations: BTreeMap::new(),
    }))
}

/// Pass 2; the worklist is the entry list itself, which grows as it goes
fn include_unmodified_children(container: &mut EntityContainer, draft: &mut Draft) -> Result<()> {
    let mut cursor = 0;
    while cursor < draft.handles.len() {
        let handle = draft.handles[cursor];
        cursor += 1;

        let ty = container.type_of(handle)?;
        for assoc in ty.compositions() {
            if assoc.external_reference {
                continue;
            }
            for child in container.associated(handle, assoc, true)? {
                if draft.ids.contains_key(&child) {
                    continue;
                }
                let entity = container.entity(child)?;
                if entity.state() != EntityState::Unmodified {
                    continue;
                }
                let entry = ChangeSetEntry {
                    id: 0,
                    entity_type: entity.type_name().to_string(),
                    operation: EntityOperation::None,
                    values: entity.values().clone(),
                    original_values: None,
                    has_member_changes: false,
                    entity_actions: Vec::new(),
                    associations: BTreeMap::new(),
                    original_associations: BTreeMap::new(),
                };
                draft.push(child, entry);
            }
        }
    }
    Ok(())
}

type AssociationMap = BTreeMap<String, Vec<u32>>;

fn association_maps(
    container: &mut EntityContainer,
    draft: &Draft,
    handle: EntityHandle,
) -> Result<(AssociationMap, AssociationMap)> {
    let ty = container.type_of(handle)?;
    let owner_deleted = container.entity(handle)?.state() == EntityState::Deleted;
    let mut current = AssociationMap::new();
    let mut original = AssociationMap::new();

    for assoc in ty.associations() {
        if assoc.external_reference {
            continue;
        }
        if assoc.composition {
            let linked = container.associated(handle, assoc, true)?;
            let before = original_children(container, draft, handle, assoc, &linked)?;
            insert_ids(&mut current, &assoc.name, draft.ids_of(&linked));
            insert_ids(&mut original, &assoc.name, draft.ids_of(&before));
        } else if !owner_deleted {
            let mut added = Vec::new();
            for target in container.associated(handle, assoc, false)? {
                if container.entity(target)?.state() == EntityState::New {
                    added.push(target);
                }
            }
            insert_ids(&mut current, &assoc.name, draft.ids_of(&added));
        }
    }
    Ok((current, original))
}

/// Children linked through `assoc` before the pending changes
fn original_children(
    container: &mut EntityContainer,
    draft: &Draft,
    handle: EntityHandle,
    assoc: &AssociationDescriptor,
    linked: &[EntityHandle],
) -> Result<Vec<EntityHandle>> {
    let mut removed = Vec::new();
    for (index, entry) in draft.entries.iter().enumerate() {
        if entry.operation != EntityOperation::Delete || entry.entity_type != assoc.target_type {
            continue;
        }
        let candidate = draft.handles[index];
        if container.resolve_parent(candidate)? != Some(handle) {
            continue;
        }
        let same_edge = container
            .entity(candidate)?
            .parent()
            .is_some_and(|link| link.association == assoc.name);
        if same_edge {
            removed.push(candidate);
        }
    }

    let mut kept = Vec::new();
    for &child in linked {
        if container.entity(child)?.state() != EntityState::New {
            kept.push(child);
        }
    }

    if !assoc.to_many {
        // A to-one composition reports the replaced child, or no drift.
        return Ok(if removed.is_empty() { kept } else { removed });
    }
    kept.extend(removed);
    Ok(kept)
}

fn insert_ids(map: &mut AssociationMap, member: &str, ids: Vec<u32>) {
    if !ids.is_empty() {
        map.insert(member.to_string(), ids);
    }
}
