//! Updates the server must never see

use super::EntityChangeSet;
use crate::container::EntityContainer;
use crate::errors::{GraphSyncError, Result};
use crate::model::Value;
use crate::schema::EntitySchema;

/// Reject key edits and foreign-key re-parenting of composed children
///
/// Re-parenting has to go through the association operations, which keep
/// both parents' views and states consistent.
pub(crate) fn check_for_invalid_updates(
    container: &EntityContainer,
    changes: &EntityChangeSet,
) -> Result<()> {
    let schema = container.schema();
    for &handle in &changes.modified {
        let entity = container.entity(handle)?;
        let ty = entity.entity_type();

        if let Some(member) = entity.modified_members().iter().find(|m| ty.is_key(m)) {
            return Err(GraphSyncError::KeyMemberModified {
                entity: handle,
                member: member.clone(),
            });
        }

        for edge in schema.composition_parents(ty.name()) {
            let Some(assoc) = schema
                .entity_type(&edge.parent_type)?
                .association(&edge.association)
            else {
                continue;
            };
            for member in &assoc.other_key {
                if !entity.modified_members().contains(member) {
                    continue;
                }
                let original = entity.original_value(member).unwrap_or(&Value::Null);
                let current = entity.value(member).unwrap_or(&Value::Null);
                if !original.is_null() && original != current {
                    return Err(GraphSyncError::IllegalReparent {
                        entity: handle,
                        member: member.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
