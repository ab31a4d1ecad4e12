use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::descriptor::{
    AssociationDescriptor, EntityType, MemberDescriptor, MemberFlags, MemberKind,
};
use crate::errors::{GraphSyncError, Result};

/// A composition edge seen from the child type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEdge {
    pub parent_type: String,
    /// Association member on the parent type
    pub association: String,
}

/// Static per-type metadata queried by the change-tracking core
pub trait EntitySchema {
    /// # Errors
    ///
    /// Returns `UnknownEntityType` if the type was never registered.
    fn entity_type(&self, type_name: &str) -> Result<&Arc<EntityType>>;

    fn is_key_member(&self, type_name: &str, member: &str) -> bool;

    fn is_association_member(&self, type_name: &str, member: &str) -> bool;

    fn is_composition(&self, type_name: &str, member: &str) -> bool;

    fn is_external_reference(&self, type_name: &str, member: &str) -> bool;

    /// Target types of every composition declared on `type_name`, deduplicated
    fn child_types(&self, type_name: &str) -> Vec<String>;

    fn mergeable_members(&self, type_name: &str) -> Vec<String>;

    fn roundtrip_members(&self, type_name: &str) -> Vec<String>;

    /// Composition edges whose target is `type_name`
    fn composition_parents(&self, type_name: &str) -> &[CompositionEdge];
}

/// Schema for every entity type a container can hold
///
/// Built once through [`SchemaRegistry::builder`] and shared by `Arc`.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, Arc<EntityType>>,
    composition_parents: HashMap<String, Vec<CompositionEdge>>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<EntityType>> {
        self.types.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    fn member(&self, type_name: &str, member: &str) -> Option<&MemberDescriptor> {
        self.types.get(type_name).and_then(|t| t.member(member))
    }

    fn association(&self, type_name: &str, member: &str) -> Option<&AssociationDescriptor> {
        self.member(type_name, member)
            .and_then(MemberDescriptor::association)
    }
}

impl EntitySchema for SchemaRegistry {
    fn entity_type(&self, type_name: &str) -> Result<&Arc<EntityType>> {
        self.types
            .get(type_name)
            .ok_or_else(|| GraphSyncError::UnknownEntityType {
                type_name: type_name.to_string(),
            })
    }

    fn is_key_member(&self, type_name: &str, member: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|t| t.is_key(member))
    }

    fn is_association_member(&self, type_name: &str, member: &str) -> bool {
        self.association(type_name, member).is_some()
    }

    fn is_composition(&self, type_name: &str, member: &str) -> bool {
        self.association(type_name, member)
            .is_some_and(|a| a.composition)
    }

    fn is_external_reference(&self, type_name: &str, member: &str) -> bool {
        self.association(type_name, member)
            .is_some_and(|a| a.external_reference)
    }

    fn child_types(&self, type_name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if let Some(t) = self.types.get(type_name) {
            for a in t.compositions() {
                if !out.contains(&a.target_type) {
                    out.push(a.target_type.clone());
                }
            }
        }
        out
    }

    fn mergeable_members(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|t| {
                t.value_members()
                    .filter(|m| m.kind == MemberKind::Data && m.flags.mergeable)
                    .map(|m| m.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn roundtrip_members(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|t| {
                t.value_members()
                    .filter(|m| m.flags.roundtrip)
                    .map(|m| m.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn composition_parents(&self, type_name: &str) -> &[CompositionEdge] {
        self.composition_parents
            .get(type_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Builder for one entity type's members
#[derive(Debug)]
pub struct EntityTypeBuilder {
    name: String,
    members: Vec<MemberDescriptor>,
}

impl EntityTypeBuilder {
    fn push(mut self, name: &str, kind: MemberKind, flags: MemberFlags) -> Self {
        self.members.push(MemberDescriptor {
            name: name.to_string(),
            kind,
            flags,
        });
        self
    }

    /// Key members are never merged; inserts take server keys through `apply_submit_results`
    pub fn key(self, name: &str) -> Self {
        self.push(name, MemberKind::Key, MemberFlags::default().not_mergeable())
    }

    pub fn data(self, name: &str) -> Self {
        self.push(name, MemberKind::Data, MemberFlags::default())
    }

    pub fn data_with(self, name: &str, flags: MemberFlags) -> Self {
        self.push(name, MemberKind::Data, flags)
    }

    pub fn association(self, descriptor: AssociationDescriptor) -> Self {
        let name = descriptor.name.clone();
        self.push(
            &name,
            MemberKind::Association(descriptor),
            MemberFlags::default().not_mergeable(),
        )
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    types: Vec<EntityTypeBuilder>,
}

impl SchemaRegistryBuilder {
    pub fn entity<F>(mut self, name: &str, define: F) -> Self
    where
        F: FnOnce(EntityTypeBuilder) -> EntityTypeBuilder,
    {
        let builder = EntityTypeBuilder {
            name: name.to_string(),
            members: Vec::new(),
        };
        self.types.push(define(builder));
        self
    }

    /// Validate and freeze the schema
    ///
    /// # Errors
    ///
    /// Returns `Schema` for duplicate type or member names, types without
    /// key members, associations with an unknown target, unknown or
    /// non-value key members, or key lists of different lengths.
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut types: BTreeMap<String, Arc<EntityType>> = BTreeMap::new();
        for builder in self.types {
            let mut seen = HashSet::new();
            for m in &builder.members {
                if !seen.insert(m.name.as_str()) {
                    return Err(schema_error(format!(
                        "duplicate member {}.{}",
                        builder.name, m.name
                    )));
                }
            }
            let ty = EntityType::new(builder.name.clone(), builder.members);
            if ty.key_members().is_empty() {
                return Err(schema_error(format!(
                    "entity type {} declares no key members",
                    ty.name()
                )));
            }
            if types.insert(builder.name.clone(), Arc::new(ty)).is_some() {
                return Err(schema_error(format!(
                    "entity type {} declared twice",
                    builder.name
                )));
            }
        }

        let mut composition_parents: HashMap<String, Vec<CompositionEdge>> = HashMap::new();
        for ty in types.values() {
            for assoc in ty.associations() {
                validate_association(&types, ty, assoc)?;
                if assoc.composition {
                    composition_parents
                        .entry(assoc.target_type.clone())
                        .or_default()
                        .push(CompositionEdge {
                            parent_type: ty.name().to_string(),
                            association: assoc.name.clone(),
                        });
                }
            }
        }

        Ok(SchemaRegistry {
            types,
            composition_parents,
        })
    }
}

fn validate_association(
    types: &BTreeMap<String, Arc<EntityType>>,
    owner: &EntityType,
    assoc: &AssociationDescriptor,
) -> Result<()> {
    let path = format!("{}.{}", owner.name(), assoc.name);
    let target = types.get(&assoc.target_type).ok_or_else(|| {
        schema_error(format!(
            "{} targets unknown entity type {}",
            path, assoc.target_type
        ))
    })?;

    if assoc.this_key.is_empty() || assoc.this_key.len() != assoc.other_key.len() {
        return Err(schema_error(format!(
            "{} must declare key lists of equal, non-zero length",
            path
        )));
    }

    let holds_value = |ty: &EntityType, member: &str| {
        ty.member(member).is_some_and(MemberDescriptor::holds_value)
    };
    for member in &assoc.this_key {
        if !holds_value(owner, member) {
            return Err(schema_error(format!(
                "{} uses unknown member {}.{}",
                path,
                owner.name(),
                member
            )));
        }
    }
    for member in &assoc.other_key {
        if !holds_value(target, member) {
            return Err(schema_error(format!(
                "{} uses unknown member {}.{}",
                path,
                target.name(),
                member
            )));
        }
    }

    if let Some(reverse) = &assoc.reverse {
        if target.association(reverse).is_none() {
            return Err(schema_error(format!(
                "{} names reverse {}.{} which is not an association",
                path,
                target.name(),
                reverse
            )));
        }
    }
    Ok(())
}

fn schema_error(reason: String) -> GraphSyncError {
    GraphSyncError::Schema { reason }
}
