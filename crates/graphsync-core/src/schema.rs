//! Explicit per-type schema
//!
//! Which members are keys, data or associations, and which associations are
//! compositions, is declared once in a [`SchemaRegistry`] and passed to the
//! container. Nothing is discovered at runtime.

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    AssociationDescriptor, EntityType, MemberDescriptor, MemberFlags, MemberKind,
};
pub use registry::{
    CompositionEdge, EntitySchema, EntityTypeBuilder, SchemaRegistry, SchemaRegistryBuilder,
};
