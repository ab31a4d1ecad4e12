//! graphsync core - client-side entity graph change tracking
//!
//! This crate holds an in-memory graph of entities mirrored from a remote
//! data service and tracks every local change to it:
//! - Entity state machine (Detached / New / Unmodified / Modified / Deleted)
//! - Per-type entity sets with an identity cache and a dirty index
//! - Composition-aware aggregate change tracking in `EntityContainer`
//! - Lazily materialized association views kept in step with foreign keys
//! - Changeset synthesis for submit, and reconciliation of server results
//!
//! The schema is explicit: a [`SchemaRegistry`] built once and shared by
//! `Arc`. Remote I/O is delegated to a [`RemoteExecutor`].

pub mod changeset;
pub mod container;
pub mod entity;
pub mod entity_set;
pub mod errors;
pub(crate) mod graph_walk;
pub mod logging_facility;
pub mod model;
pub mod remote;
pub mod schema;
pub mod validation;

// Re-export commonly used types
pub use changeset::{
    BuiltChangeSet, ChangeSetBuilder, ChangeSetEntry, EntityChangeSet, EntityOperation,
};
pub use container::{EntityContainer, SubmitOutcome};
pub use entity::{Entity, EntityConflict, ParentLink};
pub use entity_set::{EntitySet, EntitySetOperations};
pub use errors::{ExError, ExErrorKind, GraphSyncError, Result};
pub use model::{
    CollectionChangeAction, EntityAction, EntityHandle, EntityState, Identity, LoadBehavior,
    Notification, Value, Values,
};
pub use remote::{
    ChangeSetResultEntry, EntryOutcome, QueryResult, QuerySpec, RemoteError, RemoteExecutor,
};
pub use schema::{AssociationDescriptor, EntitySchema, MemberFlags, SchemaRegistry};
pub use validation::{NoopValidator, ValidationViolation, Validator};

#[doc(hidden)]
pub mod __private {
    pub use graphsync_core_types;
    pub use tracing;
}
