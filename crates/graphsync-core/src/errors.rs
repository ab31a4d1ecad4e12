use thiserror::Error;

use crate::model::EntityHandle;

/// Result type alias using GraphSyncError
pub type Result<T> = std::result::Result<T, GraphSyncError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every `GraphSyncError` maps onto one of these kinds. The kind carries a
/// stable code used in structured log events and by callers that need to
/// branch on the class of failure rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Schema / input
    Schema,
    InvalidInput,
    NotFound,

    // Graph invariants
    TypeMismatch,
    CrossContainer,
    AlreadyAttached,
    NotAttached,
    NullIdentity,
    DuplicateIdentity,
    KeyModified,
    IllegalReparent,
    NotSupported,
    ReadOnly,
    Deleted,

    // Actions / edit sessions
    InvalidAction,
    EditSession,

    // Submit / reconciliation
    ValidationFailed,
    SubmitInProgress,
    ExternalService,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Schema => "ERR_SCHEMA",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::CrossContainer => "ERR_CROSS_CONTAINER",
            ExErrorKind::AlreadyAttached => "ERR_ALREADY_ATTACHED",
            ExErrorKind::NotAttached => "ERR_NOT_ATTACHED",
            ExErrorKind::NullIdentity => "ERR_NULL_IDENTITY",
            ExErrorKind::DuplicateIdentity => "ERR_DUPLICATE_IDENTITY",
            ExErrorKind::KeyModified => "ERR_KEY_MODIFIED",
            ExErrorKind::IllegalReparent => "ERR_ILLEGAL_REPARENT",
            ExErrorKind::NotSupported => "ERR_NOT_SUPPORTED",
            ExErrorKind::ReadOnly => "ERR_READ_ONLY",
            ExErrorKind::Deleted => "ERR_DELETED",
            ExErrorKind::InvalidAction => "ERR_INVALID_ACTION",
            ExErrorKind::EditSession => "ERR_EDIT_SESSION",
            ExErrorKind::ValidationFailed => "ERR_VALIDATION_FAILED",
            ExErrorKind::SubmitInProgress => "ERR_SUBMIT_IN_PROGRESS",
            ExErrorKind::ExternalService => "ERR_EXTERNAL_SERVICE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries the kind plus optional context fields. Built from
/// `GraphSyncError` for logging and for callers at the engine boundary.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    entity_type: Option<String>,
    entity: Option<EntityHandle>,
    member: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            entity_type: None,
            entity: None,
            member: None,
            message: String::new(),
            source: None,
        }
    }

    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_entity(mut self, entity: EntityHandle) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn entity(&self) -> Option<EntityHandle> {
        self.entity
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(entity_type) = &self.entity_type {
            write!(f, " (entity_type: {})", entity_type)?;
        }
        if let Some(entity) = self.entity {
            write!(f, " (entity: {})", entity)?;
        }
        if let Some(member) = &self.member {
            write!(f, " (member: {})", member)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for change-tracking operations
///
/// Invariant violations are programming errors: they are returned
/// immediately and the operation that raised them leaves the graph as it
/// was before the call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphSyncError {
    // ===== Schema Errors =====
    #[error("Invalid schema: {reason}")]
    Schema { reason: String },

    #[error("Unknown entity type: {type_name}")]
    UnknownEntityType { type_name: String },

    #[error("Entity type {type_name} has no member {member}")]
    UnknownMember { type_name: String, member: String },

    #[error("Member {member} of {type_name} is not an association")]
    NotAnAssociation { type_name: String, member: String },

    #[error("Member {member} of {type_name} is an association and holds no value")]
    NotADataMember { type_name: String, member: String },

    // ===== Graph Invariant Errors =====
    #[error("Entity not found: {entity}")]
    EntityNotFound { entity: EntityHandle },

    #[error("Entity {entity} is a {actual}, expected {expected}")]
    TypeMismatch {
        entity: EntityHandle,
        expected: String,
        actual: String,
    },

    #[error("Entity {entity} belongs to a different container")]
    CrossContainer { entity: EntityHandle },

    #[error("Entity {entity} is already attached to the {type_name} set")]
    EntityAlreadyAttached {
        entity: EntityHandle,
        type_name: String,
    },

    #[error("Entity {entity} is not in the {type_name} set")]
    EntityNotInSet {
        entity: EntityHandle,
        type_name: String,
    },

    #[error("An entity of type {type_name} has no identity: key members are null")]
    NullIdentity { type_name: String },

    #[error("An entity with identity {identity} already exists in the {type_name} set")]
    DuplicateIdentity { type_name: String, identity: String },

    #[error("Key member {member} of entity {entity} cannot be modified")]
    KeyMemberModified { entity: EntityHandle, member: String },

    #[error("Composed entity {entity} cannot be re-parented by editing {member}")]
    IllegalReparent { entity: EntityHandle, member: String },

    #[error("The {type_name} set does not support {operation}")]
    OperationNotSupported { type_name: String, operation: String },

    #[error("Member {member} of entity {entity} is read-only")]
    ReadOnlyMember { entity: EntityHandle, member: String },

    #[error("Entity {entity} is read-only: {reason}")]
    EntityReadOnly { entity: EntityHandle, reason: String },

    #[error("Entity {entity} is deleted")]
    EntityDeleted { entity: EntityHandle },

    // ===== Action / Edit Session Errors =====
    #[error("Entity {entity} has a custom action with no name")]
    UnnamedAction { entity: EntityHandle },

    #[error("Action {action} is already pending on entity {entity}")]
    ActionAlreadyInvoked { entity: EntityHandle, action: String },

    #[error("Entity {entity} already has an open edit session")]
    EditSessionActive { entity: EntityHandle },

    #[error("Entity {entity} has no open edit session")]
    NoEditSession { entity: EntityHandle },

    // ===== Submit Errors =====
    #[error("Validation failed for {} entities", entities.len())]
    ValidationFailed { entities: Vec<EntityHandle> },

    #[error("A submit is already in progress")]
    SubmitInProgress,

    #[error("Changeset has no entry with id {id}")]
    UnknownChangeSetEntry { id: u32 },

    #[error("Remote executor failed: {message}")]
    Remote { message: String },

    // ===== Generic Errors =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<GraphSyncError> for ExError {
    fn from(err: GraphSyncError) -> Self {
        let message = err.to_string();
        let ex = match err {
            GraphSyncError::Schema { .. } => ExError::new(ExErrorKind::Schema),

            GraphSyncError::UnknownEntityType { type_name } => {
                ExError::new(ExErrorKind::NotFound).with_entity_type(type_name)
            }

            GraphSyncError::UnknownMember { type_name, member }
            | GraphSyncError::NotAnAssociation { type_name, member }
            | GraphSyncError::NotADataMember { type_name, member } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_entity_type(type_name)
                    .with_member(member)
            }

            GraphSyncError::EntityNotFound { entity } => {
                ExError::new(ExErrorKind::NotFound).with_entity(entity)
            }

            GraphSyncError::TypeMismatch {
                entity, expected, ..
            } => ExError::new(ExErrorKind::TypeMismatch)
                .with_entity(entity)
                .with_entity_type(expected),

            GraphSyncError::CrossContainer { entity } => {
                ExError::new(ExErrorKind::CrossContainer).with_entity(entity)
            }

            GraphSyncError::EntityAlreadyAttached { entity, type_name } => {
                ExError::new(ExErrorKind::AlreadyAttached)
                    .with_entity(entity)
                    .with_entity_type(type_name)
            }

            GraphSyncError::EntityNotInSet { entity, type_name } => {
                ExError::new(ExErrorKind::NotAttached)
                    .with_entity(entity)
                    .with_entity_type(type_name)
            }

            GraphSyncError::NullIdentity { type_name } => {
                ExError::new(ExErrorKind::NullIdentity).with_entity_type(type_name)
            }

            GraphSyncError::DuplicateIdentity { type_name, .. } => {
                ExError::new(ExErrorKind::DuplicateIdentity).with_entity_type(type_name)
            }

            GraphSyncError::KeyMemberModified { entity, member } => {
                ExError::new(ExErrorKind::KeyModified)
                    .with_entity(entity)
                    .with_member(member)
            }

            GraphSyncError::IllegalReparent { entity, member } => {
                ExError::new(ExErrorKind::IllegalReparent)
                    .with_entity(entity)
                    .with_member(member)
            }

            GraphSyncError::OperationNotSupported { type_name, .. } => {
                ExError::new(ExErrorKind::NotSupported).with_entity_type(type_name)
            }

            GraphSyncError::ReadOnlyMember { entity, member } => {
                ExError::new(ExErrorKind::ReadOnly)
                    .with_entity(entity)
                    .with_member(member)
            }

            GraphSyncError::EntityReadOnly { entity, .. } => {
                ExError::new(ExErrorKind::ReadOnly).with_entity(entity)
            }

            GraphSyncError::EntityDeleted { entity } => {
                ExError::new(ExErrorKind::Deleted).with_entity(entity)
            }

            GraphSyncError::UnnamedAction { entity }
            | GraphSyncError::ActionAlreadyInvoked { entity, .. } => {
                ExError::new(ExErrorKind::InvalidAction).with_entity(entity)
            }

            GraphSyncError::EditSessionActive { entity }
            | GraphSyncError::NoEditSession { entity } => {
                ExError::new(ExErrorKind::EditSession).with_entity(entity)
            }

            GraphSyncError::ValidationFailed { .. } => {
                ExError::new(ExErrorKind::ValidationFailed)
            }

            GraphSyncError::SubmitInProgress => ExError::new(ExErrorKind::SubmitInProgress),

            GraphSyncError::UnknownChangeSetEntry { .. } => {
                ExError::new(ExErrorKind::NotFound).with_op("apply_submit_results")
            }

            GraphSyncError::Remote { .. } => ExError::new(ExErrorKind::ExternalService),

            GraphSyncError::Serialization { .. } => ExError::new(ExErrorKind::Serialization),

            GraphSyncError::Internal { .. } => ExError::new(ExErrorKind::Internal),
        };
        ex.with_message(message)
    }
}

/// Conversion from serde_json::Error to GraphSyncError
impl From<serde_json::Error> for GraphSyncError {
    fn from(err: serde_json::Error) -> Self {
        GraphSyncError::Serialization {
            message: err.to_string(),
        }
    }
}
