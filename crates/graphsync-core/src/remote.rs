//! Remote executor contract
//!
//! The core never performs I/O. Queries and submits are delegated to a
//! [`RemoteExecutor`], whose results re-enter the container through `load`
//! and `apply_submit_results`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::changeset::ChangeSetEntry;
use crate::entity::EntityConflict;
use crate::errors::GraphSyncError;
use crate::model::{Value, Values};
use crate::validation::ValidationViolation;

/// Query against one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub entity_type: String,
    /// Member equality filters
    pub filter: BTreeMap<String, Value>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub include_total_count: bool,
}

impl QuerySpec {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(member.into(), value.into());
        self
    }

    pub fn with_paging(mut self, skip: u64, take: u64) -> Self {
        self.skip = Some(skip);
        self.take = Some(take);
        self
    }

    pub fn with_total_count(mut self) -> Self {
        self.include_total_count = true;
        self
    }

    /// True when `values` satisfies every filter
    pub fn matches(&self, values: &Values) -> bool {
        self.filter
            .iter()
            .all(|(member, expected)| values.get(member) == Some(expected))
    }
}

/// Entity of another type returned alongside a query's results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedEntity {
    pub entity_type: String,
    pub values: Values,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub entities: Vec<Values>,
    pub included: Vec<IncludedEntity>,
    pub total_count: Option<u64>,
}

/// Failure reported by a remote executor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote operation was cancelled")]
    Cancelled,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl From<RemoteError> for GraphSyncError {
    fn from(err: RemoteError) -> Self {
        GraphSyncError::Remote {
            message: err.to_string(),
        }
    }
}

/// Validation failure reported by the server for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerValidationError {
    pub message: String,
    pub member_names: Vec<String>,
}

impl From<ServerValidationError> for ValidationViolation {
    fn from(err: ServerValidationError) -> Self {
        ValidationViolation {
            message: err.message,
            member_names: err.member_names,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOutcome {
    /// Persisted; `values` carries server-generated member values, if any
    Success { values: Option<Values> },
    ValidationFailed(Vec<ServerValidationError>),
    Conflict(EntityConflict),
}

/// Server answer for one submitted entry, echoing its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetResultEntry {
    pub id: u32,
    pub outcome: EntryOutcome,
}

impl ChangeSetResultEntry {
    pub fn success(id: u32) -> Self {
        Self {
            id,
            outcome: EntryOutcome::Success { values: None },
        }
    }

    pub fn success_with(id: u32, values: Values) -> Self {
        Self {
            id,
            outcome: EntryOutcome::Success {
                values: Some(values),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.outcome, EntryOutcome::Success { .. })
    }
}

/// Executes queries and submits against the data service
///
/// Implementations own cancellation; a cancelled call reports
/// [`RemoteError::Cancelled`].
pub trait RemoteExecutor {
    /// # Errors
    ///
    /// Returns a `RemoteError` when the query cannot be completed.
    fn query(&self, spec: &QuerySpec) -> Result<QueryResult, RemoteError>;

    /// # Errors
    ///
    /// Returns a `RemoteError` when the submit cannot be completed. Entry
    /// level failures are reported in the result entries instead.
    fn submit(&self, entries: &[ChangeSetEntry]) -> Result<Vec<ChangeSetResultEntry>, RemoteError>;
}
