//! Context configuration

use graphsync_core::{GraphSyncError, LoadBehavior, Result};
use serde::{Deserialize, Serialize};

/// Settings a `DomainContext` applies to submits and loads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// How server values returned by a successful submit are merged
    pub submit_load_behavior: LoadBehavior,
    /// Default for `load` when the caller does not pass a behavior
    pub query_load_behavior: LoadBehavior,
    /// Run whole-entity validation over the changes before building
    pub validate_before_submit: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            submit_load_behavior: LoadBehavior::RefreshCurrent,
            query_load_behavior: LoadBehavior::KeepCurrent,
            validate_before_submit: true,
        }
    }
}

impl ContextConfig {
    /// Parse a JSON document; absent fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed JSON or unknown enum values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(GraphSyncError::from)
    }
}
