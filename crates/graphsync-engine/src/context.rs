//! Domain context: one container plus the submit/load orchestration state

use std::sync::Arc;

use graphsync_core::{EntityContainer, Result, SchemaRegistry};
use graphsync_core_types::RequestId;

use crate::config::ContextConfig;

/// Unit of work over one entity container
///
/// At most one submit is in flight at a time; see
/// [`DomainContext::begin_submit`].
#[derive(Debug)]
pub struct DomainContext {
    pub(crate) container: EntityContainer,
    pub(crate) config: ContextConfig,
    pub(crate) in_flight: Option<RequestId>,
}

impl DomainContext {
    pub fn new(schema: Arc<SchemaRegistry>, config: ContextConfig) -> Self {
        Self::with_container(EntityContainer::new(schema), config)
    }

    /// Wrap a container that was already configured (validator, set
    /// operations)
    pub fn with_container(container: EntityContainer, config: ContextConfig) -> Self {
        Self {
            container,
            config,
            in_flight: None,
        }
    }

    pub fn container(&self) -> &EntityContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut EntityContainer {
        &mut self.container
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn has_changes(&self) -> bool {
        self.container.has_changes()
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Discard every pending change
    ///
    /// # Errors
    ///
    /// Returns `SubmitInProgress` while a submit is in flight.
    pub fn reject_changes(&mut self) -> Result<()> {
        if self.is_submitting() {
            return Err(graphsync_core::GraphSyncError::SubmitInProgress);
        }
        self.container.reject_changes()
    }
}
