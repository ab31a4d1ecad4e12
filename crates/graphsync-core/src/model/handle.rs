use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_CONTAINER_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one `EntityContainer` instance for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(u32);

impl ContainerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Arena handle for an entity owned by a container
///
/// A handle is not the entity's identity: New entities have a handle long
/// before the server assigns their key. The container id is part of the
/// handle so that passing an entity from one container into another is
/// detected instead of silently aliasing a different slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle {
    container: ContainerId,
    index: u64,
}

impl EntityHandle {
    pub(crate) fn new(container: ContainerId, index: u64) -> Self {
        Self { container, index }
    }

    pub fn container(self) -> ContainerId {
        self.container
    }

    pub fn index(self) -> u64 {
        self.index
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}#{}", self.container.0, self.index)
    }
}
