use super::handle::EntityHandle;
use super::state::EntityState;

/// Direction of a collection membership change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChangeAction {
    Added,
    Removed,
}

/// Observable side effect queued by the container for a binding layer
///
/// The container only queues these. Delivering them to UI code is the
/// caller's concern; see `EntityContainer::drain_notifications`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    PropertyChanged {
        entity: EntityHandle,
        member: String,
    },
    StateChanged {
        entity: EntityHandle,
        from: EntityState,
        to: EntityState,
    },
    CollectionChanged {
        owner: EntityHandle,
        member: String,
        action: CollectionChangeAction,
        entity: EntityHandle,
    },
    /// Raised on the 0↔1 boundary of a set's dirty index (`set` is `Some`)
    /// or of the container's dirty-set count (`set` is `None`)
    HasChangesChanged {
        set: Option<String>,
        has_changes: bool,
    },
}
