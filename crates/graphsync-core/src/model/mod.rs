pub mod handle;
pub mod notification;
pub mod state;
pub mod value;

pub use handle::{ContainerId, EntityHandle};
pub use notification::{CollectionChangeAction, Notification};
pub use state::{EntityAction, EntityState, LoadBehavior};
pub use value::{Identity, Value, Values};
