mod events;
mod manager;
mod store;
mod uow;

pub use events::{EventSubscriber, FlushEvent, LifecycleEvent};
pub use manager::EntityManager;
pub use store::EntityStore;
pub use uow::{ChangeSet, EntityState, FieldChange, ManagedEntity, UnitOfWork};
