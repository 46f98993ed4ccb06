//! Recommended API entrypoints.
//!
//! Most applications need the entity manager, the metadata builders and
//! the blameable listener wiring; `advanced` exposes the unit-of-work
//! internals for custom subscribers.

pub use crate::{
    Blameable, BlameableDriver, BlameableListener, BlameableOptions, ClassMetadata, DataType,
    DbError, EntityId, EntityManager, EntityRef, FieldMapping, Result, SecurityContext, Value,
};

pub mod advanced {
    //! Escape hatch for flush-time internals used by custom subscribers.
    pub use crate::{
        ChangeSet, ClassConfiguration, ConfigCache, ConfigFileCache, EntityState, EntityStore,
        EventSubscriber, FieldChange, FlushEvent, LifecycleEvent, MetadataRegistry, UnitOfWork,
    };
}
