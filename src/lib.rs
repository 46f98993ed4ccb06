// ============================================================================
// BlameDB Library
// ============================================================================

pub mod blame;
pub mod core;
pub mod metadata;
pub mod prelude;
pub mod session;

// Re-export main types for convenience
pub use crate::core::{DataType, DbError, EntityId, EntityRef, FieldPath, Record, Result, Value};
pub use blame::{
    ActorProvider, ActorResolver, Blameable, BlameableDriver, BlameableListener, BlameableOptions,
    ChangeRule, ClassConfiguration, ConfigCache, ConfigFileCache, ExpectedValues, SecurityContext,
    TrackedFields, TriggerPhase,
};
pub use metadata::{ClassMetadata, FieldKind, FieldMapping, LayoutSlot, MetadataRegistry};
pub use session::{
    ChangeSet, EntityManager, EntityState, EntityStore, EventSubscriber, FieldChange, FlushEvent,
    LifecycleEvent, ManagedEntity, UnitOfWork,
};
