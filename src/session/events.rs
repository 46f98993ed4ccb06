use super::store::EntityStore;
use super::uow::UnitOfWork;
use crate::core::{EntityId, Result};
use crate::metadata::{ClassMetadata, MetadataRegistry};

/// Event arguments for the flush-level hook. Subscribers may read and
/// rewrite the unit of work's bookkeeping.
pub struct FlushEvent<'a> {
    pub uow: &'a mut UnitOfWork,
    pub registry: &'a MetadataRegistry,
    pub store: &'a EntityStore,
}

/// Event arguments for per-entity-instance lifecycle hooks.
pub struct LifecycleEvent<'a> {
    pub entity: EntityId,
    pub uow: &'a mut UnitOfWork,
    pub registry: &'a MetadataRegistry,
    pub store: &'a EntityStore,
}

/// Lifecycle entry points invoked by the entity manager.
///
/// All hooks are defaulted to no-ops so subscribers implement only what
/// they subscribe to. `load_class_metadata` runs at class registration,
/// before the metadata is frozen, and may still mutate it.
pub trait EventSubscriber: Send + Sync {
    fn load_class_metadata(
        &self,
        _meta: &mut ClassMetadata,
        _registry: &MetadataRegistry,
    ) -> Result<()> {
        Ok(())
    }

    /// Invoked once per flush, after change sets were computed and
    /// before they are applied.
    fn on_flush(&self, _event: &mut FlushEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// Invoked when an entity becomes managed, before any change set
    /// exists for it.
    fn pre_persist(&self, _event: &mut LifecycleEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// Invoked during flush for every entity scheduled for update.
    fn pre_update(&self, _event: &mut LifecycleEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// Invoked when an entity is scheduled for removal.
    fn pre_remove(&self, _event: &mut LifecycleEvent<'_>) -> Result<()> {
        Ok(())
    }
}
