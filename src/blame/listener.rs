use super::actor::{ActorProvider, ActorResolver};
use super::driver::BlameableDriver;
use crate::core::{DbError, EntityId, FieldPath, Result, Value};
use crate::metadata::{ClassMetadata, MetadataRegistry};
use crate::session::{EntityStore, EventSubscriber, FlushEvent, LifecycleEvent, UnitOfWork};
use std::sync::Arc;

/// Event subscriber auto-populating blame fields with the current actor.
///
/// On every flush the listener walks the scheduled entities, consults
/// the driver's cached class configuration and the entity's pending
/// change set, and overwrites untouched blame fields. Per-entity
/// lifecycle hooks cover fields on first persist, before any change set
/// exists.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use blamedb::{
///     Blameable, BlameableDriver, BlameableListener, BlameableOptions, ClassMetadata,
///     ConfigCache, EntityManager, FieldMapping, Value,
/// };
///
/// # fn main() -> blamedb::Result<()> {
/// let driver = Arc::new(BlameableDriver::with_cache(
///     BlameableOptions::new(),
///     ConfigCache::new(),
/// ));
/// let listener = Arc::new(BlameableListener::new(driver));
/// listener.set_actor("admin")?;
///
/// let mut em = EntityManager::new();
/// em.subscribe(listener.clone());
/// em.register_class(
///     ClassMetadata::new("ArticleEntity")
///         .field(FieldMapping::text("title"))
///         .blameable("created_by", Blameable::on_create()),
/// )?;
///
/// let article = em.create("ArticleEntity", &[("title", Value::from("first"))])?;
/// em.flush()?;
///
/// assert_eq!(em.get(article, "created_by")?, Value::from("admin"));
/// # Ok(())
/// # }
/// ```
pub struct BlameableListener {
    driver: Arc<BlameableDriver>,
    actor: ActorProvider,
}

impl BlameableListener {
    pub fn new(driver: Arc<BlameableDriver>) -> Self {
        Self {
            driver,
            actor: ActorProvider::new(),
        }
    }

    pub fn driver(&self) -> &BlameableDriver {
        &self.driver
    }

    /// Set an explicit representation of the current actor.
    pub fn set_actor(&self, actor: impl Into<Value>) -> Result<()> {
        self.actor.set_actor(actor)
    }

    /// Drop the explicit actor so the resolver applies again.
    pub fn reset_actor(&self) -> Result<()> {
        self.actor.reset_actor()
    }

    /// Register how the current actor is determined when none was set
    /// explicitly.
    pub fn set_actor_resolver(&self, resolver: ActorResolver) -> Result<()> {
        self.actor.set_resolver(resolver)
    }

    /// Current actor: the explicit value, or the resolver's result, or
    /// `Null`.
    pub fn actor(&self) -> Result<Value> {
        self.actor.actor()
    }

    fn process_scheduled(&self, event: &mut FlushEvent<'_>, id: EntityId) -> Result<()> {
        let class = event.uow.entity(id)?.class.clone();
        let config = self.driver.configuration(event.registry, &class)?;
        if config.is_empty() {
            return Ok(());
        }

        // The change set is inspected as computed at flush start; writes
        // below go through the unit of work and are folded in by the
        // final recompute.
        let change_set = event.uow.change_set(id).cloned().unwrap_or_default();
        let inserting = event.uow.is_scheduled_for_insert(id);
        let deleting = event.uow.is_scheduled_for_delete(id);
        let mut need_changes = false;

        if inserting {
            for field in &config.create {
                let manual = matches!(change_set.get(field), Some(c) if !c.new.is_null());
                if !manual {
                    need_changes = true;
                    self.update_field(event.registry, event.uow, event.store, id, &class, field)?;
                }
            }
        }

        for field in &config.update {
            let insert_and_null =
                inserting && matches!(change_set.get(field), Some(c) if c.new.is_null());
            if !change_set.contains_key(field) || insert_and_null {
                need_changes = true;
                self.update_field(event.registry, event.uow, event.store, id, &class, field)?;
            }
        }

        for field in &config.delete {
            let delete_and_null =
                deleting && matches!(change_set.get(field), Some(c) if c.new.is_null());
            if !change_set.contains_key(field) || delete_and_null {
                need_changes = true;
                self.update_field(event.registry, event.uow, event.store, id, &class, field)?;
            }
        }

        // Change rules presuppose an old-to-new transition; they only
        // apply to update-scheduled entities. Insertions would otherwise
        // dereference their still-null associations, and deletions carry
        // no change set.
        if !inserting && !deleting {
            for rule in &config.change {
                if change_set.contains_key(&rule.field) {
                    continue; // Value was set manually
                }

                for tracked in &rule.tracked {
                    let path = FieldPath::parse(tracked)?;
                    let Some(change) = change_set.get(&path.field) else {
                        continue;
                    };

                    let value = match &path.child {
                        Some(child) => self.tracked_child_value(
                            event.registry,
                            event.uow,
                            event.store,
                            &class,
                            &rule.field,
                            &change.new,
                            child,
                        )?,
                        None => change.new.clone(),
                    };

                    let triggers = match &rule.expected {
                        Some(expected) => expected.contains(&value),
                        None => true,
                    };
                    if triggers {
                        need_changes = true;
                        self.update_field(
                            event.registry,
                            event.uow,
                            event.store,
                            id,
                            &class,
                            &rule.field,
                        )?;
                    }
                }
            }
        }

        if need_changes {
            event.uow.recompute_change_set(event.registry, id)?;
        }
        Ok(())
    }

    /// New value of a dotted tracked path: dereference the changed
    /// reference and read the child field off the related record.
    #[allow(clippy::too_many_arguments)]
    fn tracked_child_value(
        &self,
        registry: &MetadataRegistry,
        uow: &UnitOfWork,
        store: &EntityStore,
        class: &str,
        target_field: &str,
        new_value: &Value,
        child: &str,
    ) -> Result<Value> {
        let Value::Ref(reference) = new_value else {
            return Err(DbError::UnexpectedValue(format!(
                "Tracked field of '{}' is expected to reference an entity in class '{}'",
                target_field, class
            )));
        };

        let child_meta = registry.metadata(&reference.class)?;
        let idx = child_meta.field_index(child)?;
        let record = resolve_record(uow, store, &reference.class, reference.id).ok_or_else(|| {
            DbError::UnexpectedValue(format!(
                "Referenced entity {} could not be loaded",
                reference
            ))
        })?;

        Ok(record[idx].clone())
    }

    /// Write the current actor onto a blame field and register the
    /// change with the unit of work so it joins the in-flight flush.
    fn update_field(
        &self,
        registry: &MetadataRegistry,
        uow: &mut UnitOfWork,
        store: &EntityStore,
        id: EntityId,
        class: &str,
        field: &str,
    ) -> Result<()> {
        let meta = registry.metadata(class)?;
        let old = uow.get_value(registry, id, field)?;
        let new = self.actor_value(registry, uow, store, meta, field)?;

        uow.set_value(registry, id, field, new.clone())?;
        uow.property_changed(id, field, old.clone(), new.clone());
        uow.schedule_extra_update(id, field, old, new);

        log::trace!("blameable: wrote '{}.{}' on entity {}", class, field, id);
        Ok(())
    }

    /// Lifecycle-hook variant: only fields whose current value is `Null`
    /// are written, so manual values survive.
    fn update_null_fields(
        &self,
        registry: &MetadataRegistry,
        uow: &mut UnitOfWork,
        store: &EntityStore,
        id: EntityId,
        class: &str,
        fields: &[String],
    ) -> Result<()> {
        for field in fields {
            if uow.get_value(registry, id, field)?.is_null() {
                self.update_field(registry, uow, store, id, class, field)?;
            }
        }
        Ok(())
    }

    /// The value to store for a blame field: the current actor, coerced
    /// against the field's mapping.
    fn actor_value(
        &self,
        registry: &MetadataRegistry,
        uow: &UnitOfWork,
        store: &EntityStore,
        meta: &ClassMetadata,
        field: &str,
    ) -> Result<Value> {
        let actor = self.actor.actor()?;
        let mapping = meta.mapping(field)?;

        if mapping.is_single_valued_association() {
            return match actor {
                Value::Null | Value::Ref(_) => Ok(actor),
                other => Err(DbError::InvalidArgument(format!(
                    "Blame field '{}' is an association, the actor must be an entity reference, got {}",
                    field,
                    other.type_name()
                ))),
            };
        }
        if mapping.is_association() {
            return Err(DbError::InvalidMapping(format!(
                "Association '{}' is not valid, it must be a to-one relation or a string field in class '{}'",
                field,
                meta.name()
            )));
        }

        // Scalar column: an entity actor needs a string representation.
        match actor {
            Value::Ref(reference) => {
                let actor_meta = registry.metadata(&reference.class)?;
                let display = actor_meta.display_field_name().ok_or_else(|| {
                    DbError::InvalidArgument(format!(
                        "Blame field '{}' expects a string value and class '{}' declares no display field",
                        field, reference.class
                    ))
                })?;
                let idx = actor_meta.field_index(display)?;
                let record = resolve_record(uow, store, &reference.class, reference.id)
                    .ok_or_else(|| {
                        DbError::UnexpectedValue(format!(
                            "Actor entity {} could not be loaded",
                            reference
                        ))
                    })?;
                Ok(Value::Text(record[idx].to_string()))
            }
            other => Ok(other),
        }
    }
}

/// Identity map first, committed store second (the lazy-load analog).
fn resolve_record<'a>(
    uow: &'a UnitOfWork,
    store: &'a EntityStore,
    class: &str,
    id: EntityId,
) -> Option<&'a crate::core::Record> {
    if let Some(entity) = uow.get(id) {
        if entity.class == class {
            return Some(&entity.record);
        }
    }
    store.get(class, id)
}

impl EventSubscriber for BlameableListener {
    fn load_class_metadata(
        &self,
        meta: &mut ClassMetadata,
        registry: &MetadataRegistry,
    ) -> Result<()> {
        self.driver.load_class_metadata(meta, registry)
    }

    fn on_flush(&self, event: &mut FlushEvent<'_>) -> Result<()> {
        for id in event.uow.scheduled_entities() {
            self.process_scheduled(event, id)?;
        }
        Ok(())
    }

    fn pre_persist(&self, event: &mut LifecycleEvent<'_>) -> Result<()> {
        let id = event.entity;
        let class = event.uow.entity(id)?.class.clone();
        let config = self.driver.configuration(event.registry, &class)?;

        self.update_null_fields(event.registry, event.uow, event.store, id, &class, &config.update)?;
        self.update_null_fields(event.registry, event.uow, event.store, id, &class, &config.create)
    }

    fn pre_update(&self, event: &mut LifecycleEvent<'_>) -> Result<()> {
        let id = event.entity;
        let class = event.uow.entity(id)?.class.clone();
        let config = self.driver.configuration(event.registry, &class)?;

        self.update_null_fields(event.registry, event.uow, event.store, id, &class, &config.update)
    }

    fn pre_remove(&self, event: &mut LifecycleEvent<'_>) -> Result<()> {
        let id = event.entity;
        let class = event.uow.entity(id)?.class.clone();
        let config = self.driver.configuration(event.registry, &class)?;

        self.update_null_fields(event.registry, event.uow, event.store, id, &class, &config.delete)
    }
}
