use super::events::{EventSubscriber, FlushEvent, LifecycleEvent};
use super::store::EntityStore;
use super::uow::{EntityState, UnitOfWork};
use crate::core::{DbError, EntityId, EntityRef, Record, Result, Value};
use crate::metadata::{ClassMetadata, MetadataRegistry};
use std::sync::Arc;

/// Facade owning the metadata registry, the committed store, the unit of
/// work and the registered event subscribers.
///
/// # Examples
///
/// ```
/// use blamedb::{ClassMetadata, EntityManager, FieldMapping, Value};
///
/// # fn main() -> blamedb::Result<()> {
/// let mut em = EntityManager::new();
/// em.register_class(ClassMetadata::new("ArticleEntity").field(FieldMapping::text("title")))?;
///
/// let article = em.create("ArticleEntity", &[("title", Value::from("first"))])?;
/// em.flush()?;
///
/// assert_eq!(em.get(article, "title")?, Value::from("first"));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct EntityManager {
    registry: MetadataRegistry,
    store: EntityStore,
    uow: UnitOfWork,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event subscriber. Subscribers must be registered
    /// before the classes whose metadata they want to observe.
    pub fn subscribe(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Register an entity class: run every subscriber's metadata-load
    /// hook (which may still mutate the metadata), then freeze it.
    pub fn register_class(&mut self, mut meta: ClassMetadata) -> Result<()> {
        for subscriber in &self.subscribers {
            subscriber.load_class_metadata(&mut meta, &self.registry)?;
        }
        self.registry.insert(meta)
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// Create and manage a new entity instance. Fields not listed start
    /// as `Null`. Fires `pre_persist` hooks.
    pub fn create(&mut self, class: &str, fields: &[(&str, Value)]) -> Result<EntityId> {
        let record = {
            let meta = self.registry.metadata(class)?;
            if meta.is_mapped_superclass() {
                return Err(DbError::InvalidArgument(format!(
                    "Cannot instantiate mapped superclass '{}'",
                    class
                )));
            }

            let mut record: Record = vec![Value::Null; meta.stored_len()];
            for (field, value) in fields {
                meta.mapping(field)?.validate(value)?;
                record[meta.field_index(field)?] = value.clone();
            }
            record
        };

        let id = self.uow.manage_new(class, record);
        self.dispatch_lifecycle(id, |subscriber, event| subscriber.pre_persist(event))?;
        Ok(id)
    }

    /// Create an entity from a JSON object of field values.
    pub fn create_from_json(&mut self, class: &str, json: &serde_json::Value) -> Result<EntityId> {
        let object = json.as_object().ok_or_else(|| {
            DbError::InvalidArgument("Entity JSON must be an object of field values".into())
        })?;

        let mut fields = Vec::with_capacity(object.len());
        for (name, value) in object {
            fields.push((name.clone(), Value::from_json(value)?));
        }
        let borrowed: Vec<(&str, Value)> =
            fields.iter().map(|(n, v)| (n.as_str(), v.clone())).collect();
        self.create(class, &borrowed)
    }

    pub fn get(&self, id: EntityId, field: &str) -> Result<Value> {
        self.uow.get_value(&self.registry, id, field)
    }

    pub fn set(&mut self, id: EntityId, field: &str, value: impl Into<Value>) -> Result<()> {
        self.uow.set_value(&self.registry, id, field, value.into())
    }

    /// Reference to a managed entity, usable as an association value.
    pub fn entity_ref(&self, id: EntityId) -> Result<EntityRef> {
        Ok(EntityRef::new(self.uow.entity(id)?.class.clone(), id))
    }

    pub fn state(&self, id: EntityId) -> Result<EntityState> {
        Ok(self.uow.entity(id)?.state)
    }

    /// Schedule an entity for deletion. Fires `pre_remove` hooks.
    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        self.uow.schedule_removal(id)?;
        if self.uow.is_scheduled_for_delete(id) {
            self.dispatch_lifecycle(id, |subscriber, event| subscriber.pre_remove(event))?;
        }
        Ok(())
    }

    /// Committed record lookup, bypassing the unit of work.
    pub fn find(&self, class: &str, id: EntityId) -> Option<&Record> {
        self.store.get(class, id)
    }

    /// Compute and apply all pending changes.
    ///
    /// Order: change-set computation, `on_flush` subscribers,
    /// `pre_update` hooks per scheduled update, store application,
    /// state promotion.
    pub fn flush(&mut self) -> Result<()> {
        self.uow.compute_change_sets(&self.registry)?;

        let subscribers = self.subscribers.clone();
        {
            let mut event = FlushEvent {
                uow: &mut self.uow,
                registry: &self.registry,
                store: &self.store,
            };
            for subscriber in &subscribers {
                subscriber.on_flush(&mut event)?;
            }
        }

        for id in self.uow.scheduled_updates().to_vec() {
            let mut event = LifecycleEvent {
                entity: id,
                uow: &mut self.uow,
                registry: &self.registry,
                store: &self.store,
            };
            for subscriber in &subscribers {
                subscriber.pre_update(&mut event)?;
            }
        }

        let insertions = self.uow.scheduled_insertions().to_vec();
        let updates = self.uow.scheduled_updates().to_vec();
        let deletions = self.uow.scheduled_deletions().to_vec();

        for id in &insertions {
            let entity = self.uow.entity(*id)?;
            let meta = self.registry.metadata(&entity.class)?;
            validate_record(meta, &entity.record)?;
            self.store.insert(&entity.class, *id, entity.record.clone())?;
        }
        for id in &updates {
            let entity = self.uow.entity(*id)?;
            let meta = self.registry.metadata(&entity.class)?;
            validate_record(meta, &entity.record)?;
            self.store.update(&entity.class, *id, entity.record.clone())?;
        }
        for id in &deletions {
            let entity = self.uow.entity(*id)?;
            // Out-of-band updates on a removed entity hit the store
            // before the row goes away.
            if let Some(extra) = self.uow.extra_update(*id) {
                log::debug!(
                    "flush: applying {} extra update(s) to removed entity {}#{}",
                    extra.len(),
                    entity.class,
                    id
                );
                self.store.update(&entity.class, *id, entity.record.clone())?;
            }
            self.store.remove(&entity.class, *id);
        }

        log::debug!(
            "flush: {} insertion(s), {} update(s), {} deletion(s)",
            insertions.len(),
            updates.len(),
            deletions.len()
        );

        self.uow.commit_flush();
        Ok(())
    }

    fn dispatch_lifecycle<F>(&mut self, id: EntityId, hook: F) -> Result<()>
    where
        F: Fn(&Arc<dyn EventSubscriber>, &mut LifecycleEvent<'_>) -> Result<()>,
    {
        let subscribers = self.subscribers.clone();
        let mut event = LifecycleEvent {
            entity: id,
            uow: &mut self.uow,
            registry: &self.registry,
            store: &self.store,
        };
        for subscriber in &subscribers {
            hook(subscriber, &mut event)?;
        }
        Ok(())
    }
}

fn validate_record(meta: &ClassMetadata, record: &Record) -> Result<()> {
    for slot in meta.layout() {
        if let Some(idx) = slot.slot {
            if record[idx].is_null() && !slot.mapping.is_nullable() {
                return Err(DbError::ConstraintViolation(format!(
                    "Field '{}' of class '{}' cannot be NULL",
                    slot.mapping.name,
                    meta.name()
                )));
            }
            slot.mapping.validate(&record[idx])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldMapping;

    fn manager() -> EntityManager {
        let mut em = EntityManager::new();
        em.register_class(
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("title").not_null())
                .field(FieldMapping::text("updated_by")),
        )
        .unwrap();
        em
    }

    #[test]
    fn test_create_and_flush() {
        let mut em = manager();
        let id = em
            .create("ArticleEntity", &[("title", Value::from("first"))])
            .unwrap();
        em.flush().unwrap();

        assert_eq!(em.state(id).unwrap(), EntityState::Managed);
        assert_eq!(em.store().count("ArticleEntity"), 1);
        assert_eq!(
            em.find("ArticleEntity", id).unwrap()[0],
            Value::from("first")
        );
    }

    #[test]
    fn test_not_null_constraint() {
        let mut em = manager();
        em.create("ArticleEntity", &[]).unwrap();
        assert!(matches!(
            em.flush(),
            Err(DbError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_update_round_trip() {
        let mut em = manager();
        let id = em
            .create("ArticleEntity", &[("title", Value::from("first"))])
            .unwrap();
        em.flush().unwrap();

        em.set(id, "title", "second").unwrap();
        em.flush().unwrap();

        assert_eq!(
            em.find("ArticleEntity", id).unwrap()[0],
            Value::from("second")
        );
    }

    #[test]
    fn test_remove_detaches_and_deletes() {
        let mut em = manager();
        let id = em
            .create("ArticleEntity", &[("title", Value::from("first"))])
            .unwrap();
        em.flush().unwrap();

        em.remove(id).unwrap();
        em.flush().unwrap();

        assert_eq!(em.state(id).unwrap(), EntityState::Detached);
        assert_eq!(em.store().count("ArticleEntity"), 0);
        // Detached records stay readable.
        assert_eq!(em.get(id, "title").unwrap(), Value::from("first"));
        assert!(em.set(id, "title", "x").is_err());
    }

    #[test]
    fn test_create_from_json() {
        let mut em = manager();
        let id = em
            .create_from_json("ArticleEntity", &serde_json::json!({"title": "from json"}))
            .unwrap();
        em.flush().unwrap();
        assert_eq!(em.get(id, "title").unwrap(), Value::from("from json"));
    }
}
