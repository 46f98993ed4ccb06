use crate::core::{DbError, EntityId, Record, Result, Value};
use crate::metadata::{ClassMetadata, MetadataRegistry};
use std::collections::{BTreeMap, HashMap};

/// One entry of a change set: the value before and after.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Per-entity mapping of field name to (old, new) pair for one flush
/// cycle.
pub type ChangeSet = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Managed, never flushed; scheduled for insertion.
    New,
    /// Managed and stored; scheduled for update when dirty.
    Managed,
    /// Scheduled for deletion on the next flush.
    Removed,
    /// No longer managed. The record stays readable.
    Detached,
}

#[derive(Debug, Clone)]
pub struct ManagedEntity {
    pub class: String,
    pub record: Record,
    /// Snapshot of the record as of the last flush. `None` until first
    /// flushed.
    pub original: Option<Record>,
    pub state: EntityState,
}

/// Tracks managed entity instances and the pending work of one flush
/// cycle: scheduled insertions/updates/deletions, computed change sets
/// and out-of-band field updates registered by listeners.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    entities: BTreeMap<EntityId, ManagedEntity>,
    next_id: u64,
    change_sets: HashMap<EntityId, ChangeSet>,
    extra_updates: HashMap<EntityId, ChangeSet>,
    insertions: Vec<EntityId>,
    updates: Vec<EntityId>,
    deletions: Vec<EntityId>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn manage_new(&mut self, class: &str, record: Record) -> EntityId {
        self.next_id += 1;
        let id = EntityId(self.next_id);
        self.entities.insert(
            id,
            ManagedEntity {
                class: class.to_string(),
                record,
                original: None,
                state: EntityState::New,
            },
        );
        id
    }

    pub fn entity(&self, id: EntityId) -> Result<&ManagedEntity> {
        self.entities
            .get(&id)
            .ok_or_else(|| DbError::ExecutionError(format!("Entity {} is not managed", id)))
    }

    pub fn get(&self, id: EntityId) -> Option<&ManagedEntity> {
        self.entities.get(&id)
    }

    fn entity_mut(&mut self, id: EntityId) -> Result<&mut ManagedEntity> {
        self.entities
            .get_mut(&id)
            .ok_or_else(|| DbError::ExecutionError(format!("Entity {} is not managed", id)))
    }

    pub fn get_value(&self, registry: &MetadataRegistry, id: EntityId, field: &str) -> Result<Value> {
        let entity = self.entity(id)?;
        let meta = registry.metadata(&entity.class)?;
        let idx = meta.field_index(field)?;
        Ok(entity.record[idx].clone())
    }

    pub fn set_value(
        &mut self,
        registry: &MetadataRegistry,
        id: EntityId,
        field: &str,
        value: Value,
    ) -> Result<()> {
        let meta = registry.metadata(&self.entity(id)?.class)?;
        meta.mapping(field)?.validate(&value)?;
        let idx = meta.field_index(field)?;

        let entity = self.entity_mut(id)?;
        if entity.state == EntityState::Detached {
            return Err(DbError::ExecutionError(format!(
                "Entity {} is detached and can no longer be modified",
                id
            )));
        }
        entity.record[idx] = value;
        Ok(())
    }

    pub(crate) fn schedule_removal(&mut self, id: EntityId) -> Result<()> {
        let entity = self.entity_mut(id)?;
        entity.state = match entity.state {
            // Removing a never-flushed entity just detaches it.
            EntityState::New => EntityState::Detached,
            EntityState::Managed | EntityState::Removed => EntityState::Removed,
            EntityState::Detached => {
                return Err(DbError::ExecutionError(format!(
                    "Entity {} is detached and cannot be removed",
                    id
                )));
            }
        };
        Ok(())
    }

    pub fn is_scheduled_for_insert(&self, id: EntityId) -> bool {
        matches!(
            self.entities.get(&id),
            Some(e) if e.state == EntityState::New
        )
    }

    pub fn is_scheduled_for_delete(&self, id: EntityId) -> bool {
        matches!(
            self.entities.get(&id),
            Some(e) if e.state == EntityState::Removed
        )
    }

    pub fn scheduled_insertions(&self) -> &[EntityId] {
        &self.insertions
    }

    pub fn scheduled_updates(&self) -> &[EntityId] {
        &self.updates
    }

    pub fn scheduled_deletions(&self) -> &[EntityId] {
        &self.deletions
    }

    /// All scheduled entities of the current flush: insertions, then
    /// updates, then deletions.
    pub fn scheduled_entities(&self) -> Vec<EntityId> {
        let mut all =
            Vec::with_capacity(self.insertions.len() + self.updates.len() + self.deletions.len());
        all.extend_from_slice(&self.insertions);
        all.extend_from_slice(&self.updates);
        all.extend_from_slice(&self.deletions);
        all
    }

    pub fn change_set(&self, id: EntityId) -> Option<&ChangeSet> {
        self.change_sets.get(&id)
    }

    pub fn extra_update(&self, id: EntityId) -> Option<&ChangeSet> {
        self.extra_updates.get(&id)
    }

    /// Register a field mutation performed after change sets were
    /// computed, so the in-flight change set reflects it.
    pub fn property_changed(&mut self, id: EntityId, field: &str, old: Value, new: Value) {
        self.change_sets
            .entry(id)
            .or_default()
            .insert(field.to_string(), FieldChange { old, new });
    }

    /// Schedule an out-of-band field update to be applied in the same
    /// flush.
    pub fn schedule_extra_update(&mut self, id: EntityId, field: &str, old: Value, new: Value) {
        self.extra_updates
            .entry(id)
            .or_default()
            .insert(field.to_string(), FieldChange { old, new });
    }

    /// Compute the scheduled-entity sets and change sets for this flush.
    ///
    /// Insertions get a change set covering every stored field with a
    /// `Null` old value; updates get the diff of the original snapshot
    /// against the current record; deletions get none.
    pub(crate) fn compute_change_sets(&mut self, registry: &MetadataRegistry) -> Result<()> {
        self.insertions.clear();
        self.updates.clear();
        self.deletions.clear();
        self.change_sets.clear();

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            let entity = &self.entities[&id];
            match entity.state {
                EntityState::New => {
                    let meta = registry.metadata(&entity.class)?;
                    let change_set = insert_change_set(meta, &entity.record);
                    self.insertions.push(id);
                    self.change_sets.insert(id, change_set);
                }
                EntityState::Managed => {
                    let meta = registry.metadata(&entity.class)?;
                    let original = entity.original.as_ref().ok_or_else(|| {
                        DbError::ExecutionError(format!(
                            "Managed entity {} has no original snapshot",
                            id
                        ))
                    })?;
                    let change_set = diff_records(meta, original, &entity.record);
                    if !change_set.is_empty() {
                        self.updates.push(id);
                        self.change_sets.insert(id, change_set);
                    }
                }
                EntityState::Removed => {
                    self.deletions.push(id);
                }
                EntityState::Detached => {}
            }
        }
        Ok(())
    }

    /// Recompute one entity's change set after listeners mutated it, so
    /// downstream listeners see a consistent view. Schedules are left
    /// untouched.
    pub fn recompute_change_set(&mut self, registry: &MetadataRegistry, id: EntityId) -> Result<()> {
        let entity = self.entity(id)?;
        let meta = registry.metadata(&entity.class)?;

        let change_set = match entity.state {
            EntityState::New => insert_change_set(meta, &entity.record),
            EntityState::Managed => match entity.original.as_ref() {
                Some(original) => diff_records(meta, original, &entity.record),
                None => ChangeSet::new(),
            },
            EntityState::Removed | EntityState::Detached => return Ok(()),
        };

        self.change_sets.insert(id, change_set);
        Ok(())
    }

    /// Transition states and clear per-flush bookkeeping once the store
    /// has been written.
    pub(crate) fn commit_flush(&mut self) {
        let mut flushed: Vec<EntityId> = Vec::new();
        flushed.extend_from_slice(&self.insertions);
        flushed.extend_from_slice(&self.updates);

        for id in flushed {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.original = Some(entity.record.clone());
                entity.state = EntityState::Managed;
            }
        }
        for id in std::mem::take(&mut self.deletions) {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.state = EntityState::Detached;
            }
        }

        self.insertions.clear();
        self.updates.clear();
        self.change_sets.clear();
        self.extra_updates.clear();
    }

    pub fn managed_count(&self) -> usize {
        self.entities.len()
    }
}

fn insert_change_set(meta: &ClassMetadata, record: &Record) -> ChangeSet {
    let mut change_set = ChangeSet::new();
    for slot in meta.layout() {
        if let Some(idx) = slot.slot {
            change_set.insert(
                slot.mapping.name.clone(),
                FieldChange {
                    old: Value::Null,
                    new: record[idx].clone(),
                },
            );
        }
    }
    change_set
}

fn diff_records(meta: &ClassMetadata, original: &Record, current: &Record) -> ChangeSet {
    let mut change_set = ChangeSet::new();
    for slot in meta.layout() {
        if let Some(idx) = slot.slot {
            if original[idx] != current[idx] {
                change_set.insert(
                    slot.mapping.name.clone(),
                    FieldChange {
                        old: original[idx].clone(),
                        new: current[idx].clone(),
                    },
                );
            }
        }
    }
    change_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ClassMetadata, FieldMapping};

    fn registry() -> MetadataRegistry {
        let mut registry = MetadataRegistry::new();
        registry
            .insert(
                ClassMetadata::new("ArticleEntity")
                    .field(FieldMapping::text("title"))
                    .field(FieldMapping::text("updated_by")),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_insert_change_set_covers_all_fields() {
        let registry = registry();
        let mut uow = UnitOfWork::new();
        let id = uow.manage_new("ArticleEntity", vec![Value::Text("a".into()), Value::Null]);

        uow.compute_change_sets(&registry).unwrap();

        assert_eq!(uow.scheduled_insertions(), &[id]);
        let change_set = uow.change_set(id).unwrap();
        assert_eq!(change_set.len(), 2);
        assert_eq!(change_set["title"].new, Value::Text("a".into()));
        assert_eq!(change_set["updated_by"].new, Value::Null);
    }

    #[test]
    fn test_update_change_set_is_a_diff() {
        let registry = registry();
        let mut uow = UnitOfWork::new();
        let id = uow.manage_new("ArticleEntity", vec![Value::Text("a".into()), Value::Null]);
        uow.compute_change_sets(&registry).unwrap();
        uow.commit_flush();

        uow.set_value(&registry, id, "title", Value::Text("b".into()))
            .unwrap();
        uow.compute_change_sets(&registry).unwrap();

        assert_eq!(uow.scheduled_updates(), &[id]);
        let change_set = uow.change_set(id).unwrap();
        assert_eq!(change_set.len(), 1);
        assert_eq!(change_set["title"].old, Value::Text("a".into()));
        assert_eq!(change_set["title"].new, Value::Text("b".into()));
    }

    #[test]
    fn test_clean_entity_is_not_scheduled() {
        let registry = registry();
        let mut uow = UnitOfWork::new();
        uow.manage_new("ArticleEntity", vec![Value::Null, Value::Null]);
        uow.compute_change_sets(&registry).unwrap();
        uow.commit_flush();

        uow.compute_change_sets(&registry).unwrap();
        assert!(uow.scheduled_entities().is_empty());
    }

    #[test]
    fn test_removal_scheduling() {
        let registry = registry();
        let mut uow = UnitOfWork::new();
        let id = uow.manage_new("ArticleEntity", vec![Value::Null, Value::Null]);
        uow.compute_change_sets(&registry).unwrap();
        uow.commit_flush();

        uow.schedule_removal(id).unwrap();
        assert!(uow.is_scheduled_for_delete(id));
        uow.compute_change_sets(&registry).unwrap();
        assert_eq!(uow.scheduled_deletions(), &[id]);
        assert!(uow.change_set(id).is_none());
    }

    #[test]
    fn test_recompute_after_listener_write() {
        let registry = registry();
        let mut uow = UnitOfWork::new();
        let id = uow.manage_new("ArticleEntity", vec![Value::Text("a".into()), Value::Null]);
        uow.compute_change_sets(&registry).unwrap();
        uow.commit_flush();

        uow.set_value(&registry, id, "title", Value::Text("b".into()))
            .unwrap();
        uow.compute_change_sets(&registry).unwrap();

        uow.set_value(&registry, id, "updated_by", Value::Text("admin".into()))
            .unwrap();
        uow.property_changed(id, "updated_by", Value::Null, Value::Text("admin".into()));
        uow.schedule_extra_update(id, "updated_by", Value::Null, Value::Text("admin".into()));
        uow.recompute_change_set(&registry, id).unwrap();

        let change_set = uow.change_set(id).unwrap();
        assert_eq!(change_set.len(), 2);
        assert_eq!(change_set["updated_by"].new, Value::Text("admin".into()));
        assert!(uow.extra_update(id).is_some());
    }
}
