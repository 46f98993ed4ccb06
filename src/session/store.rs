use crate::core::{DbError, EntityId, Record, Result};
use std::collections::{BTreeMap, HashMap};

/// Committed entity records, one table per class, keyed by surrogate id.
#[derive(Debug, Default)]
pub struct EntityStore {
    tables: HashMap<String, BTreeMap<EntityId, Record>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: &str, id: EntityId, record: Record) -> Result<()> {
        let table = self.tables.entry(class.to_string()).or_default();
        if table.contains_key(&id) {
            return Err(DbError::ConstraintViolation(format!(
                "Entity {}#{} already stored",
                class, id
            )));
        }
        table.insert(id, record);
        Ok(())
    }

    pub fn update(&mut self, class: &str, id: EntityId, record: Record) -> Result<()> {
        match self.tables.get_mut(class).and_then(|t| t.get_mut(&id)) {
            Some(stored) => {
                *stored = record;
                Ok(())
            }
            None => Err(DbError::ExecutionError(format!(
                "Entity {}#{} is not stored",
                class, id
            ))),
        }
    }

    pub fn remove(&mut self, class: &str, id: EntityId) -> bool {
        self.tables
            .get_mut(class)
            .map(|t| t.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn get(&self, class: &str, id: EntityId) -> Option<&Record> {
        self.tables.get(class).and_then(|t| t.get(&id))
    }

    pub fn contains(&self, class: &str, id: EntityId) -> bool {
        self.get(class, id).is_some()
    }

    pub fn count(&self, class: &str) -> usize {
        self.tables.get(class).map(|t| t.len()).unwrap_or(0)
    }

    pub fn ids(&self, class: &str) -> Vec<EntityId> {
        self.tables
            .get(class)
            .map(|t| t.keys().copied().collect())
            .unwrap_or_default()
    }
}
