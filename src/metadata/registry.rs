use super::class::{ClassMetadata, LayoutSlot};
use crate::core::{DbError, Result};
use std::collections::HashMap;

/// Registry of frozen class metadata.
///
/// Parents must be registered before their children; registration merges
/// the ancestor layout with the class's declared fields and freezes the
/// result. Frozen metadata never changes for the registry's lifetime.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    classes: HashMap<String, ClassMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut meta: ClassMetadata) -> Result<()> {
        let name = meta.name().to_string();

        if self.classes.contains_key(&name) {
            return Err(DbError::ClassExists(name));
        }

        let mut layout: Vec<LayoutSlot> = match meta.parent_class() {
            Some(parent) => self.metadata(parent)?.layout().to_vec(),
            None => Vec::new(),
        };

        for mapping in meta.declared_fields() {
            if layout.iter().any(|s| s.mapping.name == mapping.name) {
                return Err(DbError::InvalidMapping(format!(
                    "Field '{}' of class '{}' is already declared by an ancestor",
                    mapping.name, name
                )));
            }
            layout.push(LayoutSlot {
                mapping: mapping.clone(),
                declared_in: name.clone(),
                slot: None,
            });
        }

        let mut next_slot = 0;
        for slot in &mut layout {
            slot.slot = if slot.mapping.is_stored() {
                let idx = next_slot;
                next_slot += 1;
                Some(idx)
            } else {
                None
            };
        }

        meta.freeze(layout);
        self.classes.insert(name, meta);

        Ok(())
    }

    pub fn metadata(&self, class: &str) -> Result<&ClassMetadata> {
        self.classes
            .get(class)
            .ok_or_else(|| DbError::ClassNotFound(class.to_string()))
    }

    pub fn get(&self, class: &str) -> Option<&ClassMetadata> {
        self.classes.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Ancestor chain of a class, oldest ancestor first.
    pub fn ancestors(&self, class: &str) -> Result<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = self.metadata(class)?.parent_class().map(str::to_string);

        while let Some(parent) = current {
            let meta = self.metadata(&parent)?;
            current = meta.parent_class().map(str::to_string);
            chain.push(parent);
        }

        chain.reverse();
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FieldMapping;

    #[test]
    fn test_layout_merges_ancestor_fields_first() {
        let mut registry = MetadataRegistry::new();

        registry
            .insert(
                ClassMetadata::new("BaseEntity")
                    .mapped_superclass()
                    .field(FieldMapping::text("created_by")),
            )
            .unwrap();

        registry
            .insert(
                ClassMetadata::new("ArticleEntity")
                    .parent("BaseEntity")
                    .field(FieldMapping::text("title")),
            )
            .unwrap();

        let meta = registry.metadata("ArticleEntity").unwrap();
        assert_eq!(meta.stored_len(), 2);
        assert_eq!(meta.field_index("created_by").unwrap(), 0);
        assert_eq!(meta.field_index("title").unwrap(), 1);
        assert!(meta.is_inherited_field("created_by"));
        assert!(!meta.is_inherited_field("title"));
    }

    #[test]
    fn test_parent_must_be_registered_first() {
        let mut registry = MetadataRegistry::new();
        let result = registry.insert(ClassMetadata::new("ArticleEntity").parent("BaseEntity"));
        assert!(matches!(result, Err(DbError::ClassNotFound(_))));
    }

    #[test]
    fn test_duplicate_field_across_hierarchy_rejected() {
        let mut registry = MetadataRegistry::new();

        registry
            .insert(ClassMetadata::new("BaseEntity").field(FieldMapping::text("title")))
            .unwrap();

        let result = registry.insert(
            ClassMetadata::new("ArticleEntity")
                .parent("BaseEntity")
                .field(FieldMapping::text("title")),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));
    }

    #[test]
    fn test_ancestor_chain_oldest_first() {
        let mut registry = MetadataRegistry::new();
        registry.insert(ClassMetadata::new("A")).unwrap();
        registry
            .insert(ClassMetadata::new("B").parent("A"))
            .unwrap();
        registry
            .insert(ClassMetadata::new("C").parent("B"))
            .unwrap();

        assert_eq!(registry.ancestors("C").unwrap(), vec!["A", "B"]);
        assert!(registry.ancestors("A").unwrap().is_empty());
    }
}
