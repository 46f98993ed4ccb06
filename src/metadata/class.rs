use super::field::{FieldKind, FieldMapping};
use crate::blame::Blameable;
use crate::core::{DbError, Result};

/// One entry of a class's frozen field layout: the mapping, the metadata
/// level that declared it, and its record slot (collections have none).
#[derive(Debug, Clone)]
pub struct LayoutSlot {
    pub mapping: FieldMapping,
    pub declared_in: String,
    pub slot: Option<usize>,
}

/// Metadata for one entity class: declared field mappings, the parent
/// link, attached blame directives and, once registered, the frozen field
/// layout covering the whole ancestor chain.
///
/// Declaring metadata through the builder methods is this crate's analog
/// of annotating entity properties.
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    name: String,
    parent: Option<String>,
    mapped_superclass: bool,
    display_field: Option<String>,
    fields: Vec<FieldMapping>,
    directives: Vec<(String, Blameable)>,
    layout: Vec<LayoutSlot>,
    frozen: bool,
}

impl ClassMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            mapped_superclass: false,
            display_field: None,
            fields: Vec::new(),
            directives: Vec::new(),
            layout: Vec::new(),
            frozen: false,
        }
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn mapped_superclass(mut self) -> Self {
        self.mapped_superclass = true;
        self
    }

    /// Declare which field holds the entity's string representation.
    ///
    /// An entity reference used as an actor can only be coerced onto a
    /// scalar blame field when its class declares one.
    pub fn display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = Some(field.into());
        self
    }

    pub fn field(mut self, mapping: FieldMapping) -> Self {
        self.fields.push(mapping);
        self
    }

    /// Attach a blame directive to a field name. The field does not have
    /// to be mapped yet; unmapped blame fields are automapped when the
    /// class is registered.
    pub fn blameable(mut self, field: impl Into<String>, directive: Blameable) -> Self {
        self.directives.push((field.into(), directive));
        self
    }

    /// Conventional `created_by` creator field.
    pub fn creator(self) -> Self {
        self.blameable("created_by", Blameable::on_create())
    }

    /// Conventional `updated_by` editor field.
    pub fn editor(self) -> Self {
        self.blameable("updated_by", Blameable::on_update())
    }

    /// Conventional `deleted_by` remover field.
    pub fn remover(self) -> Self {
        self.blameable("deleted_by", Blameable::on_delete())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_class(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn is_mapped_superclass(&self) -> bool {
        self.mapped_superclass
    }

    pub fn display_field_name(&self) -> Option<&str> {
        self.display_field.as_deref()
    }

    pub fn declared_fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn declared_directives(&self) -> &[(String, Blameable)] {
        &self.directives
    }

    pub fn declared_mapping(&self, field: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == field)
    }

    /// Add a mapping at metadata-load time (automapping). Rejected once
    /// the class is frozen.
    pub fn add_field(&mut self, mapping: FieldMapping) -> Result<()> {
        if self.frozen {
            return Err(DbError::ExecutionError(format!(
                "Cannot map field '{}': class '{}' metadata is frozen",
                mapping.name, self.name
            )));
        }
        if self.declared_mapping(&mapping.name).is_some() {
            return Err(DbError::InvalidMapping(format!(
                "Field '{}' already mapped in class '{}'",
                mapping.name, self.name
            )));
        }
        self.fields.push(mapping);
        Ok(())
    }

    pub(crate) fn freeze(&mut self, layout: Vec<LayoutSlot>) {
        self.layout = layout;
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Frozen field layout, ancestor fields first.
    pub fn layout(&self) -> &[LayoutSlot] {
        &self.layout
    }

    pub fn layout_slot(&self, field: &str) -> Option<&LayoutSlot> {
        self.layout.iter().find(|s| s.mapping.name == field)
    }

    pub fn mapping(&self, field: &str) -> Result<&FieldMapping> {
        self.layout_slot(field)
            .map(|s| &s.mapping)
            .ok_or_else(|| DbError::FieldNotFound(field.to_string(), self.name.clone()))
    }

    /// Record slot index of a stored field.
    pub fn field_index(&self, field: &str) -> Result<usize> {
        let slot = self
            .layout_slot(field)
            .ok_or_else(|| DbError::FieldNotFound(field.to_string(), self.name.clone()))?;

        slot.slot.ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "Collection field '{}' of class '{}' has no stored value",
                field, self.name
            ))
        })
    }

    /// Number of record slots (stored fields across the ancestor chain).
    pub fn stored_len(&self) -> usize {
        self.layout.iter().filter(|s| s.slot.is_some()).count()
    }

    /// Scalar column test, association fields excluded.
    pub fn has_field(&self, field: &str) -> bool {
        matches!(
            self.layout_slot(field),
            Some(slot) if matches!(slot.mapping.kind, FieldKind::Column { .. })
        )
    }

    pub fn has_association(&self, field: &str) -> bool {
        matches!(
            self.layout_slot(field),
            Some(slot) if slot.mapping.is_association()
        )
    }

    pub fn is_single_valued_association(&self, field: &str) -> bool {
        matches!(
            self.layout_slot(field),
            Some(slot) if slot.mapping.is_single_valued_association()
        )
    }

    pub fn is_inherited_field(&self, field: &str) -> bool {
        matches!(
            self.layout_slot(field),
            Some(slot) if slot.declared_in != self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    #[test]
    fn test_builder_declares_fields_and_directives() {
        let meta = ClassMetadata::new("ArticleEntity")
            .field(FieldMapping::text("title"))
            .field(FieldMapping::text("created_by"))
            .blameable("created_by", Blameable::on_create());

        assert_eq!(meta.name(), "ArticleEntity");
        assert_eq!(meta.declared_fields().len(), 2);
        assert_eq!(meta.declared_directives().len(), 1);
        assert!(!meta.is_frozen());
    }

    #[test]
    fn test_add_field_rejects_duplicates() {
        let mut meta = ClassMetadata::new("ArticleEntity").field(FieldMapping::text("title"));
        assert!(meta.add_field(FieldMapping::text("title")).is_err());
        assert!(meta
            .add_field(FieldMapping::column("views", DataType::Integer))
            .is_ok());
    }

    #[test]
    fn test_presets() {
        let meta = ClassMetadata::new("ArticleEntity").creator().editor().remover();
        let names: Vec<_> = meta
            .declared_directives()
            .iter()
            .map(|(f, _)| f.as_str())
            .collect();
        assert_eq!(names, vec!["created_by", "updated_by", "deleted_by"]);
    }
}
