use super::annotation::{Blameable, ExpectedValues, TriggerPhase};
use super::cache::ConfigFileCache;
use super::config::{ChangeRule, ClassConfiguration};
use crate::core::{DataType, DbError, FieldPath, Result};
use crate::metadata::{ClassMetadata, FieldKind, FieldMapping, MetadataRegistry};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Behavior settings of the blameable extension.
#[derive(Debug, Clone)]
pub struct BlameableOptions {
    /// Class automapped blame fields reference. When unset, blame fields
    /// automap as nullable text columns instead.
    pub user_entity: Option<String>,
    /// Skip mapping checks and automapping entirely.
    pub lazy_association: bool,
    /// Map unmapped blame fields automatically.
    pub automap_field: bool,
}

impl Default for BlameableOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BlameableOptions {
    pub fn new() -> Self {
        Self {
            user_entity: None,
            lazy_association: false,
            automap_field: true,
        }
    }

    pub fn with_user_entity(mut self, class: impl Into<String>) -> Self {
        self.user_entity = Some(class.into());
        self
    }

    pub fn with_lazy_association(mut self, lazy: bool) -> Self {
        self.lazy_association = lazy;
        self
    }

    pub fn with_automap(mut self, automap: bool) -> Self {
        self.automap_field = automap;
        self
    }

    pub fn automap_with_association(&self, registry: &MetadataRegistry) -> bool {
        self.automap_field
            && matches!(&self.user_entity, Some(user) if registry.contains(user))
    }

    pub fn automap_with_field(&self) -> bool {
        self.automap_field && self.user_entity.is_none()
    }

    pub fn use_lazy_association(&self) -> bool {
        self.lazy_association
    }
}

lazy_static! {
    static ref GLOBAL_CONFIG_CACHE: ConfigCache = ConfigCache::new();
}

/// Process-wide cache of parsed class configurations.
///
/// Population is idempotent; concurrent recomputation of the same class
/// is tolerated (last writer wins, the computed value is deterministic).
#[derive(Clone, Default)]
pub struct ConfigCache {
    inner: Arc<RwLock<HashMap<String, Arc<ClassConfiguration>>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide instance.
    pub fn global() -> Self {
        GLOBAL_CONFIG_CACHE.clone()
    }

    pub fn get(&self, class: &str) -> Result<Option<Arc<ClassConfiguration>>> {
        Ok(self.inner.read()?.get(class).cloned())
    }

    pub fn put(&self, class: &str, config: Arc<ClassConfiguration>) -> Result<()> {
        self.inner.write()?.insert(class.to_string(), config);
        Ok(())
    }

    pub fn remove(&self, class: &str) -> Result<()> {
        self.inner.write()?.remove(class);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.write()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.read()?.is_empty())
    }
}

/// Field configuration resolver: turns per-field blame directives into a
/// cached, phase-keyed `ClassConfiguration`, automapping unmapped blame
/// fields at metadata-load time.
pub struct BlameableDriver {
    options: BlameableOptions,
    cache: ConfigCache,
    file_cache: Option<ConfigFileCache>,
}

impl BlameableDriver {
    /// Driver backed by the process-wide configuration cache.
    pub fn new(options: BlameableOptions) -> Self {
        Self::with_cache(options, ConfigCache::global())
    }

    pub fn with_cache(options: BlameableOptions, cache: ConfigCache) -> Self {
        Self {
            options,
            cache,
            file_cache: None,
        }
    }

    /// Attach a file-backed cache consulted on in-memory misses and
    /// written through on every (re)parse.
    pub fn file_cache(mut self, file_cache: ConfigFileCache) -> Self {
        self.file_cache = Some(file_cache);
        self
    }

    pub fn options(&self) -> &BlameableOptions {
        &self.options
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.cache
    }

    /// Metadata-load hook: automap unmapped blame fields declared at
    /// this level, then parse and cache the class's configuration.
    /// Mapped superclasses only get automapping; configurations are
    /// built for concrete classes.
    pub fn load_class_metadata(
        &self,
        meta: &mut ClassMetadata,
        registry: &MetadataRegistry,
    ) -> Result<()> {
        self.automap(meta, registry)?;

        if meta.is_mapped_superclass() {
            return Ok(());
        }

        let config = self.build_configuration(meta, registry)?;
        self.store_configuration(meta.name(), config)?;
        Ok(())
    }

    /// Configuration for a class; cache hits short-circuit re-parsing.
    /// A miss falls back to the file cache, then re-derives from the
    /// frozen metadata.
    pub fn configuration(
        &self,
        registry: &MetadataRegistry,
        class: &str,
    ) -> Result<Arc<ClassConfiguration>> {
        if let Some(config) = self.cache.get(class)? {
            return Ok(config);
        }

        if let Some(file_cache) = &self.file_cache {
            if let Some(config) = file_cache.load(class)? {
                log::debug!("blameable: configuration for '{}' loaded from file cache", class);
                let config = Arc::new(config);
                self.cache.put(class, config.clone())?;
                return Ok(config);
            }
        }

        let meta = registry.metadata(class)?;
        let config = if meta.is_mapped_superclass() {
            ClassConfiguration::default()
        } else {
            self.build_configuration(meta, registry)?
        };
        self.store_configuration(class, config)
    }

    fn store_configuration(
        &self,
        class: &str,
        config: ClassConfiguration,
    ) -> Result<Arc<ClassConfiguration>> {
        let config = Arc::new(config);
        // Empty configurations are cached too, so classes without blame
        // fields are not re-scanned.
        self.cache.put(class, config.clone())?;
        if let Some(file_cache) = &self.file_cache {
            file_cache.save(class, &config)?;
        }
        Ok(config)
    }

    fn automap(&self, meta: &mut ClassMetadata, registry: &MetadataRegistry) -> Result<()> {
        if self.options.lazy_association {
            return Ok(());
        }

        let directives: Vec<(String, Blameable)> = meta.declared_directives().to_vec();
        for (field, directive) in &directives {
            let mapped = meta.declared_mapping(field).is_some()
                || ancestor_mapping(meta, registry, field).is_some();
            if mapped {
                continue;
            }

            if !self.options.automap_field {
                return Err(unmapped_field_error(field, meta.name()));
            }

            let mapping = if self.options.automap_with_association(registry) {
                let user_entity = match &self.options.user_entity {
                    Some(user) => user.clone(),
                    None => return Err(unmapped_field_error(field, meta.name())),
                };
                let mut mapping =
                    FieldMapping::many_to_one(field.clone(), user_entity).on_delete_set_null();
                if let Some(join_column) = &directive.join_column {
                    mapping = mapping.join_column(join_column.clone());
                }
                if let Some(referenced_column) = &directive.referenced_column {
                    mapping = mapping.referenced_column(referenced_column.clone());
                }
                mapping
            } else if self.options.automap_with_field() {
                FieldMapping::text(field.clone())
            } else {
                // A user entity is configured but not registered.
                return Err(unmapped_field_error(field, meta.name()));
            };

            log::debug!("blameable: automapped '{}.{}'", meta.name(), field);
            meta.add_field(mapping)?;
        }
        Ok(())
    }

    fn build_configuration(
        &self,
        meta: &ClassMetadata,
        registry: &MetadataRegistry,
    ) -> Result<ClassConfiguration> {
        let mut config = ClassConfiguration::default();

        // Collect metadata from inherited classes, oldest ancestor first.
        let mut chain = Vec::new();
        if let Some(parent) = meta.parent_class() {
            chain = registry.ancestors(parent)?;
            chain.push(parent.to_string());
        }

        for ancestor in &chain {
            self.read_level(registry.metadata(ancestor)?, meta, registry, &mut config)?;
        }
        self.read_level(meta, meta, registry, &mut config)?;

        if !config.is_empty() {
            config.owner_class = Some(meta.name().to_string());
        }

        log::debug!(
            "blameable: parsed configuration for '{}' ({} create, {} update, {} delete, {} change)",
            meta.name(),
            config.create.len(),
            config.update.len(),
            config.delete.len(),
            config.change.len()
        );
        Ok(config)
    }

    fn read_level(
        &self,
        level: &ClassMetadata,
        leaf: &ClassMetadata,
        registry: &MetadataRegistry,
        config: &mut ClassConfiguration,
    ) -> Result<()> {
        for (field, directive) in level.declared_directives() {
            let mapping = lookup_mapping(leaf, registry, field);
            self.validate_mapped_type(leaf.name(), field, mapping.as_ref())?;

            match directive.on {
                TriggerPhase::Create => config.create.push(field.clone()),
                TriggerPhase::Update => config.update.push(field.clone()),
                TriggerPhase::Delete => config.delete.push(field.clone()),
                TriggerPhase::Change => {
                    let tracked = directive.tracked.as_ref().ok_or_else(|| {
                        DbError::InvalidMapping(format!(
                            "Missing tracked field on property '{}', it must be set for the change trigger in class '{}'",
                            field,
                            leaf.name()
                        ))
                    })?;

                    if tracked.is_many()
                        && matches!(directive.expected, Some(ExpectedValues::Single(_)))
                    {
                        return Err(DbError::InvalidMapping(
                            "Multiple tracked fields with a single expected value are not supported yet"
                                .into(),
                        ));
                    }

                    let paths = tracked.paths();
                    for path in &paths {
                        FieldPath::parse(path)?;
                    }

                    config.change.push(ChangeRule {
                        field: field.clone(),
                        tracked: paths,
                        expected: directive.expected.as_ref().map(|e| e.values()),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_mapped_type(
        &self,
        class: &str,
        field: &str,
        mapping: Option<&FieldMapping>,
    ) -> Result<()> {
        if self.options.lazy_association {
            return Ok(());
        }

        match mapping {
            None => Err(unmapped_field_error(field, class)),
            Some(mapping) => match &mapping.kind {
                FieldKind::Column { data_type, .. } => {
                    if matches!(*data_type, DataType::Text | DataType::Integer) {
                        Ok(())
                    } else {
                        Err(DbError::InvalidMapping(format!(
                            "Field '{}' type is not valid, it must be TEXT, INTEGER or a to-one association in class '{}'",
                            field, class
                        )))
                    }
                }
                FieldKind::ManyToOne { .. } => Ok(()),
                FieldKind::OneToMany { .. } => Err(DbError::InvalidMapping(format!(
                    "Association '{}' is not valid, it must be a to-one relation or a string field in class '{}'",
                    field, class
                ))),
            },
        }
    }
}

fn unmapped_field_error(field: &str, class: &str) -> DbError {
    DbError::InvalidMapping(format!(
        "Unable to find blameable field '{}' as a mapped property in entity '{}'",
        field, class
    ))
}

fn ancestor_mapping(
    meta: &ClassMetadata,
    registry: &MetadataRegistry,
    field: &str,
) -> Option<FieldMapping> {
    let parent = registry.get(meta.parent_class()?)?;
    // A parent's frozen layout already covers its own ancestors.
    parent.layout_slot(field).map(|s| s.mapping.clone())
}

fn lookup_mapping(
    leaf: &ClassMetadata,
    registry: &MetadataRegistry,
    field: &str,
) -> Option<FieldMapping> {
    if leaf.is_frozen() {
        return leaf.layout_slot(field).map(|s| s.mapping.clone());
    }
    if let Some(mapping) = leaf.declared_mapping(field) {
        return Some(mapping.clone());
    }
    ancestor_mapping(leaf, registry, field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn isolated_driver(options: BlameableOptions) -> BlameableDriver {
        BlameableDriver::with_cache(options, ConfigCache::new())
    }

    fn register(
        driver: &BlameableDriver,
        registry: &mut MetadataRegistry,
        mut meta: ClassMetadata,
    ) -> Result<()> {
        driver.load_class_metadata(&mut meta, registry)?;
        registry.insert(meta)
    }

    #[test]
    fn test_automap_as_text_column() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("title"))
                .blameable("created_by", Blameable::on_create()),
        )
        .unwrap();

        let meta = registry.metadata("ArticleEntity").unwrap();
        assert!(meta.has_field("created_by"));
        assert!(meta.mapping("created_by").unwrap().is_nullable());

        let config = driver.configuration(&registry, "ArticleEntity").unwrap();
        assert_eq!(config.create, vec!["created_by"]);
        assert_eq!(config.owner_class.as_deref(), Some("ArticleEntity"));
    }

    #[test]
    fn test_automap_as_association_to_user_entity() {
        let driver = isolated_driver(BlameableOptions::new().with_user_entity("UserEntity"));
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("UserEntity").field(FieldMapping::text("username")),
        )
        .unwrap();
        register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("title"))
                .blameable(
                    "created_by",
                    Blameable::on_create().join_column("created_by_id"),
                ),
        )
        .unwrap();

        let meta = registry.metadata("ArticleEntity").unwrap();
        let mapping = meta.mapping("created_by").unwrap();
        match &mapping.kind {
            FieldKind::ManyToOne {
                target_class,
                on_delete_set_null,
                join_column,
                ..
            } => {
                assert_eq!(target_class, "UserEntity");
                assert!(on_delete_set_null);
                assert_eq!(join_column.as_deref(), Some("created_by_id"));
            }
            other => panic!("expected association mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_field_with_automap_disabled_is_fatal() {
        let driver = isolated_driver(BlameableOptions::new().with_automap(false));
        let mut registry = MetadataRegistry::new();

        let result = register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity").blameable("created_by", Blameable::on_create()),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));
    }

    #[test]
    fn test_wrong_mapped_type_is_fatal() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        let result = register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::boolean("created_by"))
                .blameable("created_by", Blameable::on_create()),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));
    }

    #[test]
    fn test_collection_target_is_fatal() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("UserEntity").field(FieldMapping::text("username")),
        )
        .unwrap();

        let result = register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::one_to_many("editors", "UserEntity"))
                .blameable("editors", Blameable::on_update()),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));
    }

    #[test]
    fn test_change_requires_tracked_field() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        let mut directive = Blameable::on_change("status");
        directive.tracked = None;

        let result = register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("published_by"))
                .blameable("published_by", directive),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));
    }

    #[test]
    fn test_multi_tracked_with_single_expected_value_rejected() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        let result = register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("status"))
                .field(FieldMapping::text("kind"))
                .field(FieldMapping::text("published_by"))
                .blameable(
                    "published_by",
                    Blameable::on_change_any(&["status", "kind"]).expecting("Published"),
                ),
        );
        assert!(matches!(result, Err(DbError::InvalidMapping(_))));

        // The list form stays accepted.
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();
        register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("status"))
                .field(FieldMapping::text("kind"))
                .field(FieldMapping::text("published_by"))
                .blameable(
                    "published_by",
                    Blameable::on_change_any(&["status", "kind"])
                        .expecting_one_of(vec![Value::from("Published")]),
                ),
        )
        .unwrap();
    }

    #[test]
    fn test_empty_configuration_is_cached() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("TypeEntity").field(FieldMapping::text("title")),
        )
        .unwrap();

        let config = driver.configuration(&registry, "TypeEntity").unwrap();
        assert!(config.is_empty());
        assert_eq!(driver.cache().len().unwrap(), 1);
    }

    #[test]
    fn test_cache_hit_returns_identical_configuration() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .field(FieldMapping::text("title"))
                .blameable("created_by", Blameable::on_create())
                .blameable("updated_by", Blameable::on_update()),
        )
        .unwrap();

        let first = driver.configuration(&registry, "ArticleEntity").unwrap();

        // Drop the in-memory entry and re-derive from frozen metadata:
        // the content must round-trip.
        driver.cache().clear().unwrap();
        let reparsed = driver.configuration(&registry, "ArticleEntity").unwrap();
        assert_eq!(*first, *reparsed);

        // And a hit short-circuits to the same Arc.
        let hit = driver.configuration(&registry, "ArticleEntity").unwrap();
        assert!(Arc::ptr_eq(&reparsed, &hit));
    }

    #[test]
    fn test_inherited_directives_union_ancestor_first() {
        let driver = isolated_driver(BlameableOptions::new());
        let mut registry = MetadataRegistry::new();

        register(
            &driver,
            &mut registry,
            ClassMetadata::new("BaseEntity")
                .mapped_superclass()
                .blameable("created_by", Blameable::on_create()),
        )
        .unwrap();
        register(
            &driver,
            &mut registry,
            ClassMetadata::new("ArticleEntity")
                .parent("BaseEntity")
                .field(FieldMapping::text("title"))
                .blameable("updated_by", Blameable::on_update()),
        )
        .unwrap();

        // The mapped superclass got automapped but no configuration.
        assert!(registry.metadata("BaseEntity").unwrap().has_field("created_by"));

        let config = driver.configuration(&registry, "ArticleEntity").unwrap();
        assert_eq!(config.create, vec!["created_by"]);
        assert_eq!(config.update, vec!["updated_by"]);
        assert_eq!(config.owner_class.as_deref(), Some("ArticleEntity"));
    }
}
