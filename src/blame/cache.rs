use super::config::ClassConfiguration;
use crate::core::{DbError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// File-backed configuration cache, so parsed class configurations
/// survive process restarts.
///
/// The whole cache is one MessagePack snapshot; writes go through a
/// temporary file in the same directory and an atomic rename.
pub struct ConfigFileCache {
    path: PathBuf,
}

impl ConfigFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, class: &str) -> Result<Option<ClassConfiguration>> {
        let mut all = self.read_all()?;
        Ok(all.remove(class))
    }

    pub fn save(&self, class: &str, config: &ClassConfiguration) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(class.to_string(), config.clone());
        self.write_all(&all)
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn read_all(&self) -> Result<HashMap<String, ClassConfiguration>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let file = File::open(&self.path)?;
        rmp_serde::from_read(BufReader::new(file))
            .map_err(|e| DbError::SerializationError(e.to_string()))
    }

    fn write_all(&self, all: &HashMap<String, ClassConfiguration>) -> Result<()> {
        let bytes =
            rmp_serde::to_vec(all).map_err(|e| DbError::SerializationError(e.to_string()))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&self.path)
            .map_err(|e| DbError::IoError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blame::ChangeRule;
    use crate::core::Value;

    fn sample() -> ClassConfiguration {
        ClassConfiguration {
            create: vec!["created_by".into()],
            update: vec!["updated_by".into()],
            delete: vec![],
            change: vec![ChangeRule {
                field: "published_by".into(),
                tracked: vec!["type.title".into()],
                expected: Some(vec![Value::Text("Published".into())]),
            }],
            owner_class: Some("ArticleEntity".into()),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ConfigFileCache::new(dir.path().join("blameable.cache"));

        assert_eq!(cache.load("ArticleEntity").unwrap(), None);

        cache.save("ArticleEntity", &sample()).unwrap();
        cache
            .save("TypeEntity", &ClassConfiguration::default())
            .unwrap();

        assert_eq!(cache.load("ArticleEntity").unwrap(), Some(sample()));
        assert_eq!(
            cache.load("TypeEntity").unwrap(),
            Some(ClassConfiguration::default())
        );

        cache.clear().unwrap();
        assert_eq!(cache.load("ArticleEntity").unwrap(), None);
    }
}
