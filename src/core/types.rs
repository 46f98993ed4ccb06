use super::{DbError, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Positional field values of one entity instance, laid out according to
/// the class's frozen field layout (ancestor fields first).
pub type Record = Vec<Value>;

/// Surrogate identifier assigned by the session when an entity is first
/// managed. Stable for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracked-field path: either a plain field name or a one-level dotted
/// `field.child` path dereferencing into a related entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub field: String,
    pub child: Option<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        let mut parts = path.splitn(2, '.');
        let field = parts.next().unwrap_or_default();

        if field.is_empty() {
            return Err(DbError::InvalidArgument(format!(
                "Empty tracked field path: '{}'",
                path
            )));
        }

        let child = match parts.next() {
            Some(child) if child.is_empty() || child.contains('.') => {
                return Err(DbError::InvalidArgument(format!(
                    "Tracked field path '{}' must be 'field' or 'field.child'",
                    path
                )));
            }
            other => other.map(str::to_string),
        };

        Ok(Self {
            field: field.to_string(),
            child,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path() {
        let path = FieldPath::parse("title").unwrap();
        assert_eq!(path.field, "title");
        assert_eq!(path.child, None);
    }

    #[test]
    fn test_dotted_path() {
        let path = FieldPath::parse("type.title").unwrap();
        assert_eq!(path.field, "type");
        assert_eq!(path.child.as_deref(), Some("title"));
    }

    #[test]
    fn test_invalid_paths() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a.").is_err());
        assert!(FieldPath::parse("a.b.c").is_err());
    }
}
