use crate::core::Value;
use serde::{Deserialize, Serialize};

/// A parsed `change`-phase rule: populate `field` with the current actor
/// when one of the tracked fields changes to an expected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRule {
    pub field: String,
    pub tracked: Vec<String>,
    /// `None` means any change of a tracked field triggers the rule.
    pub expected: Option<Vec<Value>>,
}

/// Cacheable per-class blame configuration: field names per trigger
/// phase plus the conditional change rules, derived by unioning the
/// directives of the class and all mapped ancestors (ancestor first).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassConfiguration {
    pub create: Vec<String>,
    pub update: Vec<String>,
    pub delete: Vec<String>,
    pub change: Vec<ChangeRule>,
    /// Concrete class the configuration was resolved for; set only when
    /// the configuration is non-empty.
    pub owner_class: Option<String>,
}

impl ClassConfiguration {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
            && self.change.is_empty()
    }
}
