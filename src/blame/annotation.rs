use crate::core::Value;
use std::fmt;

/// When a blame field is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerPhase {
    Create,
    Update,
    Delete,
    Change,
}

impl fmt::Display for TriggerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Change => write!(f, "change"),
        }
    }
}

/// Tracked-field specification of a `change` directive: a single field
/// path or a list of paths. Paths may use the one-level dotted
/// `field.child` form.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedFields {
    One(String),
    Many(Vec<String>),
}

impl TrackedFields {
    pub fn paths(&self) -> Vec<String> {
        match self {
            Self::One(path) => vec![path.clone()],
            Self::Many(paths) => paths.clone(),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

/// Expected-value specification of a `change` directive. Absent means
/// any change of the tracked field triggers.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedValues {
    Single(Value),
    AnyOf(Vec<Value>),
}

impl ExpectedValues {
    pub fn values(&self) -> Vec<Value> {
        match self {
            Self::Single(value) => vec![value.clone()],
            Self::AnyOf(values) => values.clone(),
        }
    }
}

/// A blame directive attached to an entity field: when (and, for the
/// `change` phase, under what condition) the field is auto-populated
/// with the current actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Blameable {
    pub on: TriggerPhase,
    pub tracked: Option<TrackedFields>,
    pub expected: Option<ExpectedValues>,
    pub join_column: Option<String>,
    pub referenced_column: Option<String>,
}

impl Default for Blameable {
    fn default() -> Self {
        Self {
            on: TriggerPhase::Update,
            tracked: None,
            expected: None,
            join_column: None,
            referenced_column: None,
        }
    }
}

impl Blameable {
    pub fn on_create() -> Self {
        Self {
            on: TriggerPhase::Create,
            ..Self::default()
        }
    }

    pub fn on_update() -> Self {
        Self::default()
    }

    pub fn on_delete() -> Self {
        Self {
            on: TriggerPhase::Delete,
            ..Self::default()
        }
    }

    pub fn on_change(tracked: impl Into<String>) -> Self {
        Self {
            on: TriggerPhase::Change,
            tracked: Some(TrackedFields::One(tracked.into())),
            ..Self::default()
        }
    }

    pub fn on_change_any(tracked: &[&str]) -> Self {
        Self {
            on: TriggerPhase::Change,
            tracked: Some(TrackedFields::Many(
                tracked.iter().map(|s| s.to_string()).collect(),
            )),
            ..Self::default()
        }
    }

    /// Single expected value.
    pub fn expecting(mut self, value: impl Into<Value>) -> Self {
        self.expected = Some(ExpectedValues::Single(value.into()));
        self
    }

    /// List of expected values; the rule triggers on any member.
    pub fn expecting_one_of(mut self, values: Vec<Value>) -> Self {
        self.expected = Some(ExpectedValues::AnyOf(values));
        self
    }

    /// Join column name used when the field is automapped as an
    /// association.
    pub fn join_column(mut self, name: impl Into<String>) -> Self {
        self.join_column = Some(name.into());
        self
    }

    pub fn referenced_column(mut self, name: impl Into<String>) -> Self {
        self.referenced_column = Some(name.into());
        self
    }
}
