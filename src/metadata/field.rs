use crate::core::{DataType, DbError, Result, Value};

/// How an entity field is mapped.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Scalar column.
    Column { data_type: DataType, nullable: bool },

    /// Single-valued association to another entity class.
    ManyToOne {
        target_class: String,
        nullable: bool,
        on_delete_set_null: bool,
        join_column: Option<String>,
        referenced_column: Option<String>,
    },

    /// Inverse-side collection. Holds no record slot.
    OneToMany { target_class: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldMapping {
    pub fn column(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Column {
                data_type,
                nullable: true,
            },
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::column(name, DataType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::column(name, DataType::Integer)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::column(name, DataType::Boolean)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::column(name, DataType::Float)
    }

    pub fn many_to_one(name: impl Into<String>, target_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::ManyToOne {
                target_class: target_class.into(),
                nullable: true,
                on_delete_set_null: false,
                join_column: None,
                referenced_column: None,
            },
        }
    }

    pub fn one_to_many(name: impl Into<String>, target_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::OneToMany {
                target_class: target_class.into(),
            },
        }
    }

    pub fn not_null(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Column { nullable, .. } => *nullable = false,
            FieldKind::ManyToOne { nullable, .. } => *nullable = false,
            FieldKind::OneToMany { .. } => {}
        }
        self
    }

    pub fn on_delete_set_null(mut self) -> Self {
        if let FieldKind::ManyToOne {
            on_delete_set_null, ..
        } = &mut self.kind
        {
            *on_delete_set_null = true;
        }
        self
    }

    pub fn join_column(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::ManyToOne { join_column, .. } = &mut self.kind {
            *join_column = Some(name.into());
        }
        self
    }

    pub fn referenced_column(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::ManyToOne {
            referenced_column, ..
        } = &mut self.kind
        {
            *referenced_column = Some(name.into());
        }
        self
    }

    /// True for fields that occupy a record slot (everything except
    /// inverse-side collections).
    pub fn is_stored(&self) -> bool {
        !matches!(self.kind, FieldKind::OneToMany { .. })
    }

    pub fn is_association(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::ManyToOne { .. } | FieldKind::OneToMany { .. }
        )
    }

    pub fn is_single_valued_association(&self) -> bool {
        matches!(self.kind, FieldKind::ManyToOne { .. })
    }

    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            FieldKind::Column { nullable, .. } => *nullable,
            FieldKind::ManyToOne { nullable, .. } => *nullable,
            FieldKind::OneToMany { .. } => true,
        }
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        match &self.kind {
            FieldKind::Column { data_type, .. } => {
                if !value.is_null() && !data_type.is_compatible(value) {
                    return Err(DbError::TypeMismatch(format!(
                        "Field '{}' expects type {}, got {}",
                        self.name,
                        data_type,
                        value.type_name()
                    )));
                }
                Ok(())
            }
            FieldKind::ManyToOne { target_class, .. } => match value {
                Value::Null => Ok(()),
                Value::Ref(r) if r.class == *target_class => Ok(()),
                Value::Ref(r) => Err(DbError::TypeMismatch(format!(
                    "Field '{}' expects a reference to '{}', got '{}'",
                    self.name, target_class, r.class
                ))),
                other => Err(DbError::TypeMismatch(format!(
                    "Field '{}' expects an entity reference, got {}",
                    self.name,
                    other.type_name()
                ))),
            },
            FieldKind::OneToMany { .. } => Err(DbError::InvalidArgument(format!(
                "Collection field '{}' cannot be written directly",
                self.name
            ))),
        }
    }
}
