use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected value: {0}")]
    UnexpectedValue(String),

    #[error("Class '{0}' is not registered")]
    ClassNotFound(String),

    #[error("Class '{0}' already registered")]
    ClassExists(String),

    #[error("Field '{0}' not found in class '{1}'")]
    FieldNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/0 error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
