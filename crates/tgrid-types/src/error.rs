use thiserror::Error;

/// Errors produced when constructing or converting core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key for table {table}: {reason}")]
    InvalidKey { table: String, reason: String },

    #[error("column arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("invalid association descriptor for table {table}: {reason}")]
    InvalidDescriptor { table: String, reason: String },

    #[error("property value is not available: {0}")]
    Unavailable(String),
}

/// Result alias for type-level operations.
pub type TypeResult<T> = Result<T, TypeError>;
