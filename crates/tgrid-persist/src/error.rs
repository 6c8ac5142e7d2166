use tgrid_mapping::MappingError;
use tgrid_store::StoreError;
use tgrid_types::TypeError;

/// Errors raised by persisters.
///
/// None of these are retried inside the persistence layer; each is reported
/// once with enough context to find the record that diverged.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// An insert hit a key that already holds a record.
    #[error("duplicate key: {entity} already stored at {key}")]
    DuplicateKey { entity: String, key: String },

    /// An optimistic-lock check failed.
    #[error("stale state: {entity} at {key} was changed or removed concurrently")]
    StaleState { entity: String, key: String },

    /// A row that must exist is missing, or the two sides of an association diverged.
    #[error("consistency violation in {table}: {reason}")]
    ConsistencyViolation { table: String, reason: String },

    /// The mapping does not support the requested operation.
    #[error("unsupported shape for {name}: {reason}")]
    UnsupportedShape { name: String, reason: String },

    /// A null value was written to a non-nullable property.
    #[error("property {entity}.{property} is not nullable")]
    NullProperty { entity: String, property: String },

    /// The entity has no property of that name.
    #[error("entity {entity} has no property {property}")]
    UnknownProperty { entity: String, property: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("mapping error: {0}")]
    Mapping(#[source] MappingError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl PersistError {
    pub fn consistency(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_stale_state(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    pub fn is_consistency_violation(&self) -> bool {
        matches!(self, Self::ConsistencyViolation { .. })
    }
}

impl From<MappingError> for PersistError {
    fn from(e: MappingError) -> Self {
        match e {
            MappingError::UnsupportedShape { name, reason } => Self::UnsupportedShape { name, reason },
            other => Self::Mapping(other),
        }
    }
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
