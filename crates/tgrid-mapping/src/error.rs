use std::path::PathBuf;

use tgrid_types::TypeError;

/// Errors raised while loading or validating mapping metadata.
///
/// All of these are configuration-time errors: they surface when a mapping
/// document is built, never in the middle of a persistence operation.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// The mapping document could not be read from disk.
    #[error("failed to read mapping document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The mapping document is not valid TOML or does not match the schema.
    #[error("malformed mapping document: {0}")]
    Toml(#[from] toml::de::Error),

    /// Two definitions share a name that must be unique.
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// A definition references an entity that is not mapped.
    #[error("{referenced_by} references unknown entity '{name}'")]
    UnknownEntity { referenced_by: String, name: String },

    /// A definition references a property the entity does not have.
    #[error("entity '{entity}' has no property '{property}'")]
    UnknownProperty { entity: String, property: String },

    /// A definition is internally inconsistent.
    #[error("invalid mapping for '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// The mapping describes a shape the persistence layer cannot represent.
    #[error("unsupported shape for '{name}': {reason}")]
    UnsupportedShape { name: String, reason: String },

    /// A key or descriptor could not be constructed.
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl MappingError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;
