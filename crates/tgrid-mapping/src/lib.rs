//! Mapping metadata for tgrid.
//!
//! Describes which entity property lives in which column, how collections are
//! laid out, and how association rows are keyed. Metadata is loaded from a
//! TOML [`MappingDocument`], validated eagerly, and frozen into an immutable
//! [`Mappings`] registry that persisters share by reference.
//!
//! # Capabilities
//!
//! Entity behaviour is split into small traits instead of a class hierarchy:
//!
//! - [`Identifiable`] -- identifier columns and entity keys
//! - [`Versionable`] -- version column and version arithmetic
//! - [`DiscriminatorBearing`] -- single-table discriminator, chosen by [`MappingStrategy`]

pub mod collection;
pub mod document;
pub mod entity;
pub mod error;
pub mod mappings;
pub mod row_key;

pub use collection::{
    AssociationShape, CollectionMapping, CollectionMetadata, ElementMapping, EntityRef,
    IndexMapping, RowLocatorKind,
};
pub use document::MappingDocument;
pub use entity::{
    Discriminator, DiscriminatorBearing, EntityMapping, EntityMetadata, Identifiable,
    MappingStrategy, OptimisticLockStyle, PropertyDescriptor, Versionable,
};
pub use error::{MappingError, MappingResult};
pub use mappings::Mappings;
pub use row_key::{RowKeyBuilder, ShapeFlags};
