//! Foundation types for tgrid, the tuple grid mapper.
//!
//! tgrid maps entities and their associations onto a plain key-value tuple
//! store. This crate holds the data model shared by every other tgrid crate.
//!
//! # Key Types
//!
//! - [`Value`] -- a single scalar column value (or null)
//! - [`FieldValue`] -- the value of one mapped property, spanning one or more columns
//! - [`Record`] -- a mutable column map with an operation log; one stored row
//! - [`RecordKey`] -- immutable `(table, columns, values)` locator of one record
//! - [`AssociationDescriptor`] -- static shape of an association
//! - [`AssociationKey`] -- one association instance: a descriptor plus owner key values

pub mod error;
pub mod key;
pub mod record;
pub mod value;

pub use error::{TypeError, TypeResult};
pub use key::{AssociationDescriptor, AssociationKey, EntityKey, RecordKey, RowKey};
pub use record::{ColumnOperation, Record};
pub use value::{FieldValue, Value};
