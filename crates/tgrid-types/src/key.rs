//! Record keys and association descriptors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::value::Value;

/// Immutable locator of exactly one [`Record`](crate::Record).
///
/// A key is a `(table, column names, column values)` triple with at least one
/// column. Column order is significant: every key for the same table must use
/// the same order. Equality and hashing are structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    table: String,
    column_names: Vec<String>,
    column_values: Vec<Value>,
}

/// Key of an entity record: the entity table plus its identifier columns.
pub type EntityKey = RecordKey;

/// Key of one row inside an association.
pub type RowKey = RecordKey;

impl RecordKey {
    pub fn new(
        table: impl Into<String>,
        column_names: Vec<String>,
        column_values: Vec<Value>,
    ) -> TypeResult<Self> {
        let table = table.into();
        if column_names.is_empty() {
            return Err(TypeError::InvalidKey {
                table,
                reason: "a key needs at least one column".into(),
            });
        }
        if column_names.len() != column_values.len() {
            return Err(TypeError::InvalidKey {
                table,
                reason: format!(
                    "{} column names but {} values",
                    column_names.len(),
                    column_values.len()
                ),
            });
        }
        Ok(Self {
            table,
            column_names,
            column_values,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn column_values(&self) -> &[Value] {
        &self.column_values
    }

    /// Value of a key column, if the key has it.
    pub fn value_of(&self, column: &str) -> Option<&Value> {
        self.column_names
            .iter()
            .position(|c| c == column)
            .map(|i| &self.column_values[i])
    }

    /// Column/value pairs in key order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.column_values.iter())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.pairs().map(|(c, v)| format!("{c}={v}")).collect();
        write!(f, "{}{{{}}}", self.table, parts.join(", "))
    }
}

/// Static shape of an association.
///
/// An association lives in `table`; one instance of it is identified by the
/// values of `owner_key_columns`, and each of its rows by the values of
/// `row_key_columns`. Composite descriptors contain every owner column in
/// the row key and have strictly more row-key columns than owner columns.
/// Identifier-keyed descriptors (collections with a surrogate row id) use
/// that single identifier column as the whole row key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssociationDescriptor {
    table: String,
    owner_key_columns: Vec<String>,
    row_key_columns: Vec<String>,
    row_key_index_columns: Vec<String>,
    identifier_keyed: bool,
}

impl AssociationDescriptor {
    /// A descriptor whose row key extends the owner key.
    pub fn new(
        table: impl Into<String>,
        owner_key_columns: Vec<String>,
        row_key_columns: Vec<String>,
    ) -> TypeResult<Self> {
        let table = table.into();
        if owner_key_columns.is_empty() {
            return Err(invalid(&table, "owner key has no columns"));
        }
        if row_key_columns.len() <= owner_key_columns.len() {
            return Err(invalid(
                &table,
                "row key must have more columns than the owner key",
            ));
        }
        if let Some(missing) = owner_key_columns
            .iter()
            .find(|c| !row_key_columns.contains(c))
        {
            return Err(invalid(
                &table,
                &format!("owner column {missing} is not part of the row key"),
            ));
        }
        Ok(Self {
            table,
            owner_key_columns,
            row_key_columns,
            row_key_index_columns: Vec::new(),
            identifier_keyed: false,
        })
    }

    /// A descriptor whose rows are keyed by a single surrogate identifier column.
    pub fn identifier_keyed(
        table: impl Into<String>,
        owner_key_columns: Vec<String>,
        identifier_column: impl Into<String>,
    ) -> TypeResult<Self> {
        let table = table.into();
        if owner_key_columns.is_empty() {
            return Err(invalid(&table, "owner key has no columns"));
        }
        Ok(Self {
            table,
            owner_key_columns,
            row_key_columns: vec![identifier_column.into()],
            row_key_index_columns: Vec::new(),
            identifier_keyed: true,
        })
    }

    /// Mark which row-key columns come from the collection index.
    pub fn with_index_columns(mut self, index_columns: Vec<String>) -> TypeResult<Self> {
        if let Some(missing) = index_columns
            .iter()
            .find(|c| !self.row_key_columns.contains(c))
        {
            return Err(invalid(
                &self.table,
                &format!("index column {missing} is not part of the row key"),
            ));
        }
        self.row_key_index_columns = index_columns;
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn owner_key_columns(&self) -> &[String] {
        &self.owner_key_columns
    }

    pub fn row_key_columns(&self) -> &[String] {
        &self.row_key_columns
    }

    pub fn row_key_index_columns(&self) -> &[String] {
        &self.row_key_index_columns
    }

    pub fn is_identifier_keyed(&self) -> bool {
        self.identifier_keyed
    }
}

impl fmt::Display for AssociationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] rows by [{}]",
            self.table,
            self.owner_key_columns.join(", "),
            self.row_key_columns.join(", ")
        )
    }
}

fn invalid(table: &str, reason: &str) -> TypeError {
    TypeError::InvalidDescriptor {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

/// One association instance: a descriptor plus the owner's key values.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssociationKey {
    descriptor: Arc<AssociationDescriptor>,
    owner_values: Vec<Value>,
}

impl AssociationKey {
    pub fn new(descriptor: Arc<AssociationDescriptor>, owner_values: Vec<Value>) -> TypeResult<Self> {
        if owner_values.len() != descriptor.owner_key_columns.len() {
            return Err(TypeError::ArityMismatch {
                expected: descriptor.owner_key_columns.len(),
                actual: owner_values.len(),
            });
        }
        Ok(Self {
            descriptor,
            owner_values,
        })
    }

    pub fn descriptor(&self) -> &AssociationDescriptor {
        &self.descriptor
    }

    pub fn table(&self) -> &str {
        &self.descriptor.table
    }

    pub fn owner_values(&self) -> &[Value] {
        &self.owner_values
    }

    /// The owner key as a record key over the association table.
    pub fn owner_key(&self) -> RecordKey {
        RecordKey {
            table: self.descriptor.table.clone(),
            column_names: self.descriptor.owner_key_columns.clone(),
            column_values: self.owner_values.clone(),
        }
    }
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    // -----------------------------------------------------------------------
    // RecordKey
    // -----------------------------------------------------------------------

    #[test]
    fn key_requires_columns() {
        assert!(RecordKey::new("t", vec![], vec![]).is_err());
    }

    #[test]
    fn key_requires_matching_lengths() {
        let err = RecordKey::new("t", names(&["a", "b"]), vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidKey { .. }));
    }

    #[test]
    fn key_equality_is_structural() {
        let a = RecordKey::new("t", names(&["id"]), vec![Value::Int(1)]).unwrap();
        let b = RecordKey::new("t", names(&["id"]), vec![Value::Int(1)]).unwrap();
        let c = RecordKey::new("u", names(&["id"]), vec![Value::Int(1)]).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_column_order_matters() {
        let a = RecordKey::new("t", names(&["x", "y"]), vec![Value::Int(1), Value::Int(2)]).unwrap();
        let b = RecordKey::new("t", names(&["y", "x"]), vec![Value::Int(2), Value::Int(1)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn key_display_and_lookup() {
        let k = RecordKey::new("person", names(&["id", "tenant"]), vec![Value::Int(7), Value::from("eu")])
            .unwrap();
        assert_eq!(k.to_string(), "person{id=7, tenant=\"eu\"}");
        assert_eq!(k.value_of("tenant"), Some(&Value::from("eu")));
        assert_eq!(k.value_of("nope"), None);
    }

    // -----------------------------------------------------------------------
    // AssociationDescriptor
    // -----------------------------------------------------------------------

    #[test]
    fn composite_descriptor_contains_owner_columns() {
        let d = AssociationDescriptor::new("t", names(&["owner"]), names(&["owner", "elem"])).unwrap();
        assert!(!d.is_identifier_keyed());
        assert_eq!(d.to_string(), "t[owner] rows by [owner, elem]");
    }

    #[test]
    fn composite_descriptor_rejects_missing_owner_column() {
        let err = AssociationDescriptor::new("t", names(&["owner"]), names(&["other", "elem"]))
            .unwrap_err();
        assert!(matches!(err, TypeError::InvalidDescriptor { .. }));
    }

    #[test]
    fn composite_descriptor_rejects_degenerate_row_key() {
        assert!(AssociationDescriptor::new("t", names(&["a"]), names(&["a"])).is_err());
    }

    #[test]
    fn identifier_keyed_descriptor() {
        let d = AssociationDescriptor::identifier_keyed("t", names(&["owner"]), "row_id").unwrap();
        assert!(d.is_identifier_keyed());
        assert_eq!(d.row_key_columns(), &["row_id".to_string()]);
    }

    #[test]
    fn index_columns_must_be_row_key_columns() {
        let d = AssociationDescriptor::new("t", names(&["o"]), names(&["o", "pos"])).unwrap();
        assert!(d.clone().with_index_columns(names(&["pos"])).is_ok());
        assert!(d.with_index_columns(names(&["elem"])).is_err());
    }

    // -----------------------------------------------------------------------
    // AssociationKey
    // -----------------------------------------------------------------------

    #[test]
    fn association_key_checks_arity() {
        let d = Arc::new(AssociationDescriptor::new("t", names(&["o"]), names(&["o", "e"])).unwrap());
        assert!(AssociationKey::new(d.clone(), vec![]).is_err());
        let k = AssociationKey::new(d, vec![Value::Int(4)]).unwrap();
        assert_eq!(k.owner_key().to_string(), "t{o=4}");
    }
}
