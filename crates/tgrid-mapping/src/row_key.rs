//! Row-key column selection for association rows.
//!
//! The columns chosen here are the row-key shape every other component must
//! reproduce exactly, so selection happens once, when the mapping is built.

use serde::{Deserialize, Serialize};
use tgrid_types::{Record, RowKey, TypeResult};

use crate::error::{MappingError, MappingResult};

/// Static shape flags of a collection that drive row-key selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeFlags {
    pub has_identifier: bool,
    pub has_index: bool,
    pub index_formula: bool,
    pub one_to_many: bool,
    pub element_formula: bool,
}

impl ShapeFlags {
    /// Returns `true` if the index columns identify a row.
    ///
    /// Only a real (non-formula) index on a collection table qualifies; a
    /// one-to-many stores the index on the target entity record instead.
    pub fn keyed_by_index(&self) -> bool {
        !self.has_identifier && !self.one_to_many && self.has_index && !self.index_formula
    }

    /// Returns `true` if the element columns identify a row.
    pub fn keyed_by_element(&self) -> bool {
        !self.has_identifier && !self.keyed_by_index()
    }
}

/// Builds the [`RowKey`] of an association row from its record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowKeyBuilder {
    table: String,
    columns: Vec<String>,
    index_columns: Vec<String>,
}

impl RowKeyBuilder {
    /// Select row-key columns for a collection.
    ///
    /// 1. An identifier column alone is the key.
    /// 2. Otherwise the owner key columns come first, followed by
    /// 3. the index columns when the collection is keyed by index, or
    /// 4. the element columns.
    ///
    /// A formula element that would become part of the key is rejected.
    pub fn for_collection(
        table: &str,
        key_columns: &[String],
        identifier_column: Option<&str>,
        index_columns: &[String],
        element_columns: &[String],
        flags: ShapeFlags,
    ) -> MappingResult<Self> {
        if let Some(identifier) = identifier_column.filter(|_| flags.has_identifier) {
            return Ok(Self {
                table: table.to_string(),
                columns: vec![identifier.to_string()],
                index_columns: Vec::new(),
            });
        }

        let mut columns = key_columns.to_vec();
        let mut selected_index = Vec::new();
        if flags.keyed_by_index() {
            columns.extend(index_columns.iter().cloned());
            selected_index = index_columns.to_vec();
        } else {
            if flags.element_formula {
                return Err(MappingError::unsupported(
                    table,
                    "a formula element cannot be part of a row key",
                ));
            }
            columns.extend(element_columns.iter().cloned());
        }

        Ok(Self {
            table: table.to_string(),
            columns,
            index_columns: selected_index,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row-key columns in key order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The subset of [`columns`](Self::columns) taken from the collection index.
    pub fn index_columns(&self) -> &[String] {
        &self.index_columns
    }

    /// Build the row key of `record`. A pure function of the builder and the record.
    pub fn build(&self, record: &Record) -> TypeResult<RowKey> {
        RowKey::new(
            self.table.clone(),
            self.columns.clone(),
            record.values_of(&self.columns),
        )
    }
}

#[cfg(test)]
mod tests {
    use tgrid_types::Value;

    use super::*;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn builder(id: Option<&str>, flags: ShapeFlags) -> MappingResult<RowKeyBuilder> {
        RowKeyBuilder::for_collection(
            "tags",
            &names(&["owner_id"]),
            id,
            &names(&["position"]),
            &names(&["tag"]),
            flags,
        )
    }

    fn row() -> Record {
        [
            ("owner_id", Value::Int(1)),
            ("position", Value::Int(0)),
            ("tag", Value::from("x")),
            ("row_id", Value::Int(99)),
        ]
        .into_iter()
        .collect()
    }

    // -----------------------------------------------------------------------
    // Column selection
    // -----------------------------------------------------------------------

    #[test]
    fn identifier_alone_is_the_key() {
        let flags = ShapeFlags {
            has_identifier: true,
            has_index: true,
            ..Default::default()
        };
        let b = builder(Some("row_id"), flags).unwrap();
        assert_eq!(b.columns(), &["row_id".to_string()]);
        assert_eq!(b.build(&row()).unwrap().column_values(), &[Value::Int(99)]);
    }

    #[test]
    fn indexed_collection_uses_index() {
        let flags = ShapeFlags {
            has_index: true,
            ..Default::default()
        };
        let b = builder(None, flags).unwrap();
        assert_eq!(b.columns(), names(&["owner_id", "position"]).as_slice());
        assert_eq!(b.index_columns(), &["position".to_string()]);
    }

    #[test]
    fn one_to_many_ignores_index() {
        let flags = ShapeFlags {
            has_index: true,
            one_to_many: true,
            ..Default::default()
        };
        let b = builder(None, flags).unwrap();
        assert_eq!(b.columns(), names(&["owner_id", "tag"]).as_slice());
        assert!(b.index_columns().is_empty());
    }

    #[test]
    fn formula_index_falls_back_to_element() {
        let flags = ShapeFlags {
            has_index: true,
            index_formula: true,
            ..Default::default()
        };
        let b = builder(None, flags).unwrap();
        assert_eq!(b.columns(), names(&["owner_id", "tag"]).as_slice());
    }

    #[test]
    fn bag_uses_element() {
        let b = builder(None, ShapeFlags::default()).unwrap();
        let key = b.build(&row()).unwrap();
        assert_eq!(key.to_string(), "tags{owner_id=1, tag=\"x\"}");
    }

    #[test]
    fn formula_element_in_key_is_rejected() {
        let flags = ShapeFlags {
            element_formula: true,
            ..Default::default()
        };
        let err = builder(None, flags).unwrap_err();
        assert!(matches!(err, MappingError::UnsupportedShape { .. }));
    }

    #[test]
    fn formula_element_is_fine_when_indexed() {
        let flags = ShapeFlags {
            has_index: true,
            element_formula: true,
            ..Default::default()
        };
        assert!(builder(None, flags).is_ok());
    }

    #[test]
    fn missing_columns_build_as_null() {
        let b = builder(None, ShapeFlags::default()).unwrap();
        let key = b.build(&Record::new()).unwrap();
        assert_eq!(key.column_values(), &[Value::Null, Value::Null]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn flags() -> impl Strategy<Value = ShapeFlags> {
            (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
                |(has_identifier, has_index, index_formula, one_to_many)| ShapeFlags {
                    has_identifier,
                    has_index,
                    index_formula,
                    one_to_many,
                    element_formula: false,
                },
            )
        }

        proptest! {
            #[test]
            fn build_is_deterministic(
                flags in flags(),
                owner in any::<i64>(),
                position in any::<i64>(),
                tag in "[a-z]{0,8}",
                row_id in any::<i64>(),
            ) {
                let record: Record = [
                    ("owner_id", Value::Int(owner)),
                    ("position", Value::Int(position)),
                    ("tag", Value::from(tag.as_str())),
                    ("row_id", Value::Int(row_id)),
                ]
                .into_iter()
                .collect();

                let a = builder(Some("row_id"), flags).unwrap();
                let b = builder(Some("row_id"), flags).unwrap();
                prop_assert_eq!(&a, &b);
                prop_assert_eq!(a.build(&record).unwrap(), b.build(&record.clone()).unwrap());

                let key = a.build(&record).unwrap();
                prop_assert_eq!(key.column_names(), a.columns());
                if !flags.has_identifier {
                    prop_assert_eq!(key.column_names()[0].as_str(), "owner_id");
                }
            }
        }
    }
}
