//! The mutable column map backing one stored row.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::value::Value;

static NULL: Value = Value::Null;

/// A pending change to one column of a [`Record`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnOperation {
    Put(Value),
    PutNull,
    Remove,
}

/// One row: an ordered mapping from column name to value.
///
/// A record is the columns it was loaded with (the snapshot) plus a log of
/// column operations applied since. Operations are deduplicated per column:
/// the last write wins. Reads see the snapshot through the log.
///
/// Equality compares the effective column map, not how it was reached.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Record {
    snapshot: BTreeMap<String, Value>,
    operations: BTreeMap<String, ColumnOperation>,
}

impl Record {
    /// An empty record with no snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A record loaded with the given columns and no pending operations.
    pub fn from_snapshot(snapshot: BTreeMap<String, Value>) -> Self {
        Self {
            snapshot,
            operations: BTreeMap::new(),
        }
    }

    /// Read a column. Missing, removed, and null columns read as [`Value::Null`].
    pub fn get(&self, column: &str) -> &Value {
        match self.operations.get(column) {
            Some(ColumnOperation::Put(v)) => v,
            Some(ColumnOperation::PutNull | ColumnOperation::Remove) => &NULL,
            None => self.snapshot.get(column).unwrap_or(&NULL),
        }
    }

    /// Write a column. Writing [`Value::Null`] records a `PutNull`.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        let op = if value.is_null() {
            ColumnOperation::PutNull
        } else {
            ColumnOperation::Put(value)
        };
        self.operations.insert(column.into(), op);
    }

    /// Drop a column from the record.
    pub fn remove(&mut self, column: impl Into<String>) {
        self.operations.insert(column.into(), ColumnOperation::Remove);
    }

    /// Returns `true` if the column is present (possibly holding null).
    pub fn contains(&self, column: &str) -> bool {
        match self.operations.get(column) {
            Some(ColumnOperation::Remove) => false,
            Some(_) => true,
            None => self.snapshot.contains_key(column),
        }
    }

    /// Column names of the effective row, sorted.
    pub fn column_names(&self) -> Vec<String> {
        let mut names: BTreeSet<&String> = self.snapshot.keys().collect();
        for (column, op) in &self.operations {
            match op {
                ColumnOperation::Remove => {
                    names.remove(column);
                }
                _ => {
                    names.insert(column);
                }
            }
        }
        names.into_iter().cloned().collect()
    }

    /// Values of the given columns, in the given order.
    pub fn values_of<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Value> {
        columns.iter().map(|c| self.get(c.as_ref()).clone()).collect()
    }

    /// Returns `true` if there are no columns or every named column is null.
    pub fn all_null<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns.iter().all(|c| self.get(c.as_ref()).is_null())
    }

    /// Copy every column of `other` into this record.
    pub fn put_all(&mut self, other: &Record) {
        for (column, value) in other.columns() {
            self.put(column, value);
        }
    }

    /// Pending column operations, ordered by column name.
    pub fn operations(&self) -> impl Iterator<Item = (&str, &ColumnOperation)> {
        self.operations.iter().map(|(c, op)| (c.as_str(), op))
    }

    /// Returns `true` if the record has operations not yet folded into the snapshot.
    pub fn is_dirty(&self) -> bool {
        !self.operations.is_empty()
    }

    /// The snapshot the record was loaded with.
    pub fn snapshot(&self) -> &BTreeMap<String, Value> {
        &self.snapshot
    }

    /// The effective column map.
    pub fn columns(&self) -> BTreeMap<String, Value> {
        let mut columns = self.snapshot.clone();
        for (column, op) in &self.operations {
            match op {
                ColumnOperation::Put(v) => {
                    columns.insert(column.clone(), v.clone());
                }
                ColumnOperation::PutNull => {
                    columns.insert(column.clone(), Value::Null);
                }
                ColumnOperation::Remove => {
                    columns.remove(column);
                }
            }
        }
        columns
    }

    /// Fold the operation log into the snapshot.
    pub fn committed(&self) -> Self {
        Self::from_snapshot(self.columns())
    }

    pub fn len(&self) -> usize {
        self.column_names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns()
    }
}

impl Eq for Record {}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_snapshot(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
