//! In-memory view of one association instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tgrid_types::{AssociationKey, Record, RowKey};

/// A change applied to an [`AssociationStore`] since it was loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociationOperation {
    Put(RowKey),
    Remove(RowKey),
    Clear,
}

/// The rows of one association instance, keyed by [`RowKey`] and kept in key order.
///
/// An association store is fetched from the [`TupleStore`](crate::TupleStore)
/// at the start of a logical operation, mutated in memory, and written back
/// (or discarded) at the end. It logs the operations applied to it so
/// backends that store deltas can replay them.
#[derive(Clone, Debug)]
pub struct AssociationStore {
    key: AssociationKey,
    rows: BTreeMap<RowKey, Record>,
    operations: Vec<AssociationOperation>,
}

impl AssociationStore {
    /// A new, empty association.
    pub fn new(key: AssociationKey) -> Self {
        Self {
            key,
            rows: BTreeMap::new(),
            operations: Vec::new(),
        }
    }

    /// An association loaded with existing rows and no pending operations.
    pub fn from_rows(key: AssociationKey, rows: BTreeMap<RowKey, Record>) -> Self {
        Self {
            key,
            rows,
            operations: Vec::new(),
        }
    }

    pub fn key(&self) -> &AssociationKey {
        &self.key
    }

    pub fn get(&self, row_key: &RowKey) -> Option<&Record> {
        self.rows.get(row_key)
    }

    pub fn contains(&self, row_key: &RowKey) -> bool {
        self.rows.contains_key(row_key)
    }

    /// Insert or replace the row under `row_key`.
    pub fn put(&mut self, row_key: RowKey, record: Record) {
        self.operations.push(AssociationOperation::Put(row_key.clone()));
        self.rows.insert(row_key, record);
    }

    /// Remove the row under `row_key`, returning it if present.
    pub fn remove(&mut self, row_key: &RowKey) -> Option<Record> {
        let removed = self.rows.remove(row_key);
        if removed.is_some() {
            self.operations
                .push(AssociationOperation::Remove(row_key.clone()));
        }
        removed
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.operations.push(AssociationOperation::Clear);
    }

    /// Row keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.keys()
    }

    /// Rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &Record)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Operations applied since load, in application order.
    pub fn operations(&self) -> &[AssociationOperation] {
        &self.operations
    }

    pub fn is_dirty(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Consume the store, yielding its rows.
    pub fn into_rows(self) -> BTreeMap<RowKey, Record> {
        self.rows
    }
}

impl PartialEq for AssociationStore {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.rows == other.rows
    }
}

impl Eq for AssociationStore {}
