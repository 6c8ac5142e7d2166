//! Collection persistence: the rows of one association instance.

use std::sync::Arc;

use tgrid_mapping::{CollectionMetadata, RowLocatorKind};
use tgrid_store::{AssociationStore, TupleStore};
use tgrid_types::{FieldValue, Record, RowKey, Value};
use tracing::{debug, trace};

use crate::error::{PersistError, PersistResult};
use crate::reverse_index::flush;
use crate::sync::SyncEngine;

/// One logical element of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionEntry {
    /// Surrogate row identifier, for collections that have one.
    pub identifier: Option<Value>,
    /// List position or map key, for indexed collections. Unshifted.
    pub index: Option<FieldValue>,
    pub element: FieldValue,
}

impl CollectionEntry {
    pub fn of(element: impl Into<FieldValue>) -> Self {
        Self {
            identifier: None,
            index: None,
            element: element.into(),
        }
    }

    pub fn at(mut self, index: impl Into<FieldValue>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<Value>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// The locator that finds this entry in a collection located by `kind`.
    pub fn locator(&self, kind: RowLocatorKind) -> Option<RowLocator> {
        match kind {
            RowLocatorKind::Identifier => self.identifier.clone().map(RowLocator::Identifier),
            RowLocatorKind::Index => self.index.clone().map(RowLocator::Index),
            RowLocatorKind::Element => Some(RowLocator::Element(self.element.clone())),
        }
    }
}

/// Finds one stored row of a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowLocator {
    Identifier(Value),
    Index(FieldValue),
    Element(FieldValue),
}

impl RowLocator {
    pub fn kind(&self) -> RowLocatorKind {
        match self {
            Self::Identifier(_) => RowLocatorKind::Identifier,
            Self::Index(_) => RowLocatorKind::Index,
            Self::Element(_) => RowLocatorKind::Element,
        }
    }
}

/// A new element value for the row found by `locator`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementUpdate {
    pub locator: RowLocator,
    pub element: FieldValue,
}

/// Persists the rows of one collection role.
///
/// Every call fetches the owner's association once, applies its rows,
/// mirrors each change through a [`SyncEngine`], and flushes both at the end.
pub struct CollectionPersister {
    meta: Arc<CollectionMetadata>,
    store: Arc<dyn TupleStore>,
}

impl CollectionPersister {
    pub fn new(meta: Arc<CollectionMetadata>, store: Arc<dyn TupleStore>) -> Self {
        Self { meta, store }
    }

    pub fn metadata(&self) -> &CollectionMetadata {
        &self.meta
    }

    /// Add rows for new elements.
    pub fn insert_rows(&self, owner_id: &FieldValue, entries: &[CollectionEntry]) -> PersistResult<usize> {
        self.write_rows(owner_id, entries, "insert rows")
    }

    /// Write every element of a freshly created collection.
    pub fn recreate(&self, owner_id: &FieldValue, entries: &[CollectionEntry]) -> PersistResult<usize> {
        self.write_rows(owner_id, entries, "recreate")
    }

    /// Replace the element of existing rows.
    pub fn update_rows(&self, owner_id: &FieldValue, updates: &[ElementUpdate]) -> PersistResult<usize> {
        if self.meta.is_inverse() || !self.meta.element().updatable {
            debug!(role = self.meta.role(), "update rows skipped");
            return Ok(0);
        }
        let key = self.meta.association_key(owner_id)?;
        let mut association = self.store.get_or_create_association(&key)?;
        let mut sync = SyncEngine::new(self.store.as_ref(), &self.meta);

        for update in updates {
            let old_key = self.locate(owner_id, &update.locator)?;
            let existing = self.existing(&association, &old_key)?;

            let mut row = existing.clone();
            self.write_columns(&mut row, &self.meta.element().columns, &update.element)?;
            let new_key = self.meta.row_key().build(&row)?;
            if new_key != old_key && association.contains(&new_key) {
                return Err(PersistError::consistency(
                    self.meta.table(),
                    format!("{} already has a row {new_key}", self.meta.role()),
                ));
            }
            trace!(old = %old_key, new = %new_key, "update row");
            sync.remove(&existing)?;
            association.remove(&old_key);
            association.put(new_key, row.clone());
            sync.add(&row)?;
        }

        flush(self.store.as_ref(), &association)?;
        sync.flush()?;
        debug!(role = self.meta.role(), owner = %owner_id, rows = updates.len(), "update rows");
        Ok(updates.len())
    }

    /// Remove the rows found by `locators`.
    pub fn delete_rows(&self, owner_id: &FieldValue, locators: &[RowLocator]) -> PersistResult<usize> {
        if self.meta.is_inverse() || !self.meta.row_delete_enabled() {
            debug!(role = self.meta.role(), "delete rows skipped");
            return Ok(0);
        }
        let key = self.meta.association_key(owner_id)?;
        let mut association = self.store.get_or_create_association(&key)?;
        let mut sync = SyncEngine::new(self.store.as_ref(), &self.meta);

        for locator in locators {
            let row_key = self.locate(owner_id, locator)?;
            let Some(row) = association.remove(&row_key) else {
                return Err(self.missing_row(&row_key));
            };
            trace!(row = %row_key, "delete row");
            sync.remove(&row)?;
        }

        flush(self.store.as_ref(), &association)?;
        sync.flush()?;
        debug!(role = self.meta.role(), owner = %owner_id, rows = locators.len(), "delete rows");
        Ok(locators.len())
    }

    /// Remove the whole collection of `owner_id`.
    pub fn remove(&self, owner_id: &FieldValue) -> PersistResult<usize> {
        if self.meta.is_inverse() || !self.meta.row_delete_enabled() {
            debug!(role = self.meta.role(), "remove skipped");
            return Ok(0);
        }
        let key = self.meta.association_key(owner_id)?;
        let Some(mut association) = self.store.get_association(&key)? else {
            return Ok(0);
        };
        let removed = association.len();

        if self.meta.shape().needs_sync() {
            let mut sync = SyncEngine::new(self.store.as_ref(), &self.meta);
            for (_, row) in association.iter() {
                sync.remove(row)?;
            }
            association.clear();
            flush(self.store.as_ref(), &association)?;
            sync.flush()?;
        } else {
            association.clear();
            flush(self.store.as_ref(), &association)?;
        }

        debug!(role = self.meta.role(), owner = %owner_id, rows = removed, "remove collection");
        Ok(removed)
    }

    /// Number of stored rows. A collection never written has none.
    pub fn size(&self, owner_id: &FieldValue) -> PersistResult<usize> {
        let key = self.meta.association_key(owner_id)?;
        Ok(self.store.get_association(&key)?.map_or(0, |a| a.len()))
    }

    /// Every stored row of `owner_id`, in row-key order.
    pub fn read_rows(&self, owner_id: &FieldValue) -> PersistResult<Vec<CollectionEntry>> {
        let key = self.meta.association_key(owner_id)?;
        let Some(association) = self.store.get_association(&key)? else {
            return Ok(Vec::new());
        };
        association
            .iter()
            .map(|(_, row)| self.read_entry(row))
            .collect()
    }

    fn write_rows(&self, owner_id: &FieldValue, entries: &[CollectionEntry], operation: &str) -> PersistResult<usize> {
        if self.meta.is_inverse() || !self.meta.row_insert_enabled() {
            debug!(role = self.meta.role(), operation, "skipped");
            return Ok(0);
        }
        let key = self.meta.association_key(owner_id)?;
        let mut association = self.store.get_or_create_association(&key)?;
        let mut sync = SyncEngine::new(self.store.as_ref(), &self.meta);

        for entry in entries {
            let row = self.row_record(owner_id, entry)?;
            let row_key = self.meta.row_key().build(&row)?;
            trace!(row = %row_key, operation, "write row");
            association.put(row_key, row.clone());
            sync.add(&row)?;
        }

        flush(self.store.as_ref(), &association)?;
        sync.flush()?;
        debug!(role = self.meta.role(), owner = %owner_id, rows = entries.len(), operation);
        Ok(entries.len())
    }

    /// The association row for `entry`, with the index shifted by the base.
    fn row_record(&self, owner_id: &FieldValue, entry: &CollectionEntry) -> PersistResult<Record> {
        let mut row = Record::new();
        self.write_columns(&mut row, self.meta.key_columns(), owner_id)?;
        if let Some(column) = self.meta.identifier_column() {
            let Some(identifier) = &entry.identifier else {
                return Err(PersistError::unsupported(self.meta.role(), "entry has no row identifier"));
            };
            row.put(column, identifier.clone());
        }
        if let Some(index) = self.meta.index() {
            let Some(value) = &entry.index else {
                return Err(PersistError::unsupported(self.meta.role(), "entry has no index"));
            };
            let stored = self.store_index(value, index.base)?;
            self.write_columns(&mut row, &index.columns, &stored)?;
        }
        self.write_columns(&mut row, &self.meta.element().columns, &entry.element)?;
        Ok(row)
    }

    fn read_entry(&self, row: &Record) -> PersistResult<CollectionEntry> {
        let index = match self.meta.index() {
            Some(i) => Some(self.read_index(&FieldValue::from_columns(row.values_of(&i.columns)), i.base)?),
            None => None,
        };
        Ok(CollectionEntry {
            identifier: self.meta.identifier_column().map(|c| row.get(c).clone()),
            index,
            element: FieldValue::from_columns(row.values_of(&self.meta.element().columns)),
        })
    }

    /// The row key `locator` designates.
    fn locate(&self, owner_id: &FieldValue, locator: &RowLocator) -> PersistResult<RowKey> {
        if locator.kind() != self.meta.locator() {
            return Err(PersistError::unsupported(
                self.meta.role(),
                format!("rows are located by {:?}, not {:?}", self.meta.locator(), locator.kind()),
            ));
        }
        let mut located = Record::new();
        self.write_columns(&mut located, self.meta.key_columns(), owner_id)?;
        match locator {
            RowLocator::Identifier(id) => {
                if let Some(column) = self.meta.identifier_column() {
                    located.put(column, id.clone());
                }
            }
            RowLocator::Index(value) => {
                if let Some(index) = self.meta.index() {
                    let stored = self.store_index(value, index.base)?;
                    self.write_columns(&mut located, &index.columns, &stored)?;
                }
            }
            RowLocator::Element(value) => {
                self.write_columns(&mut located, &self.meta.element().columns, value)?;
            }
        }
        Ok(self.meta.row_key().build(&located)?)
    }

    fn existing(&self, association: &AssociationStore, row_key: &RowKey) -> PersistResult<Record> {
        association
            .get(row_key)
            .cloned()
            .ok_or_else(|| self.missing_row(row_key))
    }

    fn missing_row(&self, row_key: &RowKey) -> PersistError {
        PersistError::consistency(
            self.meta.table(),
            format!("{} has no row {row_key}", self.meta.role()),
        )
    }

    fn write_columns(&self, row: &mut Record, columns: &[String], value: &FieldValue) -> PersistResult<()> {
        for (column, v) in columns.iter().zip(value.to_columns(columns.len())?) {
            row.put(column.clone(), v);
        }
        Ok(())
    }

    /// The stored form of a list position: `position + base`.
    fn store_index(&self, value: &FieldValue, base: i64) -> PersistResult<FieldValue> {
        self.offset(value, base, i64::checked_add)
    }

    /// The list position of a stored index: `stored - base`.
    fn read_index(&self, value: &FieldValue, base: i64) -> PersistResult<FieldValue> {
        self.offset(value, base, i64::checked_sub)
    }

    /// Integer indexes are offset by `base`; other index values pass through.
    fn offset(
        &self,
        value: &FieldValue,
        base: i64,
        op: fn(i64, i64) -> Option<i64>,
    ) -> PersistResult<FieldValue> {
        match value {
            FieldValue::Single(Value::Int(n)) if base != 0 => op(*n, base)
                .map(|n| FieldValue::Single(Value::Int(n)))
                .ok_or_else(|| {
                    PersistError::unsupported(
                        self.meta.role(),
                        format!("index {n} overflows with base {base}"),
                    )
                }),
            other => Ok(other.clone()),
        }
    }
}
