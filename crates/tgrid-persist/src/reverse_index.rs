//! Reverse indexes for lookup by unique key.
//!
//! A to-one or unique property owns an auxiliary association in the entity's
//! table. It is keyed by the property's column values and holds one row per
//! entity currently pointing at them, so an owner can be found without a join.

use std::sync::Arc;

use tgrid_mapping::{EntityMetadata, Identifiable, PropertyDescriptor};
use tgrid_store::{AssociationStore, TupleStore};
use tgrid_types::{AssociationDescriptor, AssociationKey, FieldValue, Record, RowKey, Value};
use tracing::trace;

use crate::error::{PersistError, PersistResult};

/// Keeps reverse-index entries of one entity's properties in step with its record.
///
/// Every add and remove is written to the store immediately, so callers get
/// a remove-then-add order per property.
pub struct ReverseIndexMaintainer<'a> {
    store: &'a dyn TupleStore,
    entity: &'a EntityMetadata,
}

impl<'a> ReverseIndexMaintainer<'a> {
    pub fn new(store: &'a dyn TupleStore, entity: &'a EntityMetadata) -> Self {
        Self { store, entity }
    }

    fn descriptor(&self, property: &PropertyDescriptor) -> PersistResult<&'a Arc<AssociationDescriptor>> {
        self.entity.reverse_index(&property.name).ok_or_else(|| {
            PersistError::unsupported(
                format!("{}.{}", self.entity.name(), property.name),
                "property has no reverse index",
            )
        })
    }

    /// The entry `record` implies for `property`, or `None` when every
    /// indexed column is null.
    fn entry(
        &self,
        property: &PropertyDescriptor,
        id: &FieldValue,
        record: &Record,
    ) -> PersistResult<Option<(AssociationKey, RowKey, Record)>> {
        if record.all_null(&property.columns) {
            return Ok(None);
        }
        let descriptor = self.descriptor(property)?;
        let id_columns = self.entity.identifier_columns();
        let id_values = id.to_columns(id_columns.len())?;
        let fk_values = record.values_of(&property.columns);

        let key = AssociationKey::new(Arc::clone(descriptor), fk_values.clone())?;
        let row_values: Vec<Value> = id_values.iter().chain(fk_values.iter()).cloned().collect();
        let row_key = RowKey::new(
            descriptor.table(),
            descriptor.row_key_columns().to_vec(),
            row_values.clone(),
        )?;
        let mut entry = Record::new();
        for (column, value) in descriptor.row_key_columns().iter().zip(row_values) {
            entry.put(column.clone(), value);
        }
        Ok(Some((key, row_key, entry)))
    }

    /// Drop the entry implied by `record` (the state before an overwrite).
    pub fn remove(&self, property: &PropertyDescriptor, id: &FieldValue, record: &Record) -> PersistResult<bool> {
        let Some((key, row_key, _)) = self.entry(property, id, record)? else {
            return Ok(false);
        };
        let Some(mut association) = self.store.get_association(&key)? else {
            return Ok(false);
        };
        if association.remove(&row_key).is_none() {
            return Ok(false);
        }
        trace!(property = %property.name, row = %row_key, "reverse index remove");
        flush(self.store, &association)?;
        Ok(true)
    }

    /// Register the entry implied by `record` (the state after an overwrite).
    pub fn add(&self, property: &PropertyDescriptor, id: &FieldValue, record: &Record) -> PersistResult<bool> {
        let Some((key, row_key, entry)) = self.entry(property, id, record)? else {
            return Ok(false);
        };
        let mut association = self.store.get_or_create_association(&key)?;
        trace!(property = %property.name, row = %row_key, "reverse index add");
        association.put(row_key, entry);
        flush(self.store, &association)?;
        Ok(true)
    }

    /// Identifiers of every entity whose `property` currently holds `value`.
    pub fn lookup(&self, property: &PropertyDescriptor, value: &FieldValue) -> PersistResult<Vec<FieldValue>> {
        let descriptor = self.descriptor(property)?;
        let key = AssociationKey::new(
            Arc::clone(descriptor),
            value.to_columns(property.columns.len())?,
        )?;
        let Some(association) = self.store.get_association(&key)? else {
            return Ok(Vec::new());
        };
        let id_columns = self.entity.identifier_columns();
        Ok(association
            .iter()
            .map(|(_, row)| FieldValue::from_columns(row.values_of(id_columns)))
            .collect())
    }
}

/// Write an association back, removing it once it has no rows left.
pub(crate) fn flush(store: &dyn TupleStore, association: &AssociationStore) -> PersistResult<()> {
    if association.is_empty() {
        store.remove_association(association.key())?;
    } else {
        store.update_association(association)?;
    }
    Ok(())
}
