//! Propagation of association row changes to the other side.
//!
//! An association row added to or removed from a collection is mirrored onto
//! the element side: the target entity's own record when the foreign key is
//! embedded there, or the target's mirrored association when the collection
//! has its own table. Targets are fetched once, mutated in memory, and
//! written back together by [`SyncEngine::flush`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tgrid_mapping::{AssociationShape, CollectionMetadata, EntityRef};
use tgrid_store::{AssociationStore, TupleStore};
use tgrid_types::{AssociationDescriptor, AssociationKey, EntityKey, Record, RowKey, Value};
use tracing::{debug, trace};

use crate::error::{PersistError, PersistResult};
use crate::reverse_index::flush as flush_association;

/// Number of store writes done by one [`SyncEngine::flush`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncFlush {
    pub records: usize,
    pub associations: usize,
}

/// Buffers the element-side effects of one collection operation.
pub struct SyncEngine<'a> {
    store: &'a dyn TupleStore,
    collection: &'a CollectionMetadata,
    records: BTreeMap<EntityKey, Option<Record>>,
    associations: BTreeMap<AssociationKey, Option<AssociationStore>>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a dyn TupleStore, collection: &'a CollectionMetadata) -> Self {
        Self {
            store,
            collection,
            records: BTreeMap::new(),
            associations: BTreeMap::new(),
        }
    }

    /// Mirror the addition of `row`.
    pub fn add(&mut self, row: &Record) -> PersistResult<()> {
        match self.collection.shape() {
            AssociationShape::NonEntity => Ok(()),
            AssociationShape::EmbeddedForeignKey { target } => {
                let key = target_key(target, self.collection, row)?;
                match self.record(&key)? {
                    Some(record) => {
                        trace!(target = %key, "sync add: copy row into target");
                        record.put_all(row);
                    }
                    None => debug!(target = %key, "sync add: target entity is gone; skipping"),
                }
                Ok(())
            }
            AssociationShape::AssociationTable { mirror, .. } => {
                let (key, row_key) = mirror_keys(mirror, self.collection, row)?;
                trace!(mirror = %key, row = %row_key, "sync add: mirror row");
                let association = self.association(&key, true)?;
                if let Some(association) = association {
                    association.put(row_key, row.clone());
                }
                Ok(())
            }
        }
    }

    /// Mirror the removal of `row`.
    pub fn remove(&mut self, row: &Record) -> PersistResult<()> {
        match self.collection.shape() {
            AssociationShape::NonEntity => Ok(()),
            AssociationShape::EmbeddedForeignKey { target } => {
                if self.collection.identifier_column().is_some() {
                    return Err(PersistError::consistency(
                        self.collection.table(),
                        format!(
                            "{} carries a row identifier and cannot clear an embedded foreign key",
                            self.collection.role()
                        ),
                    ));
                }
                let key = target_key(target, self.collection, row)?;
                let mut cleared: Vec<String> = self.collection.key_columns().to_vec();
                if let Some(index) = self.collection.index() {
                    cleared.extend(index.columns.iter().cloned());
                }
                match self.record(&key)? {
                    Some(record) => {
                        trace!(target = %key, "sync remove: clear foreign key");
                        for column in cleared {
                            record.put(column, Value::Null);
                        }
                    }
                    None => debug!(target = %key, "sync remove: target entity is gone; skipping"),
                }
                Ok(())
            }
            AssociationShape::AssociationTable { mirror, .. } => {
                let (key, row_key) = mirror_keys(mirror, self.collection, row)?;
                let table = self.collection.table().to_string();
                let Some(association) = self.association(&key, false)? else {
                    return Err(PersistError::consistency(
                        table,
                        format!("mirrored association {key} is missing"),
                    ));
                };
                if association.remove(&row_key).is_none() {
                    return Err(PersistError::consistency(
                        table,
                        format!("mirrored row {row_key} is missing"),
                    ));
                }
                trace!(mirror = %key, row = %row_key, "sync remove: mirror row");
                Ok(())
            }
        }
    }

    /// Write every touched target back to the store, once each.
    pub fn flush(self) -> PersistResult<SyncFlush> {
        let mut flushed = SyncFlush::default();
        for (key, record) in self.records {
            if let Some(record) = record.filter(Record::is_dirty) {
                self.store.update_record(&record, &key)?;
                flushed.records += 1;
            }
        }
        for association in self.associations.into_values().flatten() {
            if association.is_dirty() {
                flush_association(self.store, &association)?;
                flushed.associations += 1;
            }
        }
        if flushed != SyncFlush::default() {
            debug!(
                role = self.collection.role(),
                records = flushed.records,
                associations = flushed.associations,
                "sync flushed"
            );
        }
        Ok(flushed)
    }

    fn record(&mut self, key: &EntityKey) -> PersistResult<Option<&mut Record>> {
        if !self.records.contains_key(key) {
            let fetched = self.store.get_record(key)?;
            self.records.insert(key.clone(), fetched);
        }
        Ok(self.records.get_mut(key).and_then(Option::as_mut))
    }

    fn association(
        &mut self,
        key: &AssociationKey,
        create: bool,
    ) -> PersistResult<Option<&mut AssociationStore>> {
        if !self.associations.contains_key(key) {
            let fetched = self.store.get_association(key)?;
            self.associations.insert(key.clone(), fetched);
        }
        let slot = match self.associations.get_mut(key) {
            Some(slot) => slot,
            None => return Ok(None),
        };
        if slot.is_none() && create {
            *slot = Some(self.store.create_association(key)?);
        }
        Ok(slot.as_mut())
    }
}

/// The key of the entity record the row's element columns point at.
fn target_key(target: &EntityRef, collection: &CollectionMetadata, row: &Record) -> PersistResult<EntityKey> {
    Ok(EntityKey::new(
        target.table.clone(),
        target.id_columns.clone(),
        row.values_of(&collection.element().columns),
    )?)
}

/// The mirrored association and row the element side keeps for `row`.
fn mirror_keys(
    mirror: &Arc<AssociationDescriptor>,
    collection: &CollectionMetadata,
    row: &Record,
) -> PersistResult<(AssociationKey, RowKey)> {
    let key = AssociationKey::new(
        Arc::clone(mirror),
        row.values_of(&collection.element().columns),
    )?;
    let row_key = RowKey::new(
        mirror.table(),
        mirror.row_key_columns().to_vec(),
        row.values_of(mirror.row_key_columns()),
    )?;
    Ok((key, row_key))
}
