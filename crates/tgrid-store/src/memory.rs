use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tgrid_types::{AssociationKey, EntityKey, Record, RowKey, Value};
use tracing::trace;

use crate::association::AssociationStore;
use crate::error::{StoreError, StoreResult};
use crate::traits::TupleStore;

type Columns = BTreeMap<String, Value>;

/// Write/removal counters of an [`InMemoryTupleStore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub record_writes: u64,
    pub record_removals: u64,
    pub association_writes: u64,
    pub association_removals: u64,
}

/// In-memory, HashMap-based tuple store.
///
/// Intended for tests and embedding. Records and association rows are held as
/// plain column maps behind `RwLock`s; reads hand out fresh copies and writes
/// fold a record's operation log into the stored columns.
pub struct InMemoryTupleStore {
    records: RwLock<HashMap<EntityKey, Columns>>,
    associations: RwLock<HashMap<AssociationKey, BTreeMap<RowKey, Columns>>>,
    record_writes: AtomicU64,
    record_removals: AtomicU64,
    association_writes: AtomicU64,
    association_removals: AtomicU64,
}

impl InMemoryTupleStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            associations: RwLock::new(HashMap::new()),
            record_writes: AtomicU64::new(0),
            record_removals: AtomicU64::new(0),
            association_writes: AtomicU64::new(0),
            association_removals: AtomicU64::new(0),
        }
    }

    /// Number of entity records currently stored.
    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    /// Number of associations currently stored.
    pub fn association_count(&self) -> StoreResult<usize> {
        Ok(self.associations.read().map_err(poisoned)?.len())
    }

    /// Sorted keys of every stored record.
    pub fn record_keys(&self) -> StoreResult<Vec<EntityKey>> {
        let map = self.records.read().map_err(poisoned)?;
        let mut keys: Vec<EntityKey> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Sorted keys of every stored association.
    pub fn association_keys(&self) -> StoreResult<Vec<AssociationKey>> {
        let map = self.associations.read().map_err(poisoned)?;
        let mut keys: Vec<AssociationKey> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Write/removal counters since creation or the last [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            record_writes: self.record_writes.load(Ordering::Relaxed),
            record_removals: self.record_removals.load(Ordering::Relaxed),
            association_writes: self.association_writes.load(Ordering::Relaxed),
            association_removals: self.association_removals.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        self.record_writes.store(0, Ordering::Relaxed);
        self.record_removals.store(0, Ordering::Relaxed);
        self.association_writes.store(0, Ordering::Relaxed);
        self.association_removals.store(0, Ordering::Relaxed);
    }

    /// Remove everything from the store.
    pub fn clear(&self) -> StoreResult<()> {
        self.records.write().map_err(poisoned)?.clear();
        self.associations.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

impl Default for InMemoryTupleStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

impl TupleStore for InMemoryTupleStore {
    fn get_record(&self, key: &EntityKey) -> StoreResult<Option<Record>> {
        let map = self.records.read().map_err(poisoned)?;
        Ok(map.get(key).cloned().map(Record::from_snapshot))
    }

    fn update_record(&self, record: &Record, key: &EntityKey) -> StoreResult<()> {
        trace!(key = %key, columns = record.len(), "update record");
        let mut map = self.records.write().map_err(poisoned)?;
        map.insert(key.clone(), record.columns());
        self.record_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_record(&self, key: &EntityKey) -> StoreResult<bool> {
        let mut map = self.records.write().map_err(poisoned)?;
        let existed = map.remove(key).is_some();
        self.record_removals.fetch_add(1, Ordering::Relaxed);
        Ok(existed)
    }

    fn get_association(&self, key: &AssociationKey) -> StoreResult<Option<AssociationStore>> {
        let map = self.associations.read().map_err(poisoned)?;
        Ok(map.get(key).map(|rows| {
            let rows = rows
                .iter()
                .map(|(k, columns)| (k.clone(), Record::from_snapshot(columns.clone())))
                .collect();
            AssociationStore::from_rows(key.clone(), rows)
        }))
    }

    fn update_association(&self, association: &AssociationStore) -> StoreResult<()> {
        trace!(key = %association.key(), rows = association.len(), "update association");
        let rows = association
            .iter()
            .map(|(k, record)| (k.clone(), record.columns()))
            .collect();
        let mut map = self.associations.write().map_err(poisoned)?;
        map.insert(association.key().clone(), rows);
        self.association_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_association(&self, key: &AssociationKey) -> StoreResult<bool> {
        let mut map = self.associations.write().map_err(poisoned)?;
        let existed = map.remove(key).is_some();
        self.association_removals.fetch_add(1, Ordering::Relaxed);
        Ok(existed)
    }
}

impl std::fmt::Debug for InMemoryTupleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let records = self.records.read().map(|m| m.len()).unwrap_or(0);
        let associations = self.associations.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryTupleStore")
            .field("record_count", &records)
            .field("association_count", &associations)
            .finish()
    }
}
