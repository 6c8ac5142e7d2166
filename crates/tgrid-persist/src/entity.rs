//! Entity persistence: insert, update, delete and versioning of one entity's record.

use std::sync::Arc;

use tgrid_mapping::{
    DiscriminatorBearing, EntityMetadata, Identifiable, Mappings, OptimisticLockStyle,
    PropertyDescriptor, Versionable,
};
use tgrid_store::TupleStore;
use tgrid_types::{EntityKey, FieldValue, Record, Value};
use tracing::{debug, trace};

use crate::codec::RecordCodec;
use crate::error::{PersistError, PersistResult};
use crate::reverse_index::ReverseIndexMaintainer;
use crate::state::{EntityState, LoadedEntity};

/// Where a single entity operation stands.
///
/// An operation moves `NotFetched → Fetched → Mutated → Flushed`. It ends
/// at `Flushed` or at the first error; nothing is written before the flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationPhase {
    NotFetched,
    Fetched,
    Mutated,
    Flushed,
}

/// One fetch-modify-flush cycle against a single record.
struct EntityOperation<'a> {
    store: &'a dyn TupleStore,
    key: EntityKey,
    record: Option<Record>,
    phase: OperationPhase,
}

impl<'a> EntityOperation<'a> {
    fn new(store: &'a dyn TupleStore, key: EntityKey) -> Self {
        Self {
            store,
            key,
            record: None,
            phase: OperationPhase::NotFetched,
        }
    }

    fn fetch(&mut self) -> PersistResult<Option<&Record>> {
        debug_assert_eq!(self.phase, OperationPhase::NotFetched);
        self.record = self.store.get_record(&self.key)?;
        self.phase = OperationPhase::Fetched;
        trace!(key = %self.key, found = self.record.is_some(), "fetched");
        Ok(self.record.as_ref())
    }

    /// The fetched record, created empty when there was none.
    fn record_mut(&mut self) -> PersistResult<&mut Record> {
        self.phase = OperationPhase::Mutated;
        let record = match self.record.take() {
            Some(record) => record,
            None => self.store.create_record(&self.key)?,
        };
        Ok(self.record.insert(record))
    }

    fn flush(mut self) -> PersistResult<OperationPhase> {
        if let Some(record) = &self.record {
            self.store.update_record(record, &self.key)?;
        }
        self.phase = OperationPhase::Flushed;
        trace!(key = %self.key, "flushed");
        Ok(self.phase)
    }

    /// Flush by removing the record instead of writing it.
    fn remove(mut self) -> PersistResult<bool> {
        let existed = self.store.remove_record(&self.key)?;
        self.phase = OperationPhase::Flushed;
        trace!(key = %self.key, existed, "removed");
        Ok(existed)
    }
}

/// Optional checks and restrictions of an [`EntityPersister::update`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions<'a> {
    /// Names of the dirty properties. `None` updates every updatable property.
    pub dirty: Option<&'a [String]>,
    /// The version the caller loaded.
    pub old_version: Option<&'a Value>,
    /// The state the caller loaded, for `dirty`/`all` optimistic locking.
    pub old_state: Option<&'a EntityState>,
}

/// Persists one mapped entity.
pub struct EntityPersister {
    meta: Arc<EntityMetadata>,
    mappings: Arc<Mappings>,
    store: Arc<dyn TupleStore>,
}

impl EntityPersister {
    pub fn new(meta: Arc<EntityMetadata>, mappings: Arc<Mappings>, store: Arc<dyn TupleStore>) -> Self {
        Self {
            meta,
            mappings,
            store,
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.meta
    }

    fn codec(&self) -> RecordCodec<'_> {
        RecordCodec::new(&self.meta)
    }

    fn index(&self) -> ReverseIndexMaintainer<'_> {
        ReverseIndexMaintainer::new(self.store.as_ref(), &self.meta)
    }

    fn stale(&self, key: &EntityKey) -> PersistError {
        PersistError::StaleState {
            entity: self.meta.name().to_string(),
            key: key.to_string(),
        }
    }

    /// Store a new entity.
    pub fn insert(&self, id: &FieldValue, state: &EntityState) -> PersistResult<()> {
        let key = self.meta.entity_key(id)?;
        debug!(entity = self.meta.name(), key = %key, "insert");

        let mut op = EntityOperation::new(self.store.as_ref(), key);
        if op.fetch()?.is_some() {
            return Err(PersistError::DuplicateKey {
                entity: self.meta.name().to_string(),
                key: op.key.to_string(),
            });
        }
        let codec = self.codec();
        let index = self.index();
        let record = op.record_mut()?;
        codec.write_identifier(record, id)?;
        codec.write_discriminator(record);
        codec.dehydrate(record, id, state, |p| p.insertable, &index)?;
        op.flush()?;
        Ok(())
    }

    /// Write the updated properties of an existing entity.
    ///
    /// A missing record is recreated from the identifier, unless a version
    /// check rejects it first.
    pub fn update(&self, id: &FieldValue, state: &EntityState, options: UpdateOptions<'_>) -> PersistResult<()> {
        let key = self.meta.entity_key(id)?;
        let included = |p: &PropertyDescriptor| {
            p.updatable && options.dirty.map_or(true, |d| d.contains(&p.name))
        };
        debug!(entity = self.meta.name(), key = %key, "update");

        let mut op = EntityOperation::new(self.store.as_ref(), key.clone());
        let stored = op.fetch()?.cloned().unwrap_or_default();

        if let Some(version) = self.meta.version_property() {
            if self.meta.optimistic_lock() == OptimisticLockStyle::Version && included(version) {
                if let Some(expected) = options.old_version {
                    self.check_version(&key, &stored, expected)?;
                }
            }
        } else if self.meta.uses_state_comparison() {
            if let Some(old_state) = options.old_state {
                let all = self.meta.optimistic_lock() == OptimisticLockStyle::All;
                self.check_state(&key, &stored, old_state, |p| {
                    if all {
                        p.updatable
                    } else {
                        included(p)
                    }
                })?;
            }
        }

        let codec = self.codec();
        let index = self.index();
        let record = op.record_mut()?;
        if record.is_empty() {
            codec.write_identifier(record, id)?;
        }
        let written = codec.dehydrate(record, id, state, included, &index)?;
        trace!(entity = self.meta.name(), written, "properties updated");
        op.flush()?;
        Ok(())
    }

    /// Remove an entity and every reverse-index entry it registered.
    ///
    /// `version` is checked for versioned entities; `loaded_state` is
    /// compared for entities using state comparison.
    pub fn delete(
        &self,
        id: &FieldValue,
        version: Option<&Value>,
        loaded_state: Option<&EntityState>,
    ) -> PersistResult<()> {
        let key = self.meta.entity_key(id)?;
        debug!(entity = self.meta.name(), key = %key, "delete");

        let mut op = EntityOperation::new(self.store.as_ref(), key.clone());
        let Some(stored) = op.fetch()?.cloned() else {
            return Err(self.stale(&key));
        };

        if self.meta.uses_state_comparison() {
            if let Some(loaded) = loaded_state {
                self.check_state(&key, &stored, loaded, |_| true)?;
            }
        } else if self.meta.is_versioned() {
            if let Some(expected) = version {
                self.check_version(&key, &stored, expected)?;
            }
        }

        let index = self.index();
        for property in self.meta.properties().iter().filter(|p| p.has_reverse_index()) {
            index.remove(property, id, &stored)?;
        }
        op.remove()?;
        Ok(())
    }

    /// The stored version, or `None` when there is no record.
    pub fn get_current_version(&self, id: &FieldValue) -> PersistResult<Option<Value>> {
        let column = self.version_column()?;
        let key = self.meta.entity_key(id)?;
        Ok(self
            .store
            .get_record(&key)?
            .map(|record| record.get(column).clone()))
    }

    /// Check `current_version` against the store and write the next version.
    ///
    /// Returns the new version. A mismatch leaves the record untouched.
    pub fn force_version_increment(&self, id: &FieldValue, current_version: &Value) -> PersistResult<Value> {
        let column = self.version_column()?.to_string();
        let key = self.meta.entity_key(id)?;
        let next = self.meta.next_version(current_version)?;

        let mut op = EntityOperation::new(self.store.as_ref(), key.clone());
        let Some(stored) = op.fetch()?.cloned() else {
            return Err(self.stale(&key));
        };
        self.check_version(&key, &stored, current_version)?;

        debug!(entity = self.meta.name(), key = %key, next = %next, "force version increment");
        op.record_mut()?.put(column, next.clone());
        op.flush()?;
        Ok(next)
    }

    /// Fetch and hydrate an entity.
    ///
    /// Rows of a shared table are hydrated as the entity their discriminator names.
    pub fn load(&self, id: &FieldValue) -> PersistResult<Option<LoadedEntity>> {
        let key = self.meta.entity_key(id)?;
        let Some(record) = self.store.get_record(&key)? else {
            return Ok(None);
        };
        let concrete = self.concrete_entity(&record)?;
        let codec = RecordCodec::new(concrete);
        Ok(Some(LoadedEntity {
            entity: concrete.name().to_string(),
            id: codec.read_identifier(&record),
            state: codec.hydrate(&record),
        }))
    }

    /// The stored state of an entity, or `None` when it does not exist.
    pub fn database_snapshot(&self, id: &FieldValue) -> PersistResult<Option<EntityState>> {
        Ok(self.load(id)?.map(|loaded| loaded.state))
    }

    /// Load the entity whose to-one or unique `property` holds `value`.
    ///
    /// Several owners of a unique property mean the index diverged. Several
    /// owners of a plain to-one property are valid data, but no single entity
    /// answers the lookup, so they are reported as an unsupported lookup.
    pub fn load_by_unique_key(&self, property: &str, value: &FieldValue) -> PersistResult<Option<LoadedEntity>> {
        let descriptor = self
            .meta
            .property(property)
            .ok_or_else(|| PersistError::UnknownProperty {
                entity: self.meta.name().to_string(),
                property: property.to_string(),
            })?;
        let mut owners = self.index().lookup(descriptor, value)?;
        match owners.len() {
            0 => Ok(None),
            1 => self.load(&owners.remove(0)),
            n if !descriptor.unique => Err(PersistError::unsupported(
                format!("{}.{property}", self.meta.name()),
                format!("{n} entities hold {value}; the property is not unique"),
            )),
            n => Err(PersistError::consistency(
                self.meta.table(),
                format!("{n} entities share unique {}.{property} = {value}", self.meta.name()),
            )),
        }
    }

    fn version_column(&self) -> PersistResult<&str> {
        self.meta
            .version_column()
            .ok_or_else(|| PersistError::unsupported(self.meta.name(), "entity is not versioned"))
    }

    fn concrete_entity(&self, record: &Record) -> PersistResult<&EntityMetadata> {
        let own = self.meta.as_ref();
        let Some(d) = own.discriminator() else {
            return Ok(own);
        };
        let stored = record.get(&d.column);
        if stored.is_null() || stored == &d.value {
            return Ok(own);
        }
        self.mappings
            .resolve_discriminator(own.table(), stored)
            .map(|e| &**e)
            .ok_or_else(|| {
                PersistError::consistency(
                    self.meta.table(),
                    format!("unknown discriminator {}={stored}", d.column),
                )
            })
    }

    fn check_version(&self, key: &EntityKey, stored: &Record, expected: &Value) -> PersistResult<()> {
        let column = self.version_column()?;
        let actual = stored.get(column);
        if actual != expected {
            debug!(key = %key, expected = %expected, actual = %actual, "version mismatch");
            return Err(self.stale(key));
        }
        Ok(())
    }

    fn check_state<F>(&self, key: &EntityKey, stored: &Record, old: &EntityState, include: F) -> PersistResult<()>
    where
        F: Fn(&PropertyDescriptor) -> bool,
    {
        let codec = self.codec();
        for property in self.meta.properties() {
            if !property.versionable || !include(property) {
                continue;
            }
            let expected = old.get(&property.name);
            if !expected.is_available() {
                continue;
            }
            let expected = FieldValue::from_columns(expected.to_columns(property.columns.len())?);
            if codec.read_property(stored, property) != expected {
                debug!(key = %key, property = %property.name, "state mismatch");
                return Err(self.stale(key));
            }
        }
        Ok(())
    }
}
