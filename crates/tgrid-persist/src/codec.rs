//! Property values ⇄ record columns.

use tgrid_mapping::{DiscriminatorBearing, EntityMetadata, Identifiable, PropertyDescriptor};
use tgrid_types::{FieldValue, Record};
use tracing::trace;

use crate::error::{PersistError, PersistResult};
use crate::reverse_index::ReverseIndexMaintainer;
use crate::state::EntityState;

/// Converts between an entity's named property state and its record.
#[derive(Clone, Copy)]
pub struct RecordCodec<'a> {
    entity: &'a EntityMetadata,
}

impl<'a> RecordCodec<'a> {
    pub fn new(entity: &'a EntityMetadata) -> Self {
        Self { entity }
    }

    pub fn write_identifier(&self, record: &mut Record, id: &FieldValue) -> PersistResult<()> {
        let columns = self.entity.identifier_columns();
        for (column, value) in columns.iter().zip(id.to_columns(columns.len())?) {
            record.put(column.clone(), value);
        }
        Ok(())
    }

    pub fn read_identifier(&self, record: &Record) -> FieldValue {
        FieldValue::from_columns(record.values_of(self.entity.identifier_columns()))
    }

    /// Tag the record with the entity's discriminator, if it has one.
    pub fn write_discriminator(&self, record: &mut Record) {
        if let Some(d) = self.entity.discriminator() {
            record.put(d.column.clone(), d.value.clone());
        }
    }

    /// The stored value of one property.
    pub fn read_property(&self, record: &Record, property: &PropertyDescriptor) -> FieldValue {
        FieldValue::from_columns(record.values_of(&property.columns))
    }

    /// Write the included properties of `state` into `record`.
    ///
    /// Properties with a reverse index have their old entry removed before
    /// the columns are overwritten and the new entry added afterwards.
    /// Unfetched and unknown values are left untouched. Returns the number of
    /// properties written.
    ///
    /// Every included value is checked before the first reverse-index entry
    /// changes, so a rejected state leaves both the record and the index alone.
    pub fn dehydrate<F>(
        &self,
        record: &mut Record,
        id: &FieldValue,
        state: &EntityState,
        include: F,
        index: &ReverseIndexMaintainer<'_>,
    ) -> PersistResult<usize>
    where
        F: Fn(&PropertyDescriptor) -> bool,
    {
        trace!(entity = self.entity.name(), id = %id, "dehydrating");
        let mut pending = Vec::new();
        for property in self.entity.properties().iter().filter(|p| include(*p)) {
            let value = state.get(&property.name);
            if !value.is_available() {
                continue;
            }
            if value.is_null() && !property.nullable {
                return Err(PersistError::NullProperty {
                    entity: self.entity.name().to_string(),
                    property: property.name.clone(),
                });
            }
            pending.push((property, value.to_columns(property.columns.len())?));
        }

        let written = pending.len();
        for (property, columns) in pending {
            let indexed = property.has_reverse_index();
            if indexed {
                index.remove(property, id, record)?;
            }
            for (column, v) in property.columns.iter().zip(columns) {
                record.put(column.clone(), v);
            }
            if indexed {
                index.add(property, id, record)?;
            }
        }
        Ok(written)
    }

    /// Read every property of `record` into a named state.
    ///
    /// Lazy properties come back as [`FieldValue::Unfetched`] and properties
    /// that cannot be selected as [`FieldValue::Unknown`]. To-one properties
    /// hydrate to the referenced identifier.
    pub fn hydrate(&self, record: &Record) -> EntityState {
        self.entity
            .properties()
            .iter()
            .map(|p| {
                let value = if !p.selectable {
                    FieldValue::Unknown
                } else if p.lazy {
                    FieldValue::Unfetched
                } else {
                    self.read_property(record, p)
                };
                (p.name.clone(), value)
            })
            .collect()
    }
}
