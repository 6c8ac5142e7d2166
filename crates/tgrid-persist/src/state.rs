//! Named property state of one entity.

use std::collections::BTreeMap;

use tgrid_mapping::EntityMetadata;
use tgrid_types::{FieldValue, Value};

use crate::error::{PersistError, PersistResult};

static NULL_FIELD: FieldValue = FieldValue::Single(Value::Null);

/// Property values of one entity, by property name.
///
/// Missing properties read as null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityState {
    values: BTreeMap<String, FieldValue>,
}

impl EntityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(property, value);
        self
    }

    pub fn set(&mut self, property: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(property.into(), value.into());
    }

    pub fn get(&self, property: &str) -> &FieldValue {
        self.values.get(property).unwrap_or(&NULL_FIELD)
    }

    pub fn contains(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name a positional value array in the entity's property order.
    pub fn from_positional(entity: &EntityMetadata, values: Vec<FieldValue>) -> PersistResult<Self> {
        let properties = entity.properties();
        if values.len() != properties.len() {
            return Err(PersistError::unsupported(
                entity.name(),
                format!(
                    "{} positional values for {} properties",
                    values.len(),
                    properties.len()
                ),
            ));
        }
        Ok(properties
            .iter()
            .map(|p| p.name.clone())
            .zip(values)
            .collect())
    }

    /// The values in the entity's property order.
    pub fn to_positional(&self, entity: &EntityMetadata) -> Vec<FieldValue> {
        entity
            .properties()
            .iter()
            .map(|p| self.get(&p.name).clone())
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for EntityState {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// An entity read back from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedEntity {
    /// Concrete entity name, resolved through the discriminator when the table is shared.
    pub entity: String,
    pub id: FieldValue,
    pub state: EntityState,
}
