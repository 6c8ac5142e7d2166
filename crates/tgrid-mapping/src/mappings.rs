use std::collections::BTreeMap;
use std::sync::Arc;

use tgrid_types::Value;

use crate::collection::CollectionMetadata;
use crate::entity::{DiscriminatorBearing, EntityMetadata};

/// The validated, immutable mapping registry.
///
/// Built once by [`MappingDocument::build`](crate::MappingDocument::build)
/// and shared by reference with every persister.
#[derive(Clone, Debug, Default)]
pub struct Mappings {
    entities: BTreeMap<String, Arc<EntityMetadata>>,
    collections: BTreeMap<String, Arc<CollectionMetadata>>,
}

impl Mappings {
    pub(crate) fn new(
        entities: BTreeMap<String, Arc<EntityMetadata>>,
        collections: BTreeMap<String, Arc<CollectionMetadata>>,
    ) -> Self {
        Self {
            entities,
            collections,
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityMetadata>> {
        self.entities.get(name)
    }

    pub fn collection(&self, role: &str) -> Option<&Arc<CollectionMetadata>> {
        self.collections.get(role)
    }

    /// Entities ordered by name.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMetadata>> {
        self.entities.values()
    }

    /// Collections ordered by role.
    pub fn collections(&self) -> impl Iterator<Item = &Arc<CollectionMetadata>> {
        self.collections.values()
    }

    /// Collections owned by `entity`.
    pub fn collections_of<'a>(
        &'a self,
        entity: &'a str,
    ) -> impl Iterator<Item = &'a Arc<CollectionMetadata>> + 'a {
        self.collections.values().filter(move |c| c.owner() == entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// The concrete entity stored in `table` whose discriminator column holds `value`.
    pub fn resolve_discriminator(&self, table: &str, value: &Value) -> Option<&Arc<EntityMetadata>> {
        self.entities.values().find(|e| {
            e.table() == table && e.discriminator().is_some_and(|d| &d.value == value)
        })
    }
}
