use std::collections::BTreeMap;
use std::sync::Arc;

use tgrid_mapping::Mappings;
use tgrid_store::TupleStore;
use tracing::debug;

use crate::collection::CollectionPersister;
use crate::entity::EntityPersister;

/// One persister per entity and collection role, all sharing a store.
pub struct PersisterRegistry {
    mappings: Arc<Mappings>,
    entities: BTreeMap<String, EntityPersister>,
    collections: BTreeMap<String, CollectionPersister>,
}

impl PersisterRegistry {
    pub fn new(mappings: Arc<Mappings>, store: Arc<dyn TupleStore>) -> Self {
        let entities: BTreeMap<_, _> = mappings
            .entities()
            .map(|meta| {
                let persister =
                    EntityPersister::new(Arc::clone(meta), Arc::clone(&mappings), Arc::clone(&store));
                (meta.name().to_string(), persister)
            })
            .collect();
        let collections: BTreeMap<_, _> = mappings
            .collections()
            .map(|meta| {
                let persister = CollectionPersister::new(Arc::clone(meta), Arc::clone(&store));
                (meta.role().to_string(), persister)
            })
            .collect();
        debug!(
            entities = entities.len(),
            collections = collections.len(),
            "persister registry ready"
        );
        Self {
            mappings,
            entities,
            collections,
        }
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    pub fn entity(&self, name: &str) -> Option<&EntityPersister> {
        self.entities.get(name)
    }

    pub fn collection(&self, role: &str) -> Option<&CollectionPersister> {
        self.collections.get(role)
    }

    /// Entity names in sorted order.
    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Collection roles in sorted order.
    pub fn collection_roles(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }
}
