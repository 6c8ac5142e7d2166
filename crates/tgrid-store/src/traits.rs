use tgrid_types::{AssociationKey, EntityKey, Record};

use crate::association::AssociationStore;
use crate::error::StoreResult;

/// Key → record and key → association storage.
///
/// All implementations must satisfy these invariants:
/// - A read returns an independent copy; mutating it never touches the store.
/// - A write replaces the whole record or association stored under the key.
/// - Writes to different keys are independent: there is no cross-key atomicity.
/// - All backend errors are propagated, never silently ignored.
pub trait TupleStore: Send + Sync {
    /// Read the record stored under `key`.
    ///
    /// Returns `Ok(None)` if there is none.
    fn get_record(&self, key: &EntityKey) -> StoreResult<Option<Record>>;

    /// Create a fresh, empty record for `key`. Nothing is stored until
    /// [`update_record`](Self::update_record) is called.
    fn create_record(&self, key: &EntityKey) -> StoreResult<Record> {
        let _ = key;
        Ok(Record::new())
    }

    /// Store `record` under `key`, replacing anything already there.
    fn update_record(&self, record: &Record, key: &EntityKey) -> StoreResult<()>;

    /// Remove the record under `key`. Returns `true` if it existed.
    fn remove_record(&self, key: &EntityKey) -> StoreResult<bool>;

    /// Read the association stored under `key`.
    ///
    /// Returns `Ok(None)` if there is none; absence is a normal state.
    fn get_association(&self, key: &AssociationKey) -> StoreResult<Option<AssociationStore>>;

    /// Create a fresh, empty association for `key`. Nothing is stored until
    /// [`update_association`](Self::update_association) is called.
    fn create_association(&self, key: &AssociationKey) -> StoreResult<AssociationStore> {
        Ok(AssociationStore::new(key.clone()))
    }

    /// Store `association` under its own key, replacing anything already there.
    fn update_association(&self, association: &AssociationStore) -> StoreResult<()>;

    /// Remove the association under `key`. Returns `true` if it existed.
    fn remove_association(&self, key: &AssociationKey) -> StoreResult<bool>;

    /// Read the association under `key`, creating an empty one if absent.
    fn get_or_create_association(&self, key: &AssociationKey) -> StoreResult<AssociationStore> {
        match self.get_association(key)? {
            Some(association) => Ok(association),
            None => self.create_association(key),
        }
    }
}
