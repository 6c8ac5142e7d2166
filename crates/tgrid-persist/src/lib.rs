//! Tuple-oriented persistence for tgrid.
//!
//! Persisters turn entity state and collection elements into records and
//! association rows of a [`tgrid_store::TupleStore`]. A store has no joins and
//! no foreign keys, so this crate keeps the redundant copies consistent itself:
//!
//! - [`ReverseIndexMaintainer`] -- owner lookup by to-one or unique property
//! - [`SyncEngine`] -- mirrors collection rows onto the inverse side
//!
//! # Operations
//!
//! Each persister call fetches what it needs, mutates local copies, and writes
//! every touched record or association back exactly once. There are no
//! cross-key transactions; an error part way through leaves earlier keys written.

pub mod codec;
pub mod collection;
pub mod entity;
pub mod error;
pub mod registry;
pub mod reverse_index;
pub mod state;
pub mod sync;

#[cfg(test)]
mod fixtures;

pub use codec::RecordCodec;
pub use collection::{CollectionEntry, CollectionPersister, ElementUpdate, RowLocator};
pub use entity::{EntityPersister, OperationPhase, UpdateOptions};
pub use error::{PersistError, PersistResult};
pub use registry::PersisterRegistry;
pub use reverse_index::ReverseIndexMaintainer;
pub use state::{EntityState, LoadedEntity};
pub use sync::{SyncEngine, SyncFlush};
