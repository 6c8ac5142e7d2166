//! Tuple store boundary for tgrid.
//!
//! The persistence layer never talks to a concrete database. It talks to a
//! [`TupleStore`]: a key → record engine plus a key → ordered multimap engine
//! for associations. Backends decide how those are laid out physically.
//!
//! # Storage Backends
//!
//! - [`InMemoryTupleStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. The store offers per-key read/write atomicity only, never cross-key transactions.
//! 2. Reads hand out copies; a caller mutates its copy and writes it back.
//! 3. The store never interprets record contents.
//! 4. All backend errors are propagated, never silently ignored.

pub mod association;
pub mod error;
pub mod memory;
pub mod traits;

pub use association::{AssociationOperation, AssociationStore};
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryTupleStore, StoreStats};
pub use traits::TupleStore;
