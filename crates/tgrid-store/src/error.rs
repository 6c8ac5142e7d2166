use tgrid_types::TypeError;

/// Errors from tuple store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A lock guarding backend state was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// The backend rejected or failed the operation.
    #[error("backend error: {0}")]
    Backend(String),

    /// Stored data could not be turned back into keys or records.
    #[error("corrupt stored data: {0}")]
    Corrupt(#[from] TypeError),

    /// Storage backend is read-only or otherwise unavailable.
    #[error("store is read-only")]
    ReadOnly,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
