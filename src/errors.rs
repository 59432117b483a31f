//! Error types for the wallet ledger store

use thiserror::Error;

/// Result type used by all store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by ledger store operations
///
/// Failures are always returned to the immediate caller; nothing in this
/// crate is fatal to the process. Composite operations stop at the first
/// sub-failure and leave already-committed sub-steps in place, so the
/// recovery path is to re-drive the idempotent write, not to roll back.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lookup yielded no row
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity violated a uniqueness or conformance constraint
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The underlying SQLite execute or query failed
    #[error("storage error: {0}")]
    StorageError(String),

    /// Cross-table state turned out inconsistent while hydrating a result
    #[error("integrity error: {0}")]
    IntegrityError(String),
}

impl StoreError {
    /// True when the error is a plain missing-row condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
