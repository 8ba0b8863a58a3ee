use thiserror::Error;

/// Maps 1:1 onto the subset of the error taxonomy a lease manager backend can raise.
#[derive(Debug, Error)]
pub enum LeaseStoreError {
    #[error("value cannot be coerced or violates a value constraint: {0}")]
    BadValue(String),
    #[error("no lease found for the given primary key")]
    NoSuchLease,
    #[error("database operation failed")]
    DbOperationError(#[from] sqlx::Error),
    #[error("on-disk schema major version {found} incompatible with expected {expected}")]
    DbIncompatible { expected: u32, found: u32 },
}

impl LeaseStoreError {
    /// Transient backend failures are retried with bounded backoff by the allocation
    /// engine; schema and value errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaseStoreError::DbOperationError(_))
    }
}
