use thiserror::Error;

/// Maps 1:1 onto the subset of the error taxonomy a configuration backend can raise.
#[derive(Debug, Error)]
pub enum ConfigBackendError {
    #[error("selector `unassigned` is not supported for this operation")]
    NotImplemented,
    #[error("value cannot be coerced or violates a value constraint: {0}")]
    BadValue(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("database operation failed")]
    DbOperationError(#[from] sqlx::Error),
    #[error("on-disk schema major version {found} incompatible with expected {expected}")]
    DbIncompatible { expected: u32, found: u32 },
}

impl ConfigBackendError {
    /// Transient backend failures are retried with bounded backoff by the allocation
    /// engine; selector/value errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConfigBackendError::DbOperationError(_))
    }
}
