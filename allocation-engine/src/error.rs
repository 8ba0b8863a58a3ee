use thiserror::Error;

use config_backend::ConfigBackendError;
use lease_store::LeaseStoreError;

/// Maps 1:1 onto the subset of the error taxonomy (§7) the allocation engine
/// can raise or propagate from the stores it sits on top of.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("selector or operation is not implemented")]
    NotImplemented,
    #[error("value cannot be coerced or violates a value constraint: {0}")]
    BadValue(String),
    #[error("no lease found for the given primary key")]
    NoSuchLease,
    #[error("allocation exhausted its retry budget or deadline")]
    NoAddressAvailable,
    #[error("database operation failed: {0}")]
    DbOperationError(String),
    #[error("on-disk schema major version {found} incompatible with expected {expected}")]
    DbIncompatible { expected: u32, found: u32 },
    #[error("caller API misuse: {0}")]
    InvalidParameter(String),
}

impl AllocationError {
    /// Transient backend failures are retried with bounded backoff by the
    /// caller; everything else is surfaced immediately (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::DbOperationError(_))
    }
}

impl From<LeaseStoreError> for AllocationError {
    fn from(err: LeaseStoreError) -> Self {
        match err {
            LeaseStoreError::BadValue(msg) => AllocationError::BadValue(msg),
            LeaseStoreError::NoSuchLease => AllocationError::NoSuchLease,
            LeaseStoreError::DbOperationError(e) => AllocationError::DbOperationError(e.to_string()),
            LeaseStoreError::DbIncompatible { expected, found } => {
                AllocationError::DbIncompatible { expected, found }
            }
        }
    }
}

impl From<ConfigBackendError> for AllocationError {
    fn from(err: ConfigBackendError) -> Self {
        match err {
            ConfigBackendError::NotImplemented => AllocationError::NotImplemented,
            ConfigBackendError::BadValue(msg) => AllocationError::BadValue(msg),
            ConfigBackendError::InvalidParameter(msg) => AllocationError::InvalidParameter(msg),
            ConfigBackendError::DbOperationError(e) => AllocationError::DbOperationError(e.to_string()),
            ConfigBackendError::DbIncompatible { expected, found } => {
                AllocationError::DbIncompatible { expected, found }
            }
        }
    }
}
