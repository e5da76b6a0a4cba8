use satchel_types::{Fault, FaultKind};
use thiserror::Error;

/// Errors from storage backend operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert or create collided with an existing key or name.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The addressed record or blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An update operator was applied to a field of the wrong shape.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// The backend does not implement this capability.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// I/O error from the underlying storage engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-reported failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for Fault {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::DuplicateKey(_) => FaultKind::DuplicateKey,
            StoreError::NotFound(_) => FaultKind::NotFound,
            _ => FaultKind::OperationFailed,
        };
        Fault::with_detail(kind, err.to_string())
    }
}
