use std::fmt;

use thiserror::Error;

/// Error taxonomy shared by every component.
///
/// The numeric codes on the first four kinds are wire statuses carried in the
/// error body; `Unauthenticated` and `NotFound` map directly to their HTTP
/// statuses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// Missing or malformed required input.
    InvalidParameters,
    /// Underlying store error or unexpected failure.
    OperationFailed,
    /// A destructive operation disabled by configuration.
    OperationNotAllowed,
    /// Name collision on blob creation, or a generic conflict.
    DuplicateKey,
    /// Shared secret missing or mismatched.
    Unauthenticated,
    /// Missing resource on a lookup, resolve, or stream path.
    NotFound,
}

impl FaultKind {
    /// Wire status carried in the error body.
    pub fn code(self) -> u16 {
        match self {
            Self::InvalidParameters => 100,
            Self::OperationFailed => 101,
            Self::OperationNotAllowed => 102,
            Self::DuplicateKey => 103,
            Self::Unauthenticated => 401,
            Self::NotFound => 404,
        }
    }

    /// Canonical human-readable message.
    pub fn message(self) -> &'static str {
        match self {
            Self::InvalidParameters => "Invalid parameters",
            Self::OperationFailed => "Operation failed",
            Self::OperationNotAllowed => "Operation not allowed",
            Self::DuplicateKey => "Duplicate key",
            Self::Unauthenticated => "Unauthenticated",
            Self::NotFound => "Not found",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// Uniform error value: a taxonomy kind plus optional underlying detail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{kind}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct Fault {
    pub kind: FaultKind,
    pub detail: Option<String>,
}

impl Fault {
    pub fn new(kind: FaultKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn with_detail(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// Shorthand for the most common failure kind.
    pub fn operation_failed(detail: impl Into<String>) -> Self {
        Self::with_detail(FaultKind::OperationFailed, detail)
    }

    pub fn invalid_parameters() -> Self {
        Self::new(FaultKind::InvalidParameters)
    }

    pub fn not_found() -> Self {
        Self::new(FaultKind::NotFound)
    }
}

/// Result alias used across engine and pipeline code.
pub type FaultResult<T> = Result<T, Fault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes() {
        assert_eq!(FaultKind::InvalidParameters.code(), 100);
        assert_eq!(FaultKind::OperationFailed.code(), 101);
        assert_eq!(FaultKind::OperationNotAllowed.code(), 102);
        assert_eq!(FaultKind::DuplicateKey.code(), 103);
        assert_eq!(FaultKind::Unauthenticated.code(), 401);
        assert_eq!(FaultKind::NotFound.code(), 404);
    }

    #[test]
    fn display_with_and_without_detail() {
        let bare = Fault::new(FaultKind::DuplicateKey);
        assert_eq!(format!("{bare}"), "Duplicate key");

        let detailed = Fault::operation_failed("disk on fire");
        assert_eq!(format!("{detailed}"), "Operation failed: disk on fire");
    }
}
