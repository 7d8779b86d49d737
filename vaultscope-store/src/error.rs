//! Error types for the store boundary.

use thiserror::Error;

use crate::status::Status;
use crate::wire::AttrKey;

/// Result type for store boundary operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised at the store boundary.
///
/// [`StoreOutcome`](crate::StoreOutcome) is the primary result shape; this
/// enum is what an outcome becomes once a caller decides a non-success is an
/// error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No item matched the query.
    #[error("item not found")]
    ItemNotFound,

    /// The user cancelled an authentication prompt.
    #[error("user cancelled")]
    UserCancelled,

    /// The calling binary lacks the entitlement for the access group.
    #[error("missing entitlement")]
    MissingEntitlement,

    /// Authentication failed.
    #[error("authentication failed")]
    AuthFailed,

    /// Any other platform status.
    #[error("store failure: status {0}")]
    Failure(Status),

    /// A wire attribute carried a value of the wrong type.
    #[error("malformed attribute {key}: {reason}")]
    MalformedAttribute {
        /// Offending attribute.
        key: AttrKey,
        /// What was expected.
        reason: String,
    },
}

impl StoreError {
    /// Creates a malformed attribute error.
    pub fn malformed<S: Into<String>>(key: AttrKey, reason: S) -> Self {
        Self::MalformedAttribute {
            key,
            reason: reason.into(),
        }
    }
}
