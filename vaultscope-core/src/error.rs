//! Error types for scopes and migration.

use thiserror::Error;
use vaultscope_store::{Status, StoreError};

/// Result type for scope handle operations.
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Result type for migrations.
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors raised while building a scope identity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum IdentityError {
    /// Identifiers must be non-empty.
    #[error("identifier must not be empty")]
    EmptyIdentifier,
}

/// Errors raised by single-record scope operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum ScopeError {
    /// Keys must be non-empty.
    #[error("key must not be empty")]
    EmptyKey,

    /// Values must be non-empty.
    #[error("value must not be empty")]
    EmptyValue,

    /// The key is reserved for internal use.
    #[error("key is reserved")]
    ReservedKey,

    /// No record exists under the key.
    #[error("item not found")]
    ItemNotFound,

    /// The stored value is not UTF-8.
    #[error("stored value is not valid UTF-8")]
    NotUtf8,

    /// The user cancelled an authentication prompt.
    #[error("user cancelled")]
    UserCancelled,

    /// Authentication failed.
    #[error("authentication failed")]
    AuthFailed,

    /// The binary lacks the entitlement for the scope's access group.
    #[error("missing entitlement")]
    MissingEntitlement,

    /// Invalid identity input.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The scope lock was poisoned.
    #[error("scope lock error: {0}")]
    Lock(String),

    /// The store returned an attribute of the wrong type.
    #[error("malformed store attribute {key}: {reason}")]
    MalformedAttribute {
        /// Offending attribute name.
        key: String,
        /// What was expected.
        reason: String,
    },

    /// Any other store failure.
    #[error("store failure: status {0}")]
    Store(Status),
}

impl From<StoreError> for ScopeError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ItemNotFound => Self::ItemNotFound,
            StoreError::UserCancelled => Self::UserCancelled,
            StoreError::AuthFailed => Self::AuthFailed,
            StoreError::MissingEntitlement => Self::MissingEntitlement,
            StoreError::Failure(status) => Self::Store(status),
            StoreError::MalformedAttribute { key, reason } => Self::MalformedAttribute {
                key: key.as_str().to_string(),
                reason,
            },
        }
    }
}

/// Violations of the migration source query shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryViolation {
    /// The query must select generic-password items.
    #[error("query must select generic passwords")]
    NotGenericPassword,
    /// The query must match all items.
    #[error("query must match all items")]
    NotMatchAll,
    /// The query must return attributes.
    #[error("query must return attributes")]
    AttributesNotRequested,
    /// The query must not return payloads.
    #[error("query must not return data")]
    DataRequested,
    /// The query must not return item references.
    #[error("query must not return item references")]
    ReferenceRequested,
    /// The query must return persistent references.
    #[error("query must return persistent references")]
    PersistentReferenceNotRequested,
    /// Access-controlled items cannot be enumerated in bulk.
    #[error("query must not constrain by access control")]
    AccessControlConstraint,
    /// A reserved attribute was passed as an untyped extra.
    #[error("query carries reserved attribute {0}")]
    ReservedAttribute(String),
    /// The query selects destination records.
    #[error("query overlaps the destination")]
    OverlapsDestination,
}

/// Phase of a migration whose failure triggered a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Writing records into the destination.
    Write,
    /// Removing records from the source.
    Removal,
}

/// Errors raised by a migration.
///
/// Validation errors (`InvalidQuery` through `Transform`) guarantee that no
/// store mutation happened. `CouldNotWriteToKeychain` and `RemovalFailed`
/// are raised after a successful rollback, leaving the destination exactly
/// as it was. `RollbackFailed` is the only variant after which the
/// destination may hold records written by the failed call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// The source query has the wrong shape.
    #[error("invalid migration query: {0}")]
    InvalidQuery(#[from] QueryViolation),

    /// Nothing migratable matched the source query.
    #[error("no items found")]
    NoItemsFound,

    /// A payload could not be read from the source.
    #[error("could not read keychain: {0}")]
    CouldNotReadKeychain(StoreError),

    /// A record key is missing, empty or not a string.
    #[error("record key is invalid")]
    KeyInvalid,

    /// A record value is empty.
    #[error("value for key {key:?} is invalid")]
    ValueInvalid {
        /// Offending key.
        key: String,
    },

    /// Two records share a key.
    #[error("duplicate key {key:?}")]
    DuplicateKey {
        /// Offending key.
        key: String,
    },

    /// The destination already holds a record under the key.
    #[error("key {key:?} already exists in destination")]
    KeyAlreadyExistsInDestination {
        /// Offending key.
        key: String,
    },

    /// The caller's transform rejected a record.
    #[error("transform failed for key {key:?}: {message}")]
    Transform {
        /// Key of the record being transformed.
        key: String,
        /// Message of the transform error.
        message: String,
    },

    /// A destination write failed; the writes were rolled back.
    #[error("could not write {key:?} to keychain: {cause}")]
    CouldNotWriteToKeychain {
        /// Key whose write failed.
        key: String,
        /// Store failure.
        cause: StoreError,
    },

    /// Removing the source records failed; the writes were rolled back.
    #[error("removal of source records failed: {0}")]
    RemovalFailed(StoreError),

    /// Rolling back failed; `orphaned_keys` remain in the destination.
    #[error("rollback after failed {during:?} left {} orphaned keys", orphaned_keys.len())]
    RollbackFailed {
        /// Phase whose failure triggered the rollback.
        during: MigrationPhase,
        /// Keys written by this call that could not be deleted.
        orphaned_keys: Vec<String>,
    },

    /// The user cancelled an authentication prompt.
    #[error("user cancelled")]
    UserCancelled,

    /// Authentication failed.
    #[error("authentication failed")]
    AuthFailed,

    /// The binary lacks the entitlement for an access group.
    #[error("missing entitlement")]
    MissingEntitlement,

    /// The destination scope lock was poisoned.
    #[error("scope lock error: {0}")]
    Lock(String),

    /// Any other store failure.
    #[error("store failure: status {0}")]
    Store(Status),
}

impl From<StoreError> for MigrationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ItemNotFound => Self::NoItemsFound,
            StoreError::UserCancelled => Self::UserCancelled,
            StoreError::AuthFailed => Self::AuthFailed,
            StoreError::MissingEntitlement => Self::MissingEntitlement,
            StoreError::Failure(status) => Self::Store(status),
            other @ StoreError::MalformedAttribute { .. } => Self::CouldNotReadKeychain(other),
        }
    }
}
