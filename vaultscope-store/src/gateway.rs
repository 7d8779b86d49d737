//! Status normalization over a [`SecureStore`].

use std::fmt;
use std::sync::Arc;

use crate::error::StoreError;
use crate::query::Query;
use crate::status::Status;
use crate::store::SecureStore;
use crate::wire::{AttrKey, AttrValue, QueryResult, WireQuery};

/// Typed result of a store primitive.
///
/// Not-found and authorization outcomes are ordinary values here; callers
/// branch on them instead of unwinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome<T> {
    /// The call succeeded.
    Success(T),
    /// No item matched.
    ItemNotFound,
    /// The user cancelled an authentication prompt.
    UserCancelled,
    /// The binary lacks the entitlement for the access group.
    MissingEntitlement,
    /// Authentication failed.
    AuthFailed,
    /// Any other platform status.
    Failure(Status),
}

impl<T> StoreOutcome<T> {
    /// Classifies a non-success platform status.
    #[must_use]
    pub fn from_status(status: Status) -> Self {
        match status {
            Status::ITEM_NOT_FOUND => Self::ItemNotFound,
            Status::USER_CANCELED => Self::UserCancelled,
            Status::MISSING_ENTITLEMENT => Self::MissingEntitlement,
            Status::AUTH_FAILED => Self::AuthFailed,
            other => Self::Failure(other),
        }
    }

    fn from_call(result: Result<T, Status>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(status) if status.is_success() => Self::Failure(Status::PARAM),
            Err(status) => Self::from_status(status),
        }
    }

    /// Returns `true` for [`StoreOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts into a `Result`, treating every non-success as an error.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] matching the outcome.
    pub fn into_result(self) -> Result<T, StoreError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::ItemNotFound => Err(StoreError::ItemNotFound),
            Self::UserCancelled => Err(StoreError::UserCancelled),
            Self::MissingEntitlement => Err(StoreError::MissingEntitlement),
            Self::AuthFailed => Err(StoreError::AuthFailed),
            Self::Failure(status) => Err(StoreError::Failure(status)),
        }
    }

    /// Like [`StoreOutcome::into_result`] but maps not-found to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the [`StoreError`] for any other non-success outcome.
    pub fn into_option(self) -> Result<Option<T>, StoreError> {
        match self {
            Self::ItemNotFound => Ok(None),
            other => other.into_result().map(Some),
        }
    }
}

/// Thin synchronous wrapper over the four store primitives.
///
/// Typed [`Query`] values are converted to wire form here and nowhere else.
/// No retries are performed.
#[derive(Clone)]
pub struct StoreGateway {
    store: Arc<dyn SecureStore>,
}

impl fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGateway").finish_non_exhaustive()
    }
}

impl StoreGateway {
    /// Wraps a platform store.
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self { store }
    }

    /// Runs a lookup.
    pub fn copy_matching(&self, query: &Query) -> StoreOutcome<QueryResult> {
        StoreOutcome::from_call(self.store.copy_matching(&query.to_wire()))
    }

    /// Inserts `value` under the item attributes of `query`.
    pub fn add(&self, query: &Query, value: &[u8]) -> StoreOutcome<()> {
        let mut attributes = query.for_delete().to_wire();
        attributes.insert(AttrKey::ValueData, AttrValue::Data(value.to_vec()));
        StoreOutcome::from_call(self.store.add(&attributes))
    }

    /// Replaces the payload of the items matching `query`.
    pub fn update_value(&self, query: &Query, value: &[u8]) -> StoreOutcome<()> {
        let mut changes = WireQuery::new();
        changes.insert(AttrKey::ValueData, AttrValue::Data(value.to_vec()));
        StoreOutcome::from_call(self.store.update(&query.for_delete().to_wire(), &changes))
    }

    /// Removes every item matching `query`. Nothing matching is a success.
    pub fn delete(&self, query: &Query) -> StoreOutcome<()> {
        match StoreOutcome::from_call(self.store.delete(&query.for_delete().to_wire())) {
            StoreOutcome::ItemNotFound => StoreOutcome::Success(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryStore, Operation};

    fn gateway() -> (Arc<MemoryStore>, StoreGateway) {
        let store = Arc::new(MemoryStore::new());
        let gateway = StoreGateway::new(store.clone());
        (store, gateway)
    }

    fn scoped(service: &str) -> Query {
        Query {
            service: Some(service.to_string()),
            ..Query::generic_password()
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            StoreOutcome::<()>::from_status(Status::ITEM_NOT_FOUND),
            StoreOutcome::ItemNotFound
        );
        assert_eq!(
            StoreOutcome::<()>::from_status(Status::USER_CANCELED),
            StoreOutcome::UserCancelled
        );
        assert_eq!(
            StoreOutcome::<()>::from_status(Status::MISSING_ENTITLEMENT),
            StoreOutcome::MissingEntitlement
        );
        assert_eq!(
            StoreOutcome::<()>::from_status(Status::AUTH_FAILED),
            StoreOutcome::AuthFailed
        );
        assert_eq!(
            StoreOutcome::<()>::from_status(Status(-4)),
            StoreOutcome::Failure(Status(-4))
        );
    }

    #[test]
    fn test_not_found_is_a_value() {
        let (_, gateway) = gateway();
        let outcome = gateway.copy_matching(&scoped("svc").with_account("k").for_data());
        assert_eq!(outcome, StoreOutcome::ItemNotFound);
        assert_eq!(outcome.into_option(), Ok(None));
    }

    #[test]
    fn test_add_then_fetch_payload() {
        let (_, gateway) = gateway();
        let query = scoped("svc").with_account("k");
        assert!(gateway.add(&query, b"v").is_success());

        let item = gateway
            .copy_matching(&query.for_data())
            .into_result()
            .expect("fetch")
            .into_first()
            .expect("one item");
        assert_eq!(item.data.as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_delete_tolerates_not_found() {
        let (_, gateway) = gateway();
        assert_eq!(
            gateway.delete(&scoped("svc").with_account("missing")),
            StoreOutcome::Success(())
        );
    }

    #[test]
    fn test_update_replaces_payload() {
        let (_, gateway) = gateway();
        let query = scoped("svc").with_account("k");
        assert!(gateway.add(&query, b"old").is_success());
        assert!(gateway.update_value(&query, b"new").is_success());

        let item = gateway
            .copy_matching(&query.for_data())
            .into_result()
            .expect("fetch")
            .into_first()
            .expect("one item");
        assert_eq!(item.data.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn test_failure_status_is_passed_through() {
        let (store, gateway) = gateway();
        store.inject(Fault::on(Operation::Add).with_status(Status(-34)));
        assert_eq!(
            gateway.add(&scoped("svc").with_account("k"), b"v"),
            StoreOutcome::Failure(Status(-34))
        );
    }
}
