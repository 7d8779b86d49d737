//! In-memory implementation of [`SecureStore`].
//!
//! This store is NOT secure: payloads live in process memory. It mirrors the
//! platform store's observable semantics closely enough to exercise the
//! scope and migration logic:
//!
//! - attributes present in a query must match exactly, absent ones match
//!   anything
//! - `(class, service, account, access group, sync)` is the primary key
//! - `update` keeps every attribute it is not told to change, including the
//!   access-control list
//! - reading the payload of an access-controlled item needs either an
//!   operation prompt or an authentication context in the query
//!
//! Faults can be injected per primitive to drive failure paths in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use crate::status::Status;
use crate::store::SecureStore;
use crate::wire::{AttrKey, AttrValue, Item, PersistentRef, QueryResult, WireQuery};

/// Status returned when the internal lock is poisoned.
const INTERNAL: Status = Status(-26276);

/// Status injected when a [`Fault`] does not name one.
const DEFAULT_FAULT: Status = Status(-36);

/// Primary-key attributes of a generic-password item.
const PRIMARY_KEY: [AttrKey; 4] = [
    AttrKey::Class,
    AttrKey::Service,
    AttrKey::Account,
    AttrKey::AccessGroup,
];

/// Store primitive, used to target faults and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// `copy_matching`.
    CopyMatching,
    /// `add`.
    Add,
    /// `update`.
    Update,
    /// `delete`.
    Delete,
}

type Predicate = Box<dyn Fn(&WireQuery) -> bool + Send + Sync>;

/// An injected failure.
///
/// A fault fires on calls to its [`Operation`] whose query satisfies the
/// optional predicate, after letting `after` such calls through.
pub struct Fault {
    operation: Operation,
    status: Status,
    skip: usize,
    remaining: Option<usize>,
    predicate: Option<Predicate>,
}

impl Fault {
    /// Fails every call to `operation`.
    #[must_use]
    pub fn on(operation: Operation) -> Self {
        Self {
            operation,
            status: DEFAULT_FAULT,
            skip: 0,
            remaining: None,
            predicate: None,
        }
    }

    /// Sets the status the fault returns.
    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Lets the first `calls` matching calls succeed.
    #[must_use]
    pub const fn after(mut self, calls: usize) -> Self {
        self.skip = calls;
        self
    }

    /// Fires at most `count` times.
    #[must_use]
    pub const fn times(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }

    /// Restricts the fault to queries satisfying `predicate`.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&WireQuery) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Restricts the fault to queries naming `service`.
    #[must_use]
    pub fn for_service(self, service: &str) -> Self {
        let service = AttrValue::from(service);
        self.when(move |query| query.get(&AttrKey::Service) == Some(&service))
    }

    /// Restricts the fault to lookups by persistent reference.
    #[must_use]
    pub fn by_persistent_ref(self) -> Self {
        self.when(|query| query.contains_key(&AttrKey::PersistentRef))
    }

    fn fire(&mut self, operation: Operation, query: &WireQuery) -> Option<Status> {
        if operation != self.operation || self.remaining == Some(0) {
            return None;
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(query) {
                return None;
            }
        }
        if self.skip > 0 {
            self.skip -= 1;
            return None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(self.status)
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    attributes: WireQuery,
    data: Option<Vec<u8>>,
    reference: PersistentRef,
}

impl StoredItem {
    fn attribute(&self, key: &AttrKey) -> Option<AttrValue> {
        match (key, self.attributes.get(key)) {
            (_, Some(value)) => Some(value.clone()),
            (AttrKey::Synchronizable, None) => Some(AttrValue::Bool(false)),
            _ => None,
        }
    }

    fn matches(&self, query: &WireQuery) -> bool {
        query.iter().all(|(key, value)| match key {
            AttrKey::PersistentRef => value.as_data() == Some(self.reference.as_bytes()),
            key if key.is_request_only() => true,
            key => self.attribute(key).as_ref() == Some(value),
        })
    }

    fn same_primary_key(&self, attributes: &WireQuery) -> bool {
        PRIMARY_KEY
            .iter()
            .chain(std::iter::once(&AttrKey::Synchronizable))
            .all(|key| {
                let other = match (key, attributes.get(key)) {
                    (_, Some(value)) => Some(value.clone()),
                    (AttrKey::Synchronizable, None) => Some(AttrValue::Bool(false)),
                    _ => None,
                };
                self.attribute(key) == other
            })
    }

    fn is_access_controlled(&self) -> bool {
        self.attributes.contains_key(&AttrKey::AccessControl)
    }
}

#[derive(Default)]
struct Inner {
    items: Vec<StoredItem>,
    faults: Vec<Fault>,
    calls: BTreeMap<Operation, usize>,
    next_reference: u64,
}

impl Inner {
    fn enter(&mut self, operation: Operation, query: &WireQuery) -> Result<(), Status> {
        *self.calls.entry(operation).or_default() += 1;
        for fault in &mut self.faults {
            if let Some(status) = fault.fire(operation, query) {
                return Err(status);
            }
        }
        Ok(())
    }

    fn issue_reference(&mut self) -> PersistentRef {
        self.next_reference += 1;
        let digest = Sha256::new()
            .chain_update(b"vaultscope:memory-ref")
            .chain_update(self.next_reference.to_be_bytes())
            .finalize();
        PersistentRef(digest[..20].to_vec())
    }
}

fn flag(query: &WireQuery, key: &AttrKey) -> bool {
    query.get(key).and_then(AttrValue::as_bool).unwrap_or(false)
}

/// In-memory secure store.
///
/// Thread-safe; every primitive runs under one internal mutex, which makes
/// each call atomic like the platform store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, Status> {
        self.inner.lock().map_err(|_| INTERNAL)
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a fault. Faults are checked in registration order.
    pub fn inject(&self, fault: Fault) {
        self.lock_or_recover().faults.push(fault);
    }

    /// Removes every registered fault.
    pub fn clear_faults(&self) {
        self.lock_or_recover().faults.clear();
    }

    /// Returns how many times `operation` was called.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock_or_recover()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the number of primitive calls across all operations.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock_or_recover().calls.values().sum()
    }

    /// Resets all call counters.
    pub fn reset_calls(&self) {
        self.lock_or_recover().calls.clear();
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_or_recover().items.len()
    }

    /// Returns `true` if the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_or_recover().items.is_empty()
    }

    /// Removes every item, fault and counter.
    pub fn clear(&self) {
        *self.lock_or_recover() = Inner::default();
    }

    /// Stores an item verbatim, bypassing primary-key checks and faults.
    ///
    /// Used to plant records a well-behaved writer would never produce, such
    /// as metadata-only artifacts (`data == None`) or non-string accounts.
    pub fn insert_raw(&self, attributes: WireQuery, data: Option<Vec<u8>>) -> PersistentRef {
        let mut inner = self.lock_or_recover();
        let reference = inner.issue_reference();
        inner.items.push(StoredItem {
            attributes,
            data,
            reference: reference.clone(),
        });
        reference
    }

    /// Returns `account -> payload` for every string-keyed item with a
    /// payload under `service`.
    #[must_use]
    pub fn snapshot(&self, service: &str) -> BTreeMap<String, Vec<u8>> {
        let service = AttrValue::from(service);
        self.lock_or_recover()
            .items
            .iter()
            .filter(|item| item.attributes.get(&AttrKey::Service) == Some(&service))
            .filter_map(|item| {
                let account = item.attributes.get(&AttrKey::Account)?.as_str()?;
                Some((account.to_string(), item.data.clone()?))
            })
            .collect()
    }

    /// Returns the stored attributes of the item at `(service, account)`.
    #[must_use]
    pub fn attributes_of(&self, service: &str, account: &str) -> Option<WireQuery> {
        let service = AttrValue::from(service);
        let account = AttrValue::from(account);
        self.lock_or_recover()
            .items
            .iter()
            .find(|item| {
                item.attributes.get(&AttrKey::Service) == Some(&service)
                    && item.attributes.get(&AttrKey::Account) == Some(&account)
            })
            .map(|item| item.attributes.clone())
    }
}

impl SecureStore for MemoryStore {
    fn copy_matching(&self, query: &WireQuery) -> Result<QueryResult, Status> {
        let mut inner = self.lock()?;
        inner.enter(Operation::CopyMatching, query)?;

        let match_all = query.get(&AttrKey::MatchLimit) == Some(&AttrValue::from("m_LimitAll"));
        let want_attributes = flag(query, &AttrKey::ReturnAttributes);
        let want_data = flag(query, &AttrKey::ReturnData);
        let want_reference = flag(query, &AttrKey::ReturnPersistentRef);
        let authorized = query.contains_key(&AttrKey::OperationPrompt)
            || query.contains_key(&AttrKey::AuthContext);

        let mut results = Vec::new();
        for item in inner.items.iter().filter(|item| item.matches(query)) {
            if want_data {
                // Items without a payload do not satisfy a data request.
                if item.data.is_none() {
                    continue;
                }
                if item.is_access_controlled() && !authorized {
                    return Err(Status::INTERACTION_NOT_ALLOWED);
                }
            }
            results.push(Item {
                attributes: if want_attributes {
                    item.attributes.clone()
                } else {
                    WireQuery::new()
                },
                data: if want_data { item.data.clone() } else { None },
                persistent_ref: want_reference.then(|| item.reference.clone()),
            });
            if !match_all {
                break;
            }
        }

        if results.is_empty() {
            return Err(Status::ITEM_NOT_FOUND);
        }
        if match_all {
            Ok(QueryResult::Many(results))
        } else {
            Ok(QueryResult::One(results.remove(0)))
        }
    }

    fn add(&self, attributes: &WireQuery) -> Result<(), Status> {
        let mut inner = self.lock()?;
        inner.enter(Operation::Add, attributes)?;

        if !attributes.contains_key(&AttrKey::Class) {
            return Err(Status::PARAM);
        }
        let data = attributes
            .get(&AttrKey::ValueData)
            .and_then(AttrValue::as_data)
            .map(<[u8]>::to_vec);
        let stored: WireQuery = attributes
            .iter()
            .filter(|(key, _)| !key.is_request_only())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if inner.items.iter().any(|item| item.same_primary_key(&stored)) {
            return Err(Status::DUPLICATE_ITEM);
        }
        let reference = inner.issue_reference();
        inner.items.push(StoredItem {
            attributes: stored,
            data,
            reference,
        });
        Ok(())
    }

    fn update(&self, query: &WireQuery, changes: &WireQuery) -> Result<(), Status> {
        let mut inner = self.lock()?;
        inner.enter(Operation::Update, query)?;

        let mut updated = 0usize;
        for item in inner.items.iter_mut().filter(|item| item.matches(query)) {
            for (key, value) in changes {
                match key {
                    AttrKey::ValueData => item.data = value.as_data().map(<[u8]>::to_vec),
                    key if key.is_request_only() => {}
                    key => {
                        item.attributes.insert(key.clone(), value.clone());
                    }
                }
            }
            updated += 1;
        }
        if updated == 0 {
            return Err(Status::ITEM_NOT_FOUND);
        }
        Ok(())
    }

    fn delete(&self, query: &WireQuery) -> Result<(), Status> {
        let mut inner = self.lock()?;
        inner.enter(Operation::Delete, query)?;

        let before = inner.items.len();
        inner.items.retain(|item| !item.matches(query));
        if inner.items.len() == before {
            return Err(Status::ITEM_NOT_FOUND);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(service: &str, account: &str) -> WireQuery {
        let mut wire = WireQuery::new();
        wire.insert(AttrKey::Class, "genp".into());
        wire.insert(AttrKey::Service, service.into());
        wire.insert(AttrKey::Account, account.into());
        wire
    }

    fn with_data(mut wire: WireQuery, data: &[u8]) -> WireQuery {
        wire.insert(AttrKey::ValueData, AttrValue::Data(data.to_vec()));
        wire
    }

    fn lookup(service: &str) -> WireQuery {
        let mut wire = WireQuery::new();
        wire.insert(AttrKey::Class, "genp".into());
        wire.insert(AttrKey::Service, service.into());
        wire.insert(AttrKey::MatchLimit, "m_LimitAll".into());
        wire.insert(AttrKey::ReturnAttributes, true.into());
        wire.insert(AttrKey::ReturnPersistentRef, true.into());
        wire
    }

    #[test]
    fn test_add_rejects_duplicate_primary_key() {
        let store = MemoryStore::new();
        store.add(&with_data(attributes("svc", "a"), b"1")).unwrap();
        assert_eq!(
            store.add(&with_data(attributes("svc", "a"), b"2")),
            Err(Status::DUPLICATE_ITEM)
        );
        store.add(&with_data(attributes("svc", "b"), b"2")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_match_all_returns_every_item_with_references() {
        let store = MemoryStore::new();
        store.add(&with_data(attributes("svc", "a"), b"1")).unwrap();
        store.add(&with_data(attributes("svc", "b"), b"2")).unwrap();
        store.add(&with_data(attributes("other", "c"), b"3")).unwrap();

        let items = store.copy_matching(&lookup("svc")).unwrap().into_items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.persistent_ref.is_some()));
        assert!(items.iter().all(|item| item.data.is_none()));
    }

    #[test]
    fn test_fetch_by_persistent_reference() {
        let store = MemoryStore::new();
        store.add(&with_data(attributes("svc", "a"), b"1")).unwrap();
        let reference = store
            .copy_matching(&lookup("svc"))
            .unwrap()
            .into_first()
            .and_then(|item| item.persistent_ref)
            .unwrap();

        let mut query = WireQuery::new();
        query.insert(AttrKey::PersistentRef, AttrValue::Data(reference.0));
        query.insert(AttrKey::ReturnData, true.into());
        let item = store.copy_matching(&query).unwrap().into_first().unwrap();
        assert_eq!(item.data, Some(b"1".to_vec()));
    }

    #[test]
    fn test_metadata_only_item_has_no_payload() {
        let store = MemoryStore::new();
        let reference = store.insert_raw(attributes("svc", "ghost"), None);

        let mut query = WireQuery::new();
        query.insert(AttrKey::PersistentRef, AttrValue::Data(reference.0));
        query.insert(AttrKey::ReturnData, true.into());
        assert_eq!(store.copy_matching(&query), Err(Status::ITEM_NOT_FOUND));
    }

    #[test]
    fn test_update_keeps_access_control() {
        let store = MemoryStore::new();
        let mut wire = attributes("svc", "a");
        wire.insert(AttrKey::AccessControl, "any".into());
        store.add(&with_data(wire, b"1")).unwrap();

        let mut changes = WireQuery::new();
        changes.insert(AttrKey::ValueData, AttrValue::Data(b"2".to_vec()));
        store.update(&attributes("svc", "a"), &changes).unwrap();

        let stored = store.attributes_of("svc", "a").unwrap();
        assert_eq!(stored.get(&AttrKey::AccessControl), Some(&"any".into()));
        assert_eq!(store.snapshot("svc").get("a"), Some(&b"2".to_vec()));
    }

    #[test]
    fn test_access_controlled_payload_needs_prompt() {
        let store = MemoryStore::new();
        let mut wire = attributes("svc", "a");
        wire.insert(AttrKey::AccessControl, "any".into());
        store.add(&with_data(wire, b"1")).unwrap();

        let mut query = attributes("svc", "a");
        query.insert(AttrKey::ReturnData, true.into());
        assert_eq!(
            store.copy_matching(&query),
            Err(Status::INTERACTION_NOT_ALLOWED)
        );

        query.insert(AttrKey::OperationPrompt, "unlock".into());
        assert!(store.copy_matching(&query).is_ok());
    }

    #[test]
    fn test_delete_reports_not_found() {
        let store = MemoryStore::new();
        assert_eq!(
            store.delete(&attributes("svc", "a")),
            Err(Status::ITEM_NOT_FOUND)
        );
    }

    #[test]
    fn test_fault_after_and_times() {
        let store = MemoryStore::new();
        store.inject(
            Fault::on(Operation::Add)
                .with_status(Status(-9))
                .after(1)
                .times(1),
        );
        store.add(&with_data(attributes("svc", "a"), b"1")).unwrap();
        assert_eq!(
            store.add(&with_data(attributes("svc", "b"), b"2")),
            Err(Status(-9))
        );
        store.add(&with_data(attributes("svc", "b"), b"2")).unwrap();
        assert_eq!(store.calls(Operation::Add), 3);
    }

    #[test]
    fn test_fault_for_service() {
        let store = MemoryStore::new();
        store.inject(Fault::on(Operation::Delete).for_service("locked"));
        store.add(&with_data(attributes("open", "a"), b"1")).unwrap();
        store.add(&with_data(attributes("locked", "a"), b"1")).unwrap();

        assert!(store.delete(&attributes("open", "a")).is_ok());
        assert_eq!(
            store.delete(&attributes("locked", "a")),
            Err(DEFAULT_FAULT)
        );
    }

    #[test]
    fn test_concurrent_adds() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store
                        .add(&with_data(attributes("svc", &format!("k{i}")), b"v"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.snapshot("svc").len(), 8);
    }
}
