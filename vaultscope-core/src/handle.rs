//! Per-scope handle serializing all store traffic for one scope.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use vaultscope_store::{MatchLimit, Query, QueryResult, StoreGateway, StoreOutcome};

use crate::auth::{AuthContext, Authenticator};
use crate::configuration::Configuration;
use crate::error::{MigrationError, MigrationResult, ScopeError, ScopeResult};
use crate::identity::ScopeIdentity;
use crate::migration::{
    MigrationEngine, MigrationRequest, MigrationSummary, Record, TransformError,
};

/// Account of the record `can_access_store` reads and writes. Never surfaced
/// to callers.
pub(crate) const SENTINEL_KEY: &str = "VS_StoreCanaryKey";
const SENTINEL_VALUE: &[u8] = b"VS_StoreCanaryValue";

/// How `set_object` replaces an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Update the payload of the existing item.
    UpdateInPlace,
    /// Delete the existing item, then insert a fresh one.
    ///
    /// Required where the platform store carries an item's access-control
    /// list over on update: a fresh insert never inherits a list left by a
    /// previous writer.
    DeleteThenInsert,
}

impl WritePolicy {
    /// Returns the policy for the compilation target.
    ///
    /// macOS keeps access-control lists across updates, so it always
    /// deletes then inserts.
    #[must_use]
    pub const fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::DeleteThenInsert
        } else {
            Self::UpdateInPlace
        }
    }
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self::platform_default()
    }
}

/// State guarded by the scope lock.
#[derive(Default)]
pub(crate) struct Session {
    auth_context: Option<AuthContext>,
}

/// Handle to one scope of the store.
///
/// Obtain handles through [`ScopeFactory`](crate::ScopeFactory); equal
/// identities share one live handle. Every public operation holds the
/// handle's exclusive lock for its whole duration, so operations on one
/// scope are totally ordered.
pub struct ScopeHandle {
    identity: ScopeIdentity,
    fingerprint: String,
    base_query: Query,
    gateway: StoreGateway,
    write_policy: WritePolicy,
    authenticator: Option<Arc<dyn Authenticator>>,
    session: Mutex<Session>,
}

impl fmt::Debug for ScopeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeHandle")
            .field("fingerprint", &self.fingerprint)
            .field("write_policy", &self.write_policy)
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

fn check<T>(outcome: StoreOutcome<T>) -> ScopeResult<T> {
    outcome.into_result().map_err(ScopeError::from)
}

fn holds_sentinel(outcome: StoreOutcome<QueryResult>) -> bool {
    match outcome {
        StoreOutcome::Success(result) => result
            .into_first()
            .and_then(|item| item.data)
            .is_some_and(|data| data == SENTINEL_VALUE),
        _ => false,
    }
}

fn validate_key(key: &str) -> ScopeResult<()> {
    if key.is_empty() {
        return Err(ScopeError::EmptyKey);
    }
    Ok(())
}

impl ScopeHandle {
    /// Builds a handle. The base query is derived here, once.
    pub(crate) fn new(
        identity: ScopeIdentity,
        gateway: StoreGateway,
        write_policy: WritePolicy,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Self {
        let fingerprint = identity.fingerprint();
        let base_query = identity.base_query();
        Self {
            identity,
            fingerprint,
            base_query,
            gateway,
            write_policy,
            authenticator,
            session: Mutex::new(Session::default()),
        }
    }

    /// Returns the scope identity.
    #[must_use]
    pub const fn identity(&self) -> &ScopeIdentity {
        &self.identity
    }

    /// Returns the scope fingerprint, which is also its store service.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns the scope configuration.
    #[must_use]
    pub const fn configuration(&self) -> Configuration {
        self.identity.configuration()
    }

    /// Returns the query every operation on this scope starts from.
    #[must_use]
    pub const fn base_query(&self) -> &Query {
        &self.base_query
    }

    /// Returns the policy `set_object` follows.
    ///
    /// Secure-element scopes always delete then insert, whatever the
    /// configured policy: their access-control list must be the one of the
    /// scope, never an inherited one.
    #[must_use]
    pub const fn write_policy(&self) -> WritePolicy {
        if self.identity.configuration().requires_user_presence() {
            WritePolicy::DeleteThenInsert
        } else {
            self.write_policy
        }
    }

    pub(crate) const fn gateway(&self) -> &StoreGateway {
        &self.gateway
    }

    pub(crate) fn lock(&self) -> ScopeResult<MutexGuard<'_, Session>> {
        self.session
            .lock()
            .map_err(|_| ScopeError::Lock("scope lock poisoned".to_string()))
    }

    /// Query that finds `key` without reading its payload, so it never
    /// prompts.
    pub(crate) fn presence_query(&self, key: &str) -> Query {
        Query {
            match_limit: Some(MatchLimit::One),
            return_attributes: true,
            ..self.base_query.with_account(key)
        }
    }

    fn read_query(
        &self,
        session: &mut Session,
        key: &str,
        prompt: &str,
    ) -> ScopeResult<Query> {
        let mut query = self.base_query.with_account(key).for_data();
        match (self.configuration(), &self.authenticator) {
            (Configuration::SinglePromptSecureElement(control), Some(authenticator)) => {
                if session.auth_context.is_none() {
                    let granted = authenticator.evaluate(control, prompt).into_context()?;
                    session.auth_context = Some(granted);
                }
                query.auth_context = session
                    .auth_context
                    .as_ref()
                    .map(|context| context.as_bytes().to_vec());
            }
            (configuration, _) if configuration.requires_user_presence() => {
                query.operation_prompt = Some(prompt.to_string());
            }
            _ => {}
        }
        Ok(query)
    }

    fn contains_unlocked(&self, key: &str) -> ScopeResult<bool> {
        Ok(self
            .gateway
            .copy_matching(&self.presence_query(key))
            .into_option()?
            .is_some())
    }

    /// The sentinel never carries access-control flags, so touching it
    /// never prompts.
    fn sentinel_query(&self) -> Query {
        Query {
            access_control: None,
            ..self.base_query.with_account(SENTINEL_KEY)
        }
    }

    /// Checks that the store accepts reads and writes for this scope
    /// without prompting the user.
    ///
    /// Writes an internal sentinel record on first use.
    #[must_use]
    pub fn can_access_store(&self) -> bool {
        let Ok(_session) = self.lock() else {
            return false;
        };
        let sentinel = self.sentinel_query();

        match self.gateway.copy_matching(&sentinel.for_data()) {
            StoreOutcome::ItemNotFound => {
                if !self.gateway.add(&sentinel, SENTINEL_VALUE).is_success() {
                    log::debug!("sentinel write failed for {}", self.fingerprint);
                    return false;
                }
                holds_sentinel(self.gateway.copy_matching(&sentinel.for_data()))
            }
            outcome => holds_sentinel(outcome),
        }
    }

    /// Returns the value stored under `key`.
    ///
    /// Secure-element scopes prompt with an empty message; prefer
    /// [`ScopeHandle::object_with_prompt`] for them.
    ///
    /// # Errors
    ///
    /// [`ScopeError::ItemNotFound`] if there is no such record, or the
    /// store/authentication failure.
    pub fn object(&self, key: &str) -> ScopeResult<Vec<u8>> {
        self.object_with_prompt(key, "")
    }

    /// Returns the value stored under `key`, showing `prompt` if the scope
    /// needs user presence.
    ///
    /// # Errors
    ///
    /// [`ScopeError::ItemNotFound`] if there is no such record, or the
    /// store/authentication failure.
    pub fn object_with_prompt(&self, key: &str, prompt: &str) -> ScopeResult<Vec<u8>> {
        validate_key(key)?;
        let mut session = self.lock()?;
        let query = self.read_query(&mut session, key, prompt)?;
        check(self.gateway.copy_matching(&query))?
            .into_first()
            .and_then(|item| item.data)
            .ok_or(ScopeError::ItemNotFound)
    }

    /// Returns the UTF-8 string stored under `key`.
    ///
    /// # Errors
    ///
    /// As [`ScopeHandle::object`], plus [`ScopeError::NotUtf8`].
    pub fn string(&self, key: &str) -> ScopeResult<String> {
        self.string_with_prompt(key, "")
    }

    /// Returns the UTF-8 string stored under `key`, showing `prompt` if
    /// needed.
    ///
    /// # Errors
    ///
    /// As [`ScopeHandle::object_with_prompt`], plus [`ScopeError::NotUtf8`].
    pub fn string_with_prompt(&self, key: &str, prompt: &str) -> ScopeResult<String> {
        String::from_utf8(self.object_with_prompt(key, prompt)?).map_err(|_| ScopeError::NotUtf8)
    }

    /// Stores `value` under `key`, replacing any existing record.
    ///
    /// # Errors
    ///
    /// [`ScopeError::EmptyKey`], [`ScopeError::EmptyValue`] or
    /// [`ScopeError::ReservedKey`] before touching the store; otherwise the
    /// store failure.
    pub fn set_object(&self, key: &str, value: &[u8]) -> ScopeResult<()> {
        validate_key(key)?;
        if value.is_empty() {
            return Err(ScopeError::EmptyValue);
        }
        if key == SENTINEL_KEY {
            return Err(ScopeError::ReservedKey);
        }

        let _session = self.lock()?;
        let query = self.base_query.with_account(key);
        match self.write_policy() {
            WritePolicy::DeleteThenInsert => {
                check(self.gateway.delete(&query))?;
                check(self.gateway.add(&query, value))
            }
            WritePolicy::UpdateInPlace => {
                if self.contains_unlocked(key)? {
                    check(self.gateway.update_value(&query, value))
                } else {
                    check(self.gateway.add(&query, value))
                }
            }
        }
    }

    /// Stores a UTF-8 string under `key`.
    ///
    /// # Errors
    ///
    /// As [`ScopeHandle::set_object`].
    pub fn set_string(&self, key: &str, value: &str) -> ScopeResult<()> {
        self.set_object(key, value.as_bytes())
    }

    /// Returns `true` if a record exists under `key`. Never prompts.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub fn contains_object(&self, key: &str) -> ScopeResult<bool> {
        validate_key(key)?;
        let _session = self.lock()?;
        self.contains_unlocked(key)
    }

    /// Returns every key stored in this scope.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub fn all_keys(&self) -> ScopeResult<BTreeSet<String>> {
        let _session = self.lock()?;
        let items = match self.gateway.copy_matching(&self.base_query.for_attributes()) {
            StoreOutcome::ItemNotFound => return Ok(BTreeSet::new()),
            outcome => check(outcome)?.into_items(),
        };
        Ok(items
            .iter()
            .filter_map(|item| item.account().and_then(|account| account.as_str()))
            .filter(|key| !key.is_empty() && *key != SENTINEL_KEY)
            .map(str::to_string)
            .collect())
    }

    /// Removes the record under `key`. A missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub fn remove_object(&self, key: &str) -> ScopeResult<()> {
        validate_key(key)?;
        let _session = self.lock()?;
        check(self.gateway.delete(&self.base_query.with_account(key)))
    }

    /// Removes every record of this scope.
    ///
    /// # Errors
    ///
    /// Returns the store failure.
    pub fn remove_all_objects(&self) -> ScopeResult<()> {
        let _session = self.lock()?;
        check(self.gateway.delete(&self.base_query))?;
        if self.base_query.access_control.is_some() {
            check(self.gateway.delete(&self.sentinel_query()))?;
        }
        Ok(())
    }

    /// Forgets the context granted by the last single-prompt evaluation so
    /// the next read prompts again. No-op for other configurations.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Lock`] if the scope lock is poisoned.
    pub fn require_prompt_on_next_access(&self) -> ScopeResult<()> {
        self.lock()?.auth_context = None;
        Ok(())
    }

    /// Runs a migration into this scope, holding this scope's lock for the
    /// whole run.
    ///
    /// # Errors
    ///
    /// See [`MigrationError`].
    pub fn migrate(&self, request: MigrationRequest<'_>) -> MigrationResult<MigrationSummary> {
        let _session = self
            .lock()
            .map_err(|error| MigrationError::Lock(error.to_string()))?;
        MigrationEngine::new(self).run(request)
    }

    /// Moves the records matched by `source` into this scope.
    ///
    /// # Errors
    ///
    /// See [`MigrationError`].
    pub fn migrate_objects(
        &self,
        source: &Query,
        remove_on_completion: bool,
    ) -> MigrationResult<MigrationSummary> {
        self.migrate(MigrationRequest::new(source.clone()).remove_on_completion(remove_on_completion))
    }

    /// Moves the records matched by `source` into this scope, passing each
    /// through `transform` first. `Ok(None)` skips a record; an error aborts
    /// the migration before anything is written.
    ///
    /// # Errors
    ///
    /// See [`MigrationError`].
    pub fn migrate_objects_with<F>(
        &self,
        source: &Query,
        remove_on_completion: bool,
        transform: F,
    ) -> MigrationResult<MigrationSummary>
    where
        F: FnMut(Record) -> Result<Option<Record>, TransformError>,
    {
        self.migrate(
            MigrationRequest::new(source.clone())
                .remove_on_completion(remove_on_completion)
                .with_transform(transform),
        )
    }

    /// Moves every record of `other` into this scope.
    ///
    /// Only this scope's lock is taken; `other` is read directly from the
    /// store.
    ///
    /// # Errors
    ///
    /// See [`MigrationError`]. Secure-element sources are rejected with
    /// [`MigrationError::InvalidQuery`].
    pub fn migrate_objects_from(
        &self,
        other: &Self,
        remove_on_completion: bool,
    ) -> MigrationResult<MigrationSummary> {
        self.migrate_objects(&other.base_query.for_migration(), remove_on_completion)
    }
}
