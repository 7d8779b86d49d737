//! Moving records from an arbitrary source query into a scope.
//!
//! A run is all-or-nothing with respect to the destination: every check
//! happens before the first write, a failed write or source removal deletes
//! whatever the run wrote, and only [`MigrationError::RollbackFailed`] can
//! leave records behind.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use vaultscope_store::{AttrKey, AttrValue, Query, StoreError};
use zeroize::Zeroizing;

use crate::error::{MigrationError, MigrationPhase, MigrationResult, QueryViolation};
use crate::handle::{ScopeHandle, SENTINEL_KEY};

mod validate;


/// A key/value pair in flight between source and destination.
///
/// The value is wiped from memory when the record is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    key: String,
    value: Zeroizing<Vec<u8>>,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Zeroizing::new(value.into()),
        }
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the value.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("value", &format_args!("<{} bytes>", self.value.len()))
            .finish()
    }
}

/// Error a transform raises to abort a migration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(String);

impl TransformError {
    /// Creates a transform error with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Caller-supplied mapping applied to every record before anything is
/// written. `Ok(None)` skips the record.
pub type Transform<'a> = Box<dyn FnMut(Record) -> Result<Option<Record>, TransformError> + 'a>;

/// Parameters of one migration run.
pub struct MigrationRequest<'a> {
    source: Query,
    remove_on_completion: bool,
    transform: Option<Transform<'a>>,
}

impl fmt::Debug for MigrationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRequest")
            .field("source", &self.source)
            .field("remove_on_completion", &self.remove_on_completion)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

impl<'a> MigrationRequest<'a> {
    /// Creates a request that copies the records matched by `source`.
    #[must_use]
    pub const fn new(source: Query) -> Self {
        Self {
            source,
            remove_on_completion: false,
            transform: None,
        }
    }

    /// Sets whether the source records are deleted after a successful copy.
    #[must_use]
    pub const fn remove_on_completion(mut self, remove: bool) -> Self {
        self.remove_on_completion = remove;
        self
    }

    /// Sets the transform.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: FnMut(Record) -> Result<Option<Record>, TransformError> + 'a,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Returns the source query.
    #[must_use]
    pub const fn source(&self) -> &Query {
        &self.source
    }
}

/// Result of a successful migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Keys written to the destination, in write order.
    pub migrated: Vec<String>,
    /// Whether the source records were deleted.
    pub removed_from_source: bool,
}

struct Fetched {
    account: Option<AttrValue>,
    value: Zeroizing<Vec<u8>>,
}

/// Runs migrations into one destination scope.
///
/// The caller holds the destination's lock for the lifetime of the engine.
pub(crate) struct MigrationEngine<'h> {
    destination: &'h ScopeHandle,
}

impl<'h> MigrationEngine<'h> {
    pub(crate) const fn new(destination: &'h ScopeHandle) -> Self {
        Self { destination }
    }

    pub(crate) fn run(&self, request: MigrationRequest<'_>) -> MigrationResult<MigrationSummary> {
        let MigrationRequest {
            source,
            remove_on_completion,
            transform,
        } = request;

        validate::validate_source(&source, self.destination.base_query())?;

        let fetched = self.fetch(&source)?;
        let mut records = self.check_working_set(sanitize(fetched)?)?;
        if let Some(transform) = transform {
            records = self.check_working_set(apply_transform(records, transform)?)?;
        }

        let migrated = self.write_all(&records)?;
        if remove_on_completion {
            self.remove_source(&source, &migrated)?;
        }

        log::info!(
            "migrated {} records into {}",
            migrated.len(),
            self.destination.fingerprint()
        );
        Ok(MigrationSummary {
            migrated,
            removed_from_source: remove_on_completion,
        })
    }

    /// Reads metadata then every payload. Items without a payload are
    /// skipped; any other read failure aborts, as does a match that lives in
    /// the destination.
    fn fetch(&self, source: &Query) -> MigrationResult<Vec<Fetched>> {
        let gateway = self.destination.gateway();
        let items = gateway.copy_matching(source).into_result()?.into_items();
        let destination = self.destination.fingerprint();
        if items.iter().any(|item| item.service() == Some(destination)) {
            return Err(QueryViolation::OverlapsDestination.into());
        }

        let mut fetched = Vec::with_capacity(items.len());
        for item in items {
            let Some(reference) = item.persistent_ref.clone() else {
                return Err(MigrationError::CouldNotReadKeychain(StoreError::malformed(
                    AttrKey::PersistentRef,
                    "match carries no persistent reference",
                )));
            };
            let payload = Query {
                persistent_ref: Some(reference),
                ..Query::generic_password()
            }
            .for_data();

            match gateway.copy_matching(&payload).into_option() {
                Ok(Some(result)) => {
                    let data = result
                        .into_first()
                        .and_then(|found| found.data)
                        .ok_or(MigrationError::CouldNotReadKeychain(StoreError::ItemNotFound))?;
                    fetched.push(Fetched {
                        account: item.account().cloned(),
                        value: Zeroizing::new(data),
                    });
                }
                Ok(None) => log::debug!("skipping metadata-only match"),
                Err(cause) => return Err(MigrationError::CouldNotReadKeychain(cause)),
            }
        }

        if fetched.is_empty() {
            return Err(MigrationError::NoItemsFound);
        }
        Ok(fetched)
    }

    /// Rejects empty keys or values, the sentinel, duplicates and keys the
    /// destination already holds. Never mutates the store.
    fn check_working_set(&self, records: Vec<Record>) -> MigrationResult<Vec<Record>> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            if record.key == SENTINEL_KEY {
                continue;
            }
            if record.key.is_empty() {
                return Err(MigrationError::KeyInvalid);
            }
            if record.value.is_empty() {
                return Err(MigrationError::ValueInvalid { key: record.key });
            }
            if !seen.insert(record.key.clone()) {
                return Err(MigrationError::DuplicateKey { key: record.key });
            }
            kept.push(record);
        }

        let gateway = self.destination.gateway();
        for record in &kept {
            let presence = self.destination.presence_query(&record.key);
            if gateway.copy_matching(&presence).into_option()?.is_some() {
                return Err(MigrationError::KeyAlreadyExistsInDestination {
                    key: record.key.clone(),
                });
            }
        }
        Ok(kept)
    }

    fn write_all(&self, records: &[Record]) -> MigrationResult<Vec<String>> {
        let gateway = self.destination.gateway();
        let mut written = Vec::with_capacity(records.len());
        for record in records {
            let query = self.destination.base_query().with_account(&record.key);
            if let Err(cause) = gateway.add(&query, record.value()).into_result() {
                log::warn!(
                    "write {} of {} into {} failed, rolling back",
                    written.len() + 1,
                    records.len(),
                    self.destination.fingerprint()
                );
                self.roll_back(&written, MigrationPhase::Write)?;
                return Err(MigrationError::CouldNotWriteToKeychain {
                    key: record.key.clone(),
                    cause,
                });
            }
            written.push(record.key.clone());
        }
        Ok(written)
    }

    fn remove_source(&self, source: &Query, written: &[String]) -> MigrationResult<()> {
        if let Err(cause) = self.destination.gateway().delete(source).into_result() {
            log::warn!("source removal failed, rolling back");
            self.roll_back(written, MigrationPhase::Removal)?;
            return Err(MigrationError::RemovalFailed(cause));
        }
        Ok(())
    }

    /// Deletes every key in `written`, carrying on past failures.
    fn roll_back(&self, written: &[String], during: MigrationPhase) -> MigrationResult<()> {
        let gateway = self.destination.gateway();
        let mut orphaned_keys = Vec::new();
        for key in written {
            let query = self.destination.base_query().with_account(key);
            if !gateway.delete(&query).is_success() {
                orphaned_keys.push(key.clone());
            }
        }

        if orphaned_keys.is_empty() {
            return Ok(());
        }
        log::error!(
            "rollback left {} records in {}",
            orphaned_keys.len(),
            self.destination.fingerprint()
        );
        Err(MigrationError::RollbackFailed {
            during,
            orphaned_keys,
        })
    }
}

/// Turns fetched items into records. Non-string or missing accounts are
/// rejected; the sentinel is left for [`MigrationEngine::check_working_set`]
/// to drop.
fn sanitize(fetched: Vec<Fetched>) -> MigrationResult<Vec<Record>> {
    fetched
        .into_iter()
        .map(|Fetched { account, value }| match account {
            Some(AttrValue::String(key)) => Ok(Record { key, value }),
            _ => Err(MigrationError::KeyInvalid),
        })
        .collect()
}

/// Collects every transform outcome before anything is written.
fn apply_transform(
    records: Vec<Record>,
    mut transform: Transform<'_>,
) -> MigrationResult<Vec<Record>> {
    let mut transformed = Vec::with_capacity(records.len());
    for record in records {
        let key = record.key.clone();
        match transform(record) {
            Ok(Some(record)) => transformed.push(record),
            Ok(None) => log::debug!("transform skipped a record"),
            Err(error) => {
                return Err(MigrationError::Transform {
                    key,
                    message: error.to_string(),
                });
            }
        }
    }
    Ok(transformed)
}
