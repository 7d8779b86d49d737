//! Weak cache guaranteeing one live instance per fingerprint.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Fingerprint-keyed cache of weakly held instances.
///
/// While any caller holds an `Arc` returned for a fingerprint, every further
/// lookup of that fingerprint returns the same allocation. Once the last
/// strong reference is dropped the entry is dead and the next lookup builds a
/// fresh instance.
///
/// The map is guarded by its own short-held mutex, independent of any lock
/// the cached values own, so lookups never wait on store I/O.
pub struct Registry<T> {
    entries: Mutex<HashMap<String, Weak<T>>>,
}

impl<T> Registry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    // The map only ever holds weak pointers; a panic while it is locked
    // cannot leave it inconsistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<String, Weak<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the live instance for `fingerprint`, building it with
    /// `factory` if there is none.
    ///
    /// The lookup and the insert happen under one lock acquisition, so
    /// concurrent callers never run two factories for one fingerprint. Dead
    /// entries are evicted whenever a new instance is inserted.
    pub fn lookup_or_insert<F>(&self, fingerprint: &str, factory: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        let mut entries = self.entries();
        if let Some(live) = entries.get(fingerprint).and_then(Weak::upgrade) {
            return live;
        }

        entries.retain(|_, weak| weak.strong_count() > 0);
        let created = Arc::new(factory());
        entries.insert(fingerprint.to_string(), Arc::downgrade(&created));
        log::debug!("registry: created instance for {fingerprint}");
        created
    }

    /// Returns the number of entries whose instance is still alive.
    #[must_use]
    pub fn live_len(&self) -> usize {
        self.entries()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Returns the number of entries, dead ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.len())
            .finish()
    }
}
