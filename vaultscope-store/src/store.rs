//! Platform store trait.

use crate::status::Status;
use crate::wire::{QueryResult, WireQuery};

/// The platform secure credential store.
///
/// Each primitive is atomic per call and reports failure as a raw
/// [`Status`]. Platform implementations bridge to the native store
/// (Keychain Services on Apple platforms); [`MemoryStore`] is the
/// in-process implementation.
///
/// # Contract
///
/// - `copy_matching` returns [`Status::ITEM_NOT_FOUND`] when nothing matches.
/// - `add` returns [`Status::DUPLICATE_ITEM`] when an item with the same
///   primary attributes exists.
/// - `update` changes only the payload of matching items.
/// - `delete` removes every matching item.
///
/// [`MemoryStore`]: crate::memory::MemoryStore
pub trait SecureStore: Send + Sync {
    /// Returns the items matching `query`, shaped by its `return` flags.
    ///
    /// # Errors
    ///
    /// Returns the platform status when the query fails or matches nothing.
    fn copy_matching(&self, query: &WireQuery) -> Result<QueryResult, Status>;

    /// Inserts a new item described by `attributes` (payload included).
    ///
    /// # Errors
    ///
    /// Returns the platform status when the insert is refused.
    fn add(&self, attributes: &WireQuery) -> Result<(), Status>;

    /// Replaces attributes listed in `changes` on every item matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the platform status when nothing matches or the update fails.
    fn update(&self, query: &WireQuery, changes: &WireQuery) -> Result<(), Status>;

    /// Removes every item matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the platform status when nothing matches or the delete fails.
    fn delete(&self, query: &WireQuery) -> Result<(), Status>;
}
