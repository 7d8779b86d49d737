#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Typed boundary over a platform secure credential store.
//!
//! The platform store (Keychain-style) is an external collaborator exposing
//! four primitives over untyped attribute dictionaries. This crate gives
//! those primitives a typed surface:
//!
//! * [`Query`] is the typed request struct callers build. It is converted to
//!   the untyped [`WireQuery`] only when it crosses into a [`SecureStore`].
//! * [`SecureStore`] is the minimal contract the platform must implement.
//! * [`StoreGateway`] wraps a store and normalizes raw [`Status`] codes into
//!   a [`StoreOutcome`] callers branch on.
//! * [`memory::MemoryStore`] is an in-memory store with keychain-like
//!   matching semantics and fault injection, used by tests and host-less
//!   runs.
//!
//! Nothing in this crate retries, locks, or knows about scopes.

pub mod error;
mod gateway;
pub mod memory;
mod query;
pub mod status;
mod store;
mod wire;

pub use error::{StoreError, StoreResult};
pub use gateway::{StoreGateway, StoreOutcome};
pub use query::{ItemClass, MatchLimit, Query};
pub use status::Status;
pub use store::SecureStore;
pub use wire::{AttrKey, AttrValue, Item, PersistentRef, QueryResult, WireQuery};
