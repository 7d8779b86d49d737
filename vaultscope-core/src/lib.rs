#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Scoped access to a platform secure credential store.
//!
//! A scope is a policy-bound partition of the store named by its
//! [`ScopeIdentity`]. Handles are obtained from a [`ScopeFactory`], which
//! keeps at most one live [`ScopeHandle`] per identity; every operation on
//! a handle is serialized by the handle's lock. Records are moved between
//! scopes, or from arbitrary legacy queries, with the all-or-nothing
//! migration of [`ScopeHandle::migrate`].

pub mod access;
pub use access::{AccessControl, AccessPolicy, CloudAccessPolicy};

pub mod auth;
pub use auth::{AuthContext, AuthOutcome, Authenticator};

mod configuration;
pub use configuration::Configuration;

mod error;
pub use error::*;

mod factory;
pub use factory::{global, install_global, ScopeFactory, ScopeFactoryBuilder};

mod handle;
pub use handle::{ScopeHandle, WritePolicy};

pub mod identity;
pub use identity::{Identifier, ScopeIdentity, Tier};

pub mod logger;

pub mod migration;
pub use migration::{MigrationRequest, MigrationSummary, Record, TransformError};

mod registry;
pub use registry::Registry;

pub use vaultscope_store as store;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("vaultscope_core");
