//! Entry point for obtaining scope handles.

use std::fmt;
use std::sync::{Arc, OnceLock};

use vaultscope_store::{SecureStore, StoreGateway};

use crate::auth::Authenticator;
use crate::configuration::Configuration;
use crate::error::ScopeResult;
use crate::handle::{ScopeHandle, WritePolicy};
use crate::identity::{Identifier, ScopeIdentity};
use crate::registry::Registry;

static GLOBAL: OnceLock<ScopeFactory> = OnceLock::new();

/// Hands out scope handles, one live handle per scope identity.
pub struct ScopeFactory {
    gateway: StoreGateway,
    registry: Arc<Registry<ScopeHandle>>,
    write_policy: WritePolicy,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl fmt::Debug for ScopeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFactory")
            .field("registry", &self.registry)
            .field("write_policy", &self.write_policy)
            .field("has_authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ScopeFactory`].
pub struct ScopeFactoryBuilder {
    store: Arc<dyn SecureStore>,
    registry: Option<Arc<Registry<ScopeHandle>>>,
    write_policy: WritePolicy,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl ScopeFactoryBuilder {
    /// Overrides the platform default write policy.
    #[must_use]
    pub const fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Sets the evaluator single-prompt secure-element scopes use.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Shares a registry with other factories over the same store.
    #[must_use]
    pub fn registry(mut self, registry: Arc<Registry<ScopeHandle>>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> ScopeFactory {
        ScopeFactory {
            gateway: StoreGateway::new(self.store),
            registry: self.registry.unwrap_or_default(),
            write_policy: self.write_policy,
            authenticator: self.authenticator,
        }
    }
}

impl ScopeFactory {
    /// Creates a factory over `store` with default settings and a private
    /// registry.
    #[must_use]
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        Self::builder(store).build()
    }

    /// Starts configuring a factory over `store`.
    #[must_use]
    pub fn builder(store: Arc<dyn SecureStore>) -> ScopeFactoryBuilder {
        ScopeFactoryBuilder {
            store,
            registry: None,
            write_policy: WritePolicy::platform_default(),
            authenticator: None,
        }
    }

    /// Returns the live handle for `identity`, creating it if needed.
    #[must_use]
    pub fn handle(&self, identity: ScopeIdentity) -> Arc<ScopeHandle> {
        let fingerprint = identity.fingerprint();
        self.registry.lookup_or_insert(&fingerprint, || {
            ScopeHandle::new(
                identity,
                self.gateway.clone(),
                self.write_policy,
                self.authenticator.clone(),
            )
        })
    }

    /// Returns the handle of a standard scope.
    ///
    /// # Errors
    ///
    /// [`IdentityError::EmptyIdentifier`](crate::IdentityError) if
    /// `identifier` is empty.
    pub fn standard(
        &self,
        identifier: &str,
        configuration: Configuration,
    ) -> ScopeResult<Arc<ScopeHandle>> {
        let identity = ScopeIdentity::standard(Identifier::try_from(identifier)?, configuration);
        Ok(self.handle(identity))
    }

    /// Returns the handle of a scope shared through the access group
    /// `{prefix}.{identifier}`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::EmptyIdentifier`](crate::IdentityError) if either
    /// argument is empty.
    pub fn shared_group(
        &self,
        prefix: &str,
        identifier: &str,
        configuration: Configuration,
    ) -> ScopeResult<Arc<ScopeHandle>> {
        let identity = ScopeIdentity::shared_group(
            Identifier::try_from(prefix)?,
            Identifier::try_from(identifier)?,
            configuration,
        );
        Ok(self.handle(identity))
    }

    /// Like [`ScopeFactory::shared_group`], partitioned by `secondary`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::EmptyIdentifier`](crate::IdentityError) if any
    /// argument is empty.
    pub fn shared_group_partitioned(
        &self,
        prefix: &str,
        identifier: &str,
        secondary: &str,
        configuration: Configuration,
    ) -> ScopeResult<Arc<ScopeHandle>> {
        let identity = ScopeIdentity::shared_group_partitioned(
            Identifier::try_from(prefix)?,
            Identifier::try_from(identifier)?,
            Identifier::try_from(secondary)?,
            configuration,
        );
        Ok(self.handle(identity))
    }

    /// Returns the registry backing this factory.
    #[must_use]
    pub fn registry(&self) -> &Registry<ScopeHandle> {
        &self.registry
    }
}

/// Installs the process-wide factory over `store`.
///
/// Only the first call has any effect; it lives until process exit.
/// Returns `false` if a factory was already installed.
#[must_use]
pub fn install_global(store: Arc<dyn SecureStore>) -> bool {
    let installed = GLOBAL.set(ScopeFactory::new(store)).is_ok();
    if !installed {
        log::warn!("process-wide scope factory already installed");
    }
    installed
}

/// Returns the process-wide factory, if installed.
#[must_use]
pub fn global() -> Option<&'static ScopeFactory> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use vaultscope_store::memory::MemoryStore;

    use super::*;
    use crate::access::AccessPolicy;
    use crate::error::{IdentityError, ScopeError};

    fn factory() -> ScopeFactory {
        ScopeFactory::new(Arc::new(MemoryStore::new()))
    }

    const PLAIN: Configuration = Configuration::Plain(AccessPolicy::AfterFirstUnlock);

    #[test]
    fn test_equal_identities_share_a_handle() {
        let factory = factory();
        let first = factory.standard("wallet", PLAIN).unwrap();
        let second = factory.standard("wallet", PLAIN).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.registry().live_len(), 1);
    }

    #[test]
    fn test_distinct_identities_get_distinct_handles() {
        let factory = factory();
        let standard = factory.standard("wallet", PLAIN).unwrap();
        let shared = factory.shared_group("TEAM", "wallet", PLAIN).unwrap();
        let partitioned = factory
            .shared_group_partitioned("TEAM", "wallet", "alice", PLAIN)
            .unwrap();
        assert!(!Arc::ptr_eq(&standard, &shared));
        assert!(!Arc::ptr_eq(&shared, &partitioned));
        assert_eq!(factory.registry().live_len(), 3);
    }

    #[test]
    fn test_empty_identifier_is_rejected() {
        let factory = factory();
        assert_eq!(
            factory.standard("", PLAIN).unwrap_err(),
            ScopeError::Identity(IdentityError::EmptyIdentifier)
        );
        assert!(factory.shared_group("", "wallet", PLAIN).is_err());
        assert!(factory
            .shared_group_partitioned("TEAM", "wallet", "", PLAIN)
            .is_err());
    }

    #[test]
    fn test_shared_registry_spans_factories() {
        let store: Arc<dyn SecureStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new());
        let a = ScopeFactory::builder(Arc::clone(&store))
            .registry(Arc::clone(&registry))
            .build();
        let b = ScopeFactory::builder(store).registry(registry).build();
        assert!(Arc::ptr_eq(
            &a.standard("wallet", PLAIN).unwrap(),
            &b.standard("wallet", PLAIN).unwrap()
        ));
    }

    #[test]
    fn test_builder_write_policy_reaches_handles() {
        let factory = ScopeFactory::builder(Arc::new(MemoryStore::new()))
            .write_policy(WritePolicy::DeleteThenInsert)
            .build();
        let handle = factory.standard("wallet", PLAIN).unwrap();
        assert_eq!(handle.write_policy(), WritePolicy::DeleteThenInsert);
    }

    #[test]
    fn test_global_installs_once() {
        let _first = install_global(Arc::new(MemoryStore::new()));
        assert!(!install_global(Arc::new(MemoryStore::new())));
        assert!(global().is_some());
    }
}
